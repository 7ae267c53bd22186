//! Shared upstream-fetch helpers used by both the refresh scheduler and the
//! discovery loop.

use liqmon_core::{Exchange, WalletAddress};
use liqmon_fetcher::ExchangeApi;
use liqmon_fetcher::Result;

/// Fetch a wallet's positions on one exchange and merge in live mark prices.
/// `get_positions` alone reports each position's entry price as a mark-price
/// placeholder (see `liqmon-fetcher::client::RateLimitedFetcher::parse_position`);
/// this is the merge point that replaces it with the real mark.
pub async fn fetch_positions_with_marks(
    fetcher: &dyn ExchangeApi,
    address: &WalletAddress,
    exchange: Exchange,
) -> Result<Vec<liqmon_core::Position>> {
    let mut positions = fetcher.get_positions(address, exchange).await?;
    if positions.is_empty() {
        return Ok(positions);
    }
    let marks = fetcher.get_mark_prices(exchange).await?;
    for position in &mut positions {
        if let Some(mark) = marks.get(&position.key.token) {
            position.mark_price = liqmon_core::Price::new(*mark);
        }
    }
    Ok(positions)
}
