//! SQLite-backed persistence for the three durable tables (wallet registry,
//! position cache, alert log): one connection behind an async mutex,
//! `CREATE TABLE IF NOT EXISTS` at open time, WAL journal mode for
//! concurrent readers.
//!
//! Each row's primary key is a real column for indexing; the row payload is
//! stored as a JSON blob of the already-`Serialize`/`Deserialize` domain
//! type, so restore is a single round-trip through `serde_json` rather than
//! a hand-maintained column mapping that drifts from the domain model.

use crate::error::PersistenceResult;
use async_trait::async_trait;
use liqmon_core::{AlertKind, AlertRecord, CachedPosition, PositionKey, Wallet};
use liqmon_detector::AlertDedupStore;
use rusqlite::{params, Connection};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Number of independent connections the `alert_log` dedup path is split
/// across, keyed by `hash(position_key) % ALERT_LOG_SHARDS`. A flood of
/// dedup checks for one wallet then never queues behind checks for another.
const ALERT_LOG_SHARDS: usize = 8;

pub struct PersistenceStore {
    conn: Arc<Mutex<Connection>>,
    /// Batched `position_cache` writes, coalesced by a background flush.
    pending_positions: Arc<Mutex<HashMap<PositionKey, CachedPosition>>>,
    /// `alert_log` reads and writes go through one of these instead of
    /// `conn`, sharded by position key.
    alert_shards: Vec<Mutex<Connection>>,
}

fn open_connection(db_path: &str) -> PersistenceResult<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

impl PersistenceStore {
    pub fn open(db_path: &str) -> PersistenceResult<Self> {
        let conn = open_connection(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS wallet_registry (
                address TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS position_cache (
                position_key TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                exchange TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS alert_log (
                position_key TEXT NOT NULL,
                kind TEXT NOT NULL,
                day_bucket TEXT NOT NULL,
                emitted_at TEXT NOT NULL,
                summary TEXT NOT NULL,
                PRIMARY KEY (position_key, kind, day_bucket)
            )",
            [],
        )?;

        let mut alert_shards = Vec::with_capacity(ALERT_LOG_SHARDS);
        for _ in 0..ALERT_LOG_SHARDS {
            alert_shards.push(Mutex::new(open_connection(db_path)?));
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            pending_positions: Arc::new(Mutex::new(HashMap::new())),
            alert_shards,
        })
    }

    /// Which shard owns dedup reads/writes for `key`. Stable for the life of
    /// the store since `alert_shards.len()` never changes after `open`.
    fn alert_shard(&self, key: &PositionKey) -> &Mutex<Connection> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.alert_shards.len();
        &self.alert_shards[index]
    }

    /// Restore every wallet written before the last shutdown.
    pub async fn restore_wallets(&self) -> PersistenceResult<Vec<Wallet>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT data FROM wallet_registry")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut wallets = Vec::new();
        for row in rows {
            let json = row?;
            wallets.push(serde_json::from_str(&json)?);
        }
        Ok(wallets)
    }

    /// Restore the cached positions written before the last shutdown.
    /// Entries older than 24h are still returned; the cache revalidates
    /// `distance_pct`/eligibility lazily on each entry's first refresh.
    pub async fn restore_positions(&self) -> PersistenceResult<Vec<CachedPosition>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT data FROM position_cache")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for row in rows {
            let json = row?;
            entries.push(serde_json::from_str(&json)?);
        }
        Ok(entries)
    }

    /// Write-through wallet upsert, applied synchronously (unlike the
    /// coalesced position cache writes below).
    pub async fn save_wallet(&self, wallet: &Wallet) -> PersistenceResult<()> {
        let json = serde_json::to_string(wallet)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO wallet_registry (address, data) VALUES (?1, ?2)
             ON CONFLICT(address) DO UPDATE SET data = excluded.data",
            params![wallet.address.to_string(), json],
        )?;
        Ok(())
    }

    /// Queue a position_cache write for the next coalesced flush.
    pub async fn queue_position(&self, key: PositionKey, entry: CachedPosition) {
        self.pending_positions.lock().await.insert(key, entry);
    }

    /// Remove a position immediately (full liquidation, eviction); this
    /// bypasses the coalescing buffer since it must not resurrect a stale
    /// queued write.
    pub async fn remove_position(&self, key: &PositionKey) -> PersistenceResult<()> {
        self.pending_positions.lock().await.remove(key);
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM position_cache WHERE position_key = ?1",
            params![key.to_string()],
        )?;
        Ok(())
    }

    /// Flush any buffered position_cache writes. Call this on a fixed
    /// interval (default 1s) and once more during shutdown drain.
    pub async fn flush_positions(&self) -> PersistenceResult<()> {
        let mut pending = self.pending_positions.lock().await;
        if pending.is_empty() {
            return Ok(());
        }
        let batch: Vec<_> = pending.drain().collect();
        drop(pending);

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for (key, entry) in &batch {
            let json = serde_json::to_string(entry)?;
            tx.execute(
                "INSERT INTO position_cache (position_key, address, exchange, data) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(position_key) DO UPDATE SET data = excluded.data",
                params![key.to_string(), key.address.to_string(), key.exchange.to_string(), json],
            )?;
        }
        tx.commit()?;
        debug!(count = batch.len(), "flushed position_cache batch");
        Ok(())
    }

    pub async fn clear_cache(&self) -> PersistenceResult<()> {
        self.pending_positions.lock().await.clear();
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM position_cache", [])?;
        Ok(())
    }

    /// Truncate every table except the wallet registry's own discovery
    /// history.
    pub async fn clear_db(&self) -> PersistenceResult<()> {
        self.pending_positions.lock().await.clear();
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM position_cache", [])?;
        conn.execute("DELETE FROM alert_log", [])?;
        Ok(())
    }
}

#[async_trait]
impl AlertDedupStore for PersistenceStore {
    async fn already_emitted(&self, key: &PositionKey, kind: AlertKind, day_bucket: &str) -> bool {
        let conn = self.alert_shard(key).lock().await;
        conn.query_row(
            "SELECT 1 FROM alert_log WHERE position_key = ?1 AND kind = ?2 AND day_bucket = ?3",
            params![key.to_string(), kind.to_string(), day_bucket],
            |_| Ok(()),
        )
        .is_ok()
    }

    async fn record(&self, record: &AlertRecord) {
        let Ok(summary) = serde_json::to_string(&record.summary) else {
            warn!(%record.position_key, "failed to serialize alert summary, skipping alert_log write");
            return;
        };
        let conn = self.alert_shard(&record.position_key).lock().await;
        if let Err(e) = conn.execute(
            "INSERT OR IGNORE INTO alert_log (position_key, kind, day_bucket, emitted_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.position_key.to_string(),
                record.kind.to_string(),
                record.day_bucket,
                record.emitted_at.to_rfc3339(),
                summary,
            ],
        ) {
            warn!(%record.position_key, error = %e, "failed to write alert_log row");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use liqmon_core::{AlertSummary, Exchange, MarginType, Position, Price, Side, Size, Tier};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn addr() -> liqmon_core::WalletAddress {
        liqmon_core::WalletAddress::parse("0x000000000000000000000000000000000000aa").unwrap()
    }

    fn cached_position() -> CachedPosition {
        let now = Utc::now();
        CachedPosition {
            position: Position {
                key: PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long),
                size: Size::new(dec!(1)),
                entry_price: Price::new(dec!(95000)),
                mark_price: Price::new(dec!(100000)),
                liquidation_price: Some(Price::new(dec!(99000))),
                notional: dec!(100000),
                leverage: dec!(10),
                margin_type: MarginType::Cross,
                last_updated: now,
            },
            distance_pct: dec!(1.0),
            tier: Tier::High,
            last_refresh: now,
            next_refresh_deadline: now,
            approaching_alerted: false,
            critical_alerted: false,
            prev_liquidation_price: None,
            prev_notional: None,
            generation: 1,
        }
    }

    #[tokio::test]
    async fn wallet_round_trips_through_restore() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::open(dir.path().join("db.sqlite3").to_str().unwrap()).unwrap();
        let wallet = Wallet::new(addr(), liqmon_core::DiscoverySource::Cohort, Some("whale".into()), Utc::now());
        store.save_wallet(&wallet).await.unwrap();

        let restored = store.restore_wallets().await.unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].address, addr());
    }

    #[tokio::test]
    async fn queued_positions_only_persist_after_flush() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::open(dir.path().join("db.sqlite3").to_str().unwrap()).unwrap();
        let entry = cached_position();
        store.queue_position(entry.position.key.clone(), entry.clone()).await;

        assert!(store.restore_positions().await.unwrap().is_empty());
        store.flush_positions().await.unwrap();
        assert_eq!(store.restore_positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_cache_preserves_wallet_registry() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::open(dir.path().join("db.sqlite3").to_str().unwrap()).unwrap();
        let wallet = Wallet::new(addr(), liqmon_core::DiscoverySource::Cohort, None, Utc::now());
        store.save_wallet(&wallet).await.unwrap();
        let entry = cached_position();
        store.queue_position(entry.position.key.clone(), entry).await;
        store.flush_positions().await.unwrap();

        store.clear_cache().await.unwrap();

        assert!(store.restore_positions().await.unwrap().is_empty());
        assert_eq!(store.restore_wallets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn alert_dedup_store_detects_same_day_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::open(dir.path().join("db.sqlite3").to_str().unwrap()).unwrap();
        let key = PositionKey::new(addr(), "BTC", Exchange::Main, Side::Long);
        let record = AlertRecord {
            position_key: key.clone(),
            kind: AlertKind::Imminent,
            emitted_at: Utc::now(),
            day_bucket: "2026-08-01".to_string(),
            summary: AlertSummary {
                token: "BTC".into(),
                side: "long".into(),
                exchange: "main".into(),
                notional: dec!(100000),
                distance_pct: dec!(0.1),
                liquidation_price: Some(dec!(99000)),
            },
        };

        assert!(!store.already_emitted(&key, AlertKind::Imminent, "2026-08-01").await);
        store.record(&record).await;
        assert!(store.already_emitted(&key, AlertKind::Imminent, "2026-08-01").await);
        assert!(!store.already_emitted(&key, AlertKind::Imminent, "2026-08-02").await);
    }
}
