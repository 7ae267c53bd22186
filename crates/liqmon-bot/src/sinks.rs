//! Outbound message sinks and the liquidation-history import adapter.

use async_trait::async_trait;
use liqmon_core::WalletAddress;
use liqmon_detector::MessageSink;
use liqmon_scheduler::{LiquidationHistoryEntry, LiquidationHistorySource};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Logs every alert instead of sending it. Used in `--dry-run` mode and as
/// the default when no webhook is configured.
#[derive(Default)]
pub struct LoggingSink;

#[async_trait]
impl MessageSink for LoggingSink {
    async fn send(&self, text: String) {
        info!(message = %text, "alert (dry-run, not delivered)");
    }
}

/// Posts alert text to a webhook URL. Failures are logged and not retried —
/// the next state transition produces a fresh alert anyway.
pub struct HttpWebhookSink {
    client: reqwest::Client,
    url: String,
}

impl HttpWebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl MessageSink for HttpWebhookSink {
    async fn send(&self, text: String) {
        let body = serde_json::json!({ "text": text });
        if let Err(e) = self.client.post(&self.url).json(&body).send().await {
            warn!(error = %e, "failed to deliver alert to webhook");
        }
    }
}

/// Reads newly appended lines from a liquidation-history file, each a JSON
/// object `{"address": "0x...", "notional": "..."}`. The history file is
/// produced by an external import tool; this adapter only tails what it finds.
pub struct JsonlHistoryImporter {
    path: String,
    offset: AtomicUsize,
    lock: Mutex<()>,
}

impl JsonlHistoryImporter {
    pub fn new(path: String) -> Self {
        Self {
            path,
            offset: AtomicUsize::new(0),
            lock: Mutex::new(()),
        }
    }
}

#[derive(serde::Deserialize)]
struct HistoryLine {
    address: String,
    notional: String,
}

#[async_trait]
impl LiquidationHistorySource for JsonlHistoryImporter {
    async fn poll_new_entries(&self) -> Vec<LiquidationHistoryEntry> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let lines: Vec<&str> = content.lines().collect();
        let start = self.offset.load(Ordering::SeqCst).min(lines.len());
        let mut entries = Vec::new();
        for line in &lines[start..] {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<HistoryLine>(line) else {
                warn!(%line, "skipping malformed liquidation-history line");
                continue;
            };
            let Ok(address) = WalletAddress::parse(&parsed.address) else {
                continue;
            };
            let Ok(notional) = Decimal::from_str(&parsed.notional) else {
                continue;
            };
            entries.push(LiquidationHistoryEntry {
                address,
                historical_notional: notional,
            });
        }
        self.offset.store(lines.len(), Ordering::SeqCst);
        entries
    }
}

/// Never surfaces any entries; the default when no history file is configured.
#[derive(Default)]
pub struct NoLiquidationHistory;

#[async_trait]
impl LiquidationHistorySource for NoLiquidationHistory {
    async fn poll_new_entries(&self) -> Vec<LiquidationHistoryEntry> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn importer_only_returns_lines_appended_since_last_poll() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"address":"0x000000000000000000000000000000000000aa","notional":"150000"}}"#).unwrap();
        file.flush().unwrap();

        let importer = JsonlHistoryImporter::new(file.path().to_str().unwrap().to_string());
        let first = importer.poll_new_entries().await;
        assert_eq!(first.len(), 1);

        let second = importer.poll_new_entries().await;
        assert!(second.is_empty());

        writeln!(file, r#"{{"address":"0x000000000000000000000000000000000000bb","notional":"200000"}}"#).unwrap();
        file.flush().unwrap();
        let third = importer.poll_new_entries().await;
        assert_eq!(third.len(), 1);
    }
}
