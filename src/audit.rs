// =============================================================================
// AuditLog — append-only decision/event trail, trade history, order idempotency
// =============================================================================
//
// Three related responsibilities that all write to disk with the same
// atomic-write discipline `runtime_config.rs`/`config.rs` use for their state
// files:
//
//   - `AuditLog`       append-only JSON-lines event sink. Every line is one
//                       `AuditEvent`; nothing is ever rewritten, so a crash
//                       mid-append loses at most the last unflushed line.
//   - `TradeHistory`    one record per closed position, persisted as a single
//                       JSON array with the usual tmp+rename swap.
//   - `IdempotencyStore` client-order-id -> submission time, so a retried
//                       submit for an id already seen within its TTL is
//                       recognised as a duplicate instead of double-firing.
//
// All three are in-memory-first (an `RwLock`-guarded `Vec`/`HashMap`) with an
// explicit `flush`/`persist` call; the executor and screener decide when
// that's cheap enough to call (on every close, not on every line).

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::Side;

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEventKind {
    SignalEmitted { instrument: String, score: f64, side: String },
    GateBlocked { instrument: String, gate: String, reason: String },
    OrderSubmitted { instrument: String, client_order_id: String, side: String },
    OrderFilled { instrument: String, client_order_id: String, fill_price: Decimal },
    PositionOpened { position_id: String, instrument: String, side: String },
    PositionClosed { position_id: String, instrument: String, reason: String, realized_pnl: Decimal },
    KillswitchTriggered { feature: String, reason: String },
    CircuitOpened { name: String },
    EmergencyStop { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at: String,
    #[serde(flatten)]
    pub kind: AuditEventKind,
}

// ---------------------------------------------------------------------------
// AuditLog — JSON-lines append-only sink
// ---------------------------------------------------------------------------

pub struct AuditLog {
    path: PathBuf,
    buffer: RwLock<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer: RwLock::new(Vec::new()),
        }
    }

    /// Record an event in memory and append it to the log file immediately.
    /// A write failure is logged but never propagated — a missed audit line
    /// must not stop the trading loop.
    pub fn record(&self, kind: AuditEventKind) {
        let event = AuditEvent {
            at: Utc::now().to_rfc3339(),
            kind,
        };

        if let Err(e) = self.append_line(&event) {
            warn!(error = %e, "failed to append audit event, buffering only");
        }

        self.buffer.write().push(event);
    }

    fn append_line(&self, event: &AuditEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serialising audit event")?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening audit log at {}", self.path.display()))?;
        writeln!(file, "{line}").context("writing audit log line")?;
        Ok(())
    }

    /// Most recently recorded events, newest last, for the dashboard's audit
    /// feed.
    pub fn recent(&self, count: usize) -> Vec<AuditEvent> {
        let buf = self.buffer.read();
        let start = buf.len().saturating_sub(count);
        buf[start..].to_vec()
    }
}

// ---------------------------------------------------------------------------
// TradeHistory — persisted record of every closed position
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub margin: Decimal,
    pub realized_pnl: Decimal,
    pub reason: String,
    pub opened_at: String,
    pub closed_at: String,
}

pub struct TradeHistory {
    path: PathBuf,
    records: RwLock<Vec<TradeRecord>>,
}

impl TradeHistory {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    pub fn push(&self, record: TradeRecord) {
        self.records.write().push(record);
        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist trade history");
        }
    }

    pub fn all(&self) -> Vec<TradeRecord> {
        self.records.read().clone()
    }

    fn persist(&self) -> Result<()> {
        let records = self.records.read();
        let body = serde_json::to_string_pretty(&*records).context("serialising trade history")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).context("writing trade history tmp file")?;
        std::fs::rename(&tmp, &self.path).context("renaming trade history into place")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IdempotencyStore — client-order-id dedup with TTL
// ---------------------------------------------------------------------------

pub struct IdempotencyStore {
    ttl: Duration,
    seen: RwLock<HashMap<String, Instant>>,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` the first time `client_order_id` is seen within its
    /// TTL window, `false` for every repeat. Expired entries are reaped
    /// lazily on each call so the map never grows unbounded.
    pub fn record_if_new(&self, client_order_id: &str) -> bool {
        let mut seen = self.seen.write();
        seen.retain(|_, at| at.elapsed() < self.ttl);
        if seen.contains_key(client_order_id) {
            return false;
        }
        seen.insert(client_order_id.to_string(), Instant::now());
        true
    }
}

/// Deterministic client order id from the canonical order fields, so retried
/// submissions of the same logical order always collide in the idempotency
/// store instead of placing a duplicate.
pub fn deterministic_client_order_id(
    instrument: &str,
    side: Side,
    signal_fingerprint: &str,
    leg: &str,
) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    instrument.hash(&mut hasher);
    format!("{side}").hash(&mut hasher);
    signal_fingerprint.hash(&mut hasher);
    leg.hash(&mut hasher);
    format!("aur-{:016x}", hasher.finish())
}

pub fn ensure_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_store_rejects_repeat_within_ttl() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        assert!(store.record_if_new("abc"));
        assert!(!store.record_if_new("abc"));
    }

    #[test]
    fn idempotency_store_accepts_after_ttl_expiry() {
        let store = IdempotencyStore::new(Duration::from_millis(10));
        assert!(store.record_if_new("abc"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(store.record_if_new("abc"));
    }

    #[test]
    fn deterministic_id_is_stable_for_same_inputs() {
        let a = deterministic_client_order_id("BTCUSDT", Side::Long, "sig-1", "entry");
        let b = deterministic_client_order_id("BTCUSDT", Side::Long, "sig-1", "entry");
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_id_differs_per_leg() {
        let entry = deterministic_client_order_id("BTCUSDT", Side::Long, "sig-1", "entry");
        let stop = deterministic_client_order_id("BTCUSDT", Side::Long, "sig-1", "stop_loss");
        assert_ne!(entry, stop);
    }

    #[test]
    fn audit_log_records_buffer_in_order() {
        let dir = std::env::temp_dir().join(format!("aurora-audit-test-{:?}", Instant::now()));
        let log = AuditLog::new(dir.join("audit.jsonl"));
        log.record(AuditEventKind::CircuitOpened { name: "venue".to_string() });
        log.record(AuditEventKind::EmergencyStop { reason: "drawdown".to_string() });
        assert_eq!(log.recent(10).len(), 2);
    }

    #[test]
    fn trade_history_persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!("aurora-trade-history-test-{}", rand_suffix()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("trades.json");
        let history = TradeHistory::load(&path);
        history.push(TradeRecord {
            position_id: "p1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            entry_price: Decimal::new(100, 0),
            exit_price: Decimal::new(110, 0),
            quantity: Decimal::new(1, 0),
            leverage: 3,
            margin: Decimal::new(33, 0),
            realized_pnl: Decimal::new(10, 0),
            reason: "take_profit".to_string(),
            opened_at: "2026-01-01T00:00:00Z".to_string(),
            closed_at: "2026-01-01T01:00:00Z".to_string(),
        });
        let reloaded = TradeHistory::load(&path);
        assert_eq!(reloaded.all().len(), 1);
    }

    fn rand_suffix() -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        hasher.finish()
    }
}
