//! Append-only label ledger
//!
//! One record per successfully generated label, queried by creation time
//! for usage statistics. `FileLedger` appends JSON lines; `MemoryLedger`
//! backs tests.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::kv::StoreFuture;

/// One generated label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRecord {
    pub id: Uuid,
    pub shipment_date: DateTime<Utc>,
    pub account_used: String,
    pub balance_used: f64,
    pub shipment_type: String,
    pub file_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LabelRecord {
    pub fn new(
        account_used: impl Into<String>,
        shipment_type: impl Into<String>,
        file_id: impl Into<String>,
        balance_used: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            shipment_date: now,
            account_used: account_used.into(),
            balance_used,
            shipment_type: shipment_type.into(),
            file_id: file_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Aggregates over a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelStats {
    pub number_of_shipments: usize,
    pub accounts_used: usize,
    pub balance_used: f64,
    pub shipment_types: usize,
}

impl LabelStats {
    /// Count, distinct accounts, summed balance and distinct types.
    pub fn from_records(records: &[LabelRecord]) -> Self {
        let accounts: HashSet<&str> = records.iter().map(|r| r.account_used.as_str()).collect();
        let types: HashSet<&str> = records.iter().map(|r| r.shipment_type.as_str()).collect();
        Self {
            number_of_shipments: records.len(),
            accounts_used: accounts.len(),
            balance_used: records.iter().map(|r| r.balance_used).sum(),
            shipment_types: types.len(),
        }
    }
}

/// Append/query document store for label records.
pub trait LabelLedger: Send + Sync {
    fn append<'a>(&'a self, record: LabelRecord) -> StoreFuture<'a, ()>;

    /// Records with `from <= created_at < to`.
    fn query<'a>(&'a self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreFuture<'a, Vec<LabelRecord>>;
}

/// Statistics from the start of `day` (UTC) until `now`.
pub async fn stats_since(
    ledger: &dyn LabelLedger,
    day: NaiveDate,
    now: DateTime<Utc>,
) -> Result<LabelStats> {
    let from = day.and_time(chrono::NaiveTime::MIN).and_utc();
    let records = ledger.query(from, now).await?;
    Ok(LabelStats::from_records(&records))
}

fn in_range(record: &LabelRecord, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    record.created_at >= from && record.created_at < to
}

/// In-process ledger.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<LabelRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LabelLedger for MemoryLedger {
    fn append<'a>(&'a self, record: LabelRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.records.lock().await.push(record);
            Ok(())
        })
    }

    fn query<'a>(&'a self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreFuture<'a, Vec<LabelRecord>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .await
                .iter()
                .filter(|r| in_range(r, from, to))
                .cloned()
                .collect())
        })
    }
}

/// JSON-lines ledger file.
pub struct FileLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl LabelLedger for FileLedger {
    fn append<'a>(&'a self, record: LabelRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut line = serde_json::to_string(&record)
                .map_err(|e| Error::Storage(format!("serializing label record: {e}")))?;
            line.push('\n');

            let _guard = self.lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| Error::Storage(format!("opening ledger: {e}")))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| Error::Storage(format!("appending to ledger: {e}")))?;
            file.flush()
                .await
                .map_err(|e| Error::Storage(format!("flushing ledger: {e}")))?;
            Ok(())
        })
    }

    fn query<'a>(&'a self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreFuture<'a, Vec<LabelRecord>> {
        Box::pin(async move {
            let contents = {
                let _guard = self.lock.lock().await;
                match tokio::fs::read_to_string(&self.path).await {
                    Ok(contents) => contents,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => return Err(Error::Storage(format!("reading ledger: {e}"))),
                }
            };

            let mut records = Vec::new();
            for (index, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LabelRecord>(line) {
                    Ok(record) if in_range(&record, from, to) => records.push(record),
                    Ok(_) => {}
                    Err(e) => warn!(line = index + 1, error = %e, "skipping unreadable ledger line"),
                }
            }
            Ok(records)
        })
    }
}
