//! Account pool, session store and label ledger
//!
//! Accounts and sessions are whole-collection values in a key-value store
//! (`accounts`, `sessions`). The ledger is an append-only record store
//! queried by date range.
//!
//! Lifecycle:
//! 1. Accounts are seeded at startup or added by the operator
//! 2. The refresh cycle clears sessions and acquires one per enabled account
//! 3. Label jobs read the freshest session younger than five minutes
//! 4. An account that can no longer log in is deleted along with its session

pub mod accounts;
pub mod error;
pub mod kv;
pub mod ledger;
pub mod sessions;

pub use accounts::{ACCOUNTS_KEY, Account, AccountStore, parse_accounts};
pub use error::{Error, Result};
pub use kv::{FileKv, KeyValueStore, MemoryKv, StoreFuture};
pub use ledger::{FileLedger, LabelLedger, LabelRecord, LabelStats, MemoryLedger, stats_since};
pub use sessions::{SESSIONS_KEY, SessionStore};
