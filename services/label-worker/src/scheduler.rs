//! Periodic ticks
//!
//! The refresh tick clears every session and queues one session job per
//! enabled account. It runs once at boot, then every refresh interval.
//! The top-up tick buys postage for every session when the summed balance
//! falls below the floor. Both ticks log failures and keep running.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::RngExt;
use session_pool::{AccountStore, SessionStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::carrier_impl::PostageFunder;
use crate::jobs::SessionJob;
use crate::metrics;
use crate::queue::JobQueue;

/// Clear the session store and enqueue a refresh for every enabled account.
///
/// Returns the number of jobs enqueued.
pub async fn refresh_tick(
    accounts: &AccountStore,
    sessions: &SessionStore,
    queue: &JobQueue<SessionJob>,
) -> session_pool::Result<usize> {
    sessions.clear().await?;

    let enabled = accounts.enabled().await?;
    info!(
        accounts = enabled.len(),
        queue = queue.name(),
        "scheduling session refresh"
    );

    let mut enqueued = 0;
    for account in enabled {
        let job = SessionJob {
            username: account.username.clone(),
            password: account.password.clone(),
        };
        match queue.enqueue(job) {
            Ok(job_id) => {
                debug!(username = %account.username, job_id = %job_id, "session job enqueued");
                enqueued += 1;
            }
            Err(e) => {
                error!(error = %e, "cannot enqueue session jobs");
                break;
            }
        }
    }
    Ok(enqueued)
}

/// When and how much postage to buy.
#[derive(Debug, Clone, Copy)]
pub struct TopUpPolicy {
    pub floor: f64,
    pub min_amount: u32,
    pub max_amount: u32,
}

impl TopUpPolicy {
    pub fn needs_top_up(&self, total_balance: f64) -> bool {
        total_balance < self.floor
    }

    /// Pseudo-random purchase amount in `min_amount..=max_amount`.
    pub fn amount(&self) -> u32 {
        rand::rng().random_range(self.min_amount..=self.max_amount)
    }
}

/// Result of one top-up tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TopUpSummary {
    pub attempted: usize,
    pub funded: usize,
}

/// Fund every session when the summed balance is below the floor.
///
/// Purchases run concurrently and independently; a refused purchase is
/// logged and does not stop the others. Reported balances are written back
/// to the session store.
pub async fn top_up_tick(
    sessions: &SessionStore,
    funder: &dyn PostageFunder,
    policy: TopUpPolicy,
) -> session_pool::Result<TopUpSummary> {
    let all = sessions.list().await?;
    let total: f64 = all.iter().filter_map(|s| s.balance).sum();
    if !policy.needs_top_up(total) {
        debug!(total, floor = policy.floor, "balance above floor");
        return Ok(TopUpSummary::default());
    }

    info!(
        total,
        floor = policy.floor,
        sessions = all.len(),
        "balance below floor, topping up"
    );

    let purchases = all.iter().map(|session| async move {
        let amount = policy.amount();
        (session, amount, funder.fund(session, amount).await)
    });

    let mut summary = TopUpSummary::default();
    for (session, amount, result) in join_all(purchases).await {
        summary.attempted += 1;
        let username = session.username.as_str();
        match result {
            Ok(receipt) => {
                metrics::record_top_up("success");
                summary.funded += 1;
                info!(username, amount, "postage purchased");
                if let Some(balance) = receipt.balance {
                    match sessions.update_balance(username, balance).await {
                        Ok(true) => {}
                        Ok(false) => debug!(username, "session gone before balance update"),
                        Err(e) => warn!(username, error = %e, "failed to store new balance"),
                    }
                }
            }
            Err(e) => {
                metrics::record_top_up("failed");
                warn!(username, amount, error = %e, "top-up failed");
            }
        }
    }
    Ok(summary)
}

/// Spawn the refresh task. The first cycle runs immediately.
pub fn spawn_refresh_task(
    accounts: Arc<AccountStore>,
    sessions: Arc<SessionStore>,
    queue: JobQueue<SessionJob>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match refresh_tick(&accounts, &sessions, &queue).await {
                Ok(jobs) => info!(jobs, "session refresh cycle scheduled"),
                Err(e) => error!(error = %e, "session refresh cycle failed"),
            }
        }
    })
}

/// Spawn the top-up task. The first check runs one interval after start.
pub fn spawn_top_up_task(
    sessions: Arc<SessionStore>,
    funder: Arc<dyn PostageFunder>,
    policy: TopUpPolicy,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick; sessions are still being acquired
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match top_up_tick(&sessions, funder.as_ref(), policy).await {
                Ok(summary) if summary.attempted > 0 => info!(
                    attempted = summary.attempted,
                    funded = summary.funded,
                    "top-up cycle finished"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "top-up cycle failed"),
            }
        }
    })
}
