//! Job payloads and handlers
//!
//! Session jobs turn credentials into a stored session. Label jobs turn a
//! shipment into a delivered label using the active session. Neither handler
//! lets a failure escape the worker: outcomes are logged, counted and, for
//! label jobs, reported to the requester.

use std::sync::Arc;
use std::time::Instant;

use carrier::Shipment;
use carrier::constants::LABEL_TIME_FORMAT;
use chrono::{DateTime, Local};
use common::{AccountError, AccountErrorKind, Secret};
use serde::{Deserialize, Serialize};
use session_pool::{AccountStore, LabelLedger, LabelRecord, SessionStore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::acquirer::SessionAcquirer;
use crate::carrier_impl::LabelPrinter;
use crate::error::JobError;
use crate::explainer::ErrorExplainer;
use crate::metrics;
use crate::notifier::{LabelDocument, Notifier};
use crate::queue::{JobFuture, JobHandler};

/// Sent to the requester when no fresh session exists.
pub const NO_SESSION_MESSAGE: &str = "No active session found, please try again later";

/// Refresh the session for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionJob {
    pub username: String,
    pub password: Secret<String>,
}

/// Generate one label for a requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelJob {
    pub shipment: Shipment,
    pub label_id: String,
    pub requester_ref: String,
}

/// Caption delivered with a rendered label, stamped in local time.
fn label_caption(label_id: &str, filename: &str, at: DateTime<Local>) -> String {
    format!(
        "{label_id}-{filename}\nLabel Generated - {}",
        at.format(LABEL_TIME_FORMAT)
    )
}

pub struct SessionJobHandler {
    acquirer: Arc<dyn SessionAcquirer>,
    accounts: Arc<AccountStore>,
    sessions: Arc<SessionStore>,
}

impl SessionJobHandler {
    pub fn new(
        acquirer: Arc<dyn SessionAcquirer>,
        accounts: Arc<AccountStore>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            acquirer,
            accounts,
            sessions,
        }
    }

    async fn refresh(&self, id: Uuid, job: &SessionJob) -> Result<(), JobError> {
        let username = job.username.as_str();
        info!(job_id = %id, username, "processing session job");

        match self.acquirer.acquire(username, &job.password).await {
            Ok(session) => {
                self.sessions
                    .set_for_username(username, session)
                    .await
                    .map_err(|e| JobError::Transient(format!("storing session: {e}")))?;
                metrics::record_session_job("success");
                info!(job_id = %id, username, "session refreshed");
                Ok(())
            }
            Err(e) if e.is(AccountErrorKind::CannotLogin) => {
                metrics::record_session_job("cannot_login");
                self.remove_account(username).await;
                Err(JobError::Permanent(e.to_string()))
            }
            Err(e) => {
                metrics::record_session_job("failed");
                Err(JobError::Transient(e.to_string()))
            }
        }
    }

    /// Drop a dead credential and whatever session it still has.
    async fn remove_account(&self, username: &str) {
        match self.accounts.delete(username).await {
            Ok(true) => {
                metrics::record_account_removed();
                warn!(username, "account removed after login rejection");
            }
            Ok(false) => warn!(username, "login rejected for unknown account"),
            Err(e) => error!(username, error = %e, "failed to remove account"),
        }
        if let Err(e) = self.sessions.delete(username).await {
            error!(username, error = %e, "failed to remove session");
        }
    }
}

impl JobHandler<SessionJob> for SessionJobHandler {
    fn handle<'a>(&'a self, id: Uuid, job: &'a SessionJob) -> JobFuture<'a> {
        Box::pin(self.refresh(id, job))
    }
}

pub struct LabelJobHandler {
    sessions: Arc<SessionStore>,
    ledger: Arc<dyn LabelLedger>,
    printer: Arc<dyn LabelPrinter>,
    explainer: Arc<dyn ErrorExplainer>,
    notifier: Arc<dyn Notifier>,
}

impl LabelJobHandler {
    pub fn new(
        sessions: Arc<SessionStore>,
        ledger: Arc<dyn LabelLedger>,
        printer: Arc<dyn LabelPrinter>,
        explainer: Arc<dyn ErrorExplainer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions,
            ledger,
            printer,
            explainer,
            notifier,
        }
    }

    async fn notify(&self, requester: &str, text: &str) {
        if let Err(e) = self.notifier.send_text(requester, text).await {
            error!(requester, error = %e, "failed to notify requester");
        }
    }

    async fn generate(&self, id: Uuid, job: &LabelJob) -> Result<(), JobError> {
        info!(job_id = %id, label_id = %job.label_id, "processing label job");

        let session = match self.sessions.get_active().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                metrics::record_label_job("no_session");
                warn!(job_id = %id, "no active session, label job dropped");
                self.notify(&job.requester_ref, NO_SESSION_MESSAGE).await;
                return Err(JobError::Permanent(
                    AccountError::of(AccountErrorKind::NoSessionFound).to_string(),
                ));
            }
            Err(e) => {
                metrics::record_label_job("failed");
                error!(job_id = %id, error = %e, "session lookup failed");
                let explanation = self.explainer.explain(&e.to_string()).await;
                self.notify(&job.requester_ref, &explanation).await;
                return Err(JobError::Permanent(e.to_string()));
            }
        };

        let started = Instant::now();
        match self.printer.print(&job.shipment, &session).await {
            Ok(label) => {
                metrics::record_label_duration(started.elapsed().as_secs_f64());
                // Per-label cost is not reported by the portal; balance used stays 0.
                let record = LabelRecord::new(
                    &session.username,
                    &job.shipment.to.mail_class,
                    &label.filename,
                    0.0,
                );
                if let Err(e) = self.ledger.append(record).await {
                    error!(job_id = %id, error = %e, "failed to record label");
                }

                let caption = label_caption(&job.label_id, &label.filename, Local::now());
                let document = LabelDocument {
                    filename: label.filename,
                    bytes: label.bytes,
                    caption,
                };
                if let Err(e) = self.notifier.send_document(&job.requester_ref, &document).await {
                    error!(job_id = %id, error = %e, "failed to deliver label");
                }

                metrics::record_label_job("success");
                info!(
                    job_id = %id,
                    username = %session.username,
                    filename = %document.filename,
                    "label generated"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_label_job("failed");
                let kind = e.account_error().map_or("error", |a| a.kind.label());
                error!(
                    job_id = %id,
                    username = %session.username,
                    kind,
                    error = %e,
                    "label generation failed"
                );
                let explanation = self.explainer.explain(&e.to_string()).await;
                self.notify(
                    &job.requester_ref,
                    &format!("Account used: {}\n{explanation}", session.username),
                )
                .await;
                Err(JobError::Permanent(e.to_string()))
            }
        }
    }
}

impl JobHandler<LabelJob> for LabelJobHandler {
    fn handle<'a>(&'a self, id: Uuid, job: &'a LabelJob) -> JobFuture<'a> {
        Box::pin(self.generate(id, job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        EchoExplainer, FailingNotifier, FakeAcquirer, FakePrinter, RecordingNotifier, Sent,
        session, shipment, stores,
    };
    use carrier::LabelFailure;
    use chrono::{TimeDelta, TimeZone, Utc};
    use session_pool::{Account, MemoryLedger, stats_since};

    fn label_job() -> LabelJob {
        LabelJob {
            shipment: shipment("USPM"),
            label_id: "jane_sender-1".into(),
            requester_ref: "chat-42".into(),
        }
    }

    struct LabelHarness {
        handler: LabelJobHandler,
        sessions: Arc<SessionStore>,
        ledger: Arc<MemoryLedger>,
        printer: Arc<FakePrinter>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn label_harness(printer: FakePrinter) -> LabelHarness {
        let stores = stores().await;
        let printer = Arc::new(printer);
        let notifier = Arc::new(RecordingNotifier::default());
        let handler = LabelJobHandler::new(
            stores.sessions.clone(),
            stores.ledger.clone(),
            printer.clone(),
            Arc::new(EchoExplainer),
            notifier.clone(),
        );
        LabelHarness {
            handler,
            sessions: stores.sessions,
            ledger: stores.ledger,
            printer,
            notifier,
        }
    }

    #[tokio::test]
    async fn no_active_session_notifies_and_skips_protocol() {
        let h = label_harness(FakePrinter::default()).await;
        let err = h.handler.handle(Uuid::new_v4(), &label_job()).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(h.printer.calls(), 0);
        assert_eq!(
            h.notifier.sent().await,
            vec![Sent::Text {
                requester: "chat-42".into(),
                text: NO_SESSION_MESSAGE.into(),
            }]
        );
    }

    #[tokio::test]
    async fn stale_session_counts_as_none() {
        let h = label_harness(FakePrinter::default()).await;
        h.sessions
            .set_for_username("alice", session("alice", Utc::now() - TimeDelta::minutes(6), None))
            .await
            .unwrap();

        assert!(h.handler.handle(Uuid::new_v4(), &label_job()).await.is_err());
        assert_eq!(h.printer.calls(), 0);
    }

    #[tokio::test]
    async fn success_records_label_and_delivers_document() {
        let h = label_harness(FakePrinter::default()).await;
        let now = Utc::now();
        h.sessions
            .set_for_username("old", session("old", now - TimeDelta::minutes(2), None))
            .await
            .unwrap();
        h.sessions
            .set_for_username("alice", session("alice", now, None))
            .await
            .unwrap();

        h.handler.handle(Uuid::new_v4(), &label_job()).await.unwrap();

        assert_eq!(*h.printer.used_sessions.lock().await, vec!["alice".to_string()]);

        let sent = h.notifier.sent().await;
        let [Sent::Document { requester, filename, caption }] = sent.as_slice() else {
            panic!("expected one document, got {sent:?}");
        };
        assert_eq!(requester, "chat-42");
        assert_eq!(filename, "Priority-9400100000000000000000.pdf");
        assert!(caption.starts_with("jane_sender-1-Priority-9400100000000000000000.pdf\nLabel Generated - "));

        let records = h
            .ledger
            .query(now - TimeDelta::hours(1), Utc::now() + TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].account_used, "alice");
        assert_eq!(records[0].shipment_type, "USPM");
        assert_eq!(records[0].file_id, filename.as_str());
        assert_eq!(records[0].balance_used, 0.0);
    }

    #[tokio::test]
    async fn failure_is_explained_with_account_and_not_recorded() {
        let h = label_harness(FakePrinter::failing(LabelFailure::InsufficientFunds)).await;
        h.sessions
            .set_for_username("alice", session("alice", Utc::now(), None))
            .await
            .unwrap();

        let err = h.handler.handle(Uuid::new_v4(), &label_job()).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("Insufficient funds"));
        assert_eq!(h.printer.calls(), 1);

        let sent = h.notifier.sent().await;
        let [Sent::Text { text, .. }] = sent.as_slice() else {
            panic!("expected one text, got {sent:?}");
        };
        assert!(text.starts_with("Account used: alice\nexplained: Insufficient funds"));

        let stats = stats_since(h.ledger.as_ref(), Utc::now().date_naive(), Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.number_of_shipments, 0);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_fail_the_job() {
        let stores = stores().await;
        stores
            .sessions
            .set_for_username("alice", session("alice", Utc::now(), None))
            .await
            .unwrap();
        let handler = LabelJobHandler::new(
            stores.sessions.clone(),
            stores.ledger.clone(),
            Arc::new(FakePrinter::default()),
            Arc::new(EchoExplainer),
            Arc::new(FailingNotifier),
        );
        handler.handle(Uuid::new_v4(), &label_job()).await.unwrap();
    }

    struct SessionHarness {
        handler: SessionJobHandler,
        accounts: Arc<AccountStore>,
        sessions: Arc<SessionStore>,
        acquirer: Arc<FakeAcquirer>,
    }

    async fn session_harness(usernames: &[&str]) -> SessionHarness {
        let stores = stores().await;
        for username in usernames {
            stores.accounts.add(username, "pw").await.unwrap();
        }
        let acquirer = Arc::new(FakeAcquirer::default());
        let handler = SessionJobHandler::new(
            acquirer.clone(),
            stores.accounts.clone(),
            stores.sessions.clone(),
        );
        SessionHarness {
            handler,
            accounts: stores.accounts,
            sessions: stores.sessions,
            acquirer,
        }
    }

    fn session_job(username: &str) -> SessionJob {
        SessionJob {
            username: username.into(),
            password: Secret::from("pw"),
        }
    }

    #[tokio::test]
    async fn successful_refresh_stores_session() {
        let h = session_harness(&["alice"]).await;
        h.handler.handle(Uuid::new_v4(), &session_job("alice")).await.unwrap();

        let sessions = h.sessions.list().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].username, "alice");
        assert_eq!(h.acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn cannot_login_removes_account_and_session() {
        let h = session_harness(&["alice", "bob"]).await;
        h.sessions
            .set_for_username("bob", session("bob", Utc::now(), Some(5.0)))
            .await
            .unwrap();
        h.acquirer
            .script("bob", Err(AccountError::cannot_login("bob")))
            .await;

        let err = h.handler.handle(Uuid::new_v4(), &session_job("bob")).await.unwrap_err();
        assert!(!err.is_transient());

        let names: Vec<String> = h
            .accounts
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|a: Account| a.username)
            .collect();
        assert_eq!(names, vec!["alice".to_string()]);
        assert!(h.sessions.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_keeps_account() {
        let h = session_harness(&["alice"]).await;
        h.sessions
            .set_for_username("alice", session("alice", Utc::now(), Some(5.0)))
            .await
            .unwrap();
        h.acquirer
            .script("alice", Err(AccountError::other("timeout")))
            .await;

        let err = h.handler.handle(Uuid::new_v4(), &session_job("alice")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(h.accounts.list().await.unwrap().len(), 1);
        assert_eq!(h.sessions.list().await.unwrap().len(), 1);
    }

    #[test]
    fn caption_uses_label_id_time_format() {
        let at = Local.with_ymd_and_hms(2024, 7, 10, 18, 5, 0).unwrap();
        assert_eq!(
            label_caption("jane_sender-1", "Priority-9400.pdf", at),
            "jane_sender-1-Priority-9400.pdf\nLabel Generated - Jul 10, 2024, 6:05 PM"
        );
        let id = shipment("USPM").label_id(at);
        assert!(id.ends_with("Jul 10, 2024, 6:05 PM"), "got {id}");
    }

    #[test]
    fn label_job_wire_format_is_camel_case() {
        let json = serde_json::to_value(label_job()).unwrap();
        assert_eq!(json["labelId"], "jane_sender-1");
        assert_eq!(json["requesterRef"], "chat-42");
        assert!(json.get("requester").is_none());

        let back: LabelJob = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back.requester_ref, "chat-42");
        assert_eq!(json["shipment"]["To"]["mail_class"], "USPM");

        let job = serde_json::to_value(session_job("alice")).unwrap();
        assert_eq!(job, serde_json::json!({"username": "alice", "password": "pw"}));
    }
}
