//! Shared fakes for handler, scheduler and admin tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use carrier::{
    AuthHeaders, FundingError, LabelFailure, PostageBalance, PurchaseReceipt, RenderedLabel,
    Session, Shipment,
};
use chrono::{DateTime, Utc};
use common::{AccountError, Secret};
use serde_json::json;
use session_pool::{ACCOUNTS_KEY, AccountStore, KeyValueStore, MemoryKv, MemoryLedger, SessionStore};
use tokio::sync::Mutex;

use crate::acquirer::SessionAcquirer;
use crate::carrier_impl::{LabelPrinter, PostageFunder};
use crate::error::CollaboratorError;
use crate::explainer::ErrorExplainer;
use crate::notifier::{LabelDocument, Notifier, NotifyFuture};

pub fn shipment(mail_class: &str) -> Shipment {
    Shipment::from_value(json!({
        "From": {
            "FullName": "Jane Sender",
            "Address1": "1 Main St",
            "City": "Austin",
            "State": "TX",
            "ZIPCode": "73301"
        },
        "To": {
            "recipient_name": "Sam Receiver",
            "recipient_phone": "5550100",
            "recipient_postcode": "10001-1234",
            "address1": "5 Broadway",
            "city": "New York",
            "state": "ny",
            "weight_lb": 2.5,
            "length_in": 10,
            "width_in": 8,
            "height_in": 4,
            "mail_class": mail_class
        }
    }))
    .unwrap()
}

pub fn session(username: &str, created_at: DateTime<Utc>, balance: Option<f64>) -> Session {
    Session {
        headers: AuthHeaders {
            cookie: Secret::from(format!("sid={username}").as_str()),
            sec_ch_ua: String::new(),
            sec_ch_ua_mobile: "?0".into(),
            sec_ch_ua_platform: String::new(),
        },
        username: username.to_string(),
        customer_id: Some("C-1".into()),
        user_id: None,
        created_at,
        balance,
        control_total: balance.map(|b| b + 1000.0),
    }
}

/// Account, session and ledger stores over one in-memory key-value store.
/// The account collection starts out empty.
pub struct Stores {
    pub accounts: Arc<AccountStore>,
    pub sessions: Arc<SessionStore>,
    pub ledger: Arc<MemoryLedger>,
}

pub async fn stores() -> Stores {
    let kv = Arc::new(MemoryKv::new());
    kv.set(ACCOUNTS_KEY, "[]".to_string()).await.unwrap();
    Stores {
        accounts: Arc::new(AccountStore::new(kv.clone())),
        sessions: Arc::new(SessionStore::new(kv)),
        ledger: Arc::new(MemoryLedger::new()),
    }
}

/// Notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { requester: String, text: String },
    Document { requester: String, filename: String, caption: String },
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send_text<'a>(&'a self, requester: &'a str, text: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.sent.lock().await.push(Sent::Text {
                requester: requester.to_string(),
                text: text.to_string(),
            });
            Ok(())
        })
    }

    fn send_document<'a>(&'a self, requester: &'a str, document: &'a LabelDocument) -> NotifyFuture<'a> {
        Box::pin(async move {
            self.sent.lock().await.push(Sent::Document {
                requester: requester.to_string(),
                filename: document.filename.clone(),
                caption: document.caption.clone(),
            });
            Ok(())
        })
    }
}

/// Notifier whose webhook is down.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send_text<'a>(&'a self, _requester: &'a str, _text: &'a str) -> NotifyFuture<'a> {
        Box::pin(async { Err(CollaboratorError("webhook down".into())) })
    }

    fn send_document<'a>(&'a self, _requester: &'a str, _document: &'a LabelDocument) -> NotifyFuture<'a> {
        Box::pin(async { Err(CollaboratorError("webhook down".into())) })
    }
}

/// Prefixes the message so tests can see it went through the explainer.
pub struct EchoExplainer;

impl ErrorExplainer for EchoExplainer {
    fn explain<'a>(&'a self, error: &'a str) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move { format!("explained: {error}") })
    }
}

/// Printer that counts calls and fails with a fixed classification if set.
#[derive(Default)]
pub struct FakePrinter {
    pub calls: AtomicUsize,
    pub failure: Option<LabelFailure>,
    pub used_sessions: Mutex<Vec<String>>,
}

impl FakePrinter {
    pub fn failing(failure: LabelFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LabelPrinter for FakePrinter {
    fn print<'a>(
        &'a self,
        shipment: &'a Shipment,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = carrier::Result<RenderedLabel>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.used_sessions.lock().await.push(session.username.clone());
            if let Some(failure) = &self.failure {
                return Err(failure.clone().into_error().into());
            }
            Ok(RenderedLabel {
                bytes: Bytes::from_static(b"%PDF-1.7"),
                filename: format!("{}-9400100000000000000000.pdf", shipment.service_name()),
                tracking_number: "9400100000000000000000".into(),
            })
        })
    }
}

/// Funder that records each (username, amount) and refuses listed accounts.
#[derive(Default)]
pub struct FakeFunder {
    pub calls: Mutex<Vec<(String, u32)>>,
    pub refuse: Vec<String>,
}

impl FakeFunder {
    pub async fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().await.clone()
    }
}

impl PostageFunder for FakeFunder {
    fn fund<'a>(
        &'a self,
        session: &'a Session,
        amount: u32,
    ) -> Pin<Box<dyn Future<Output = Result<PurchaseReceipt, FundingError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .await
                .push((session.username.clone(), amount));
            if self.refuse.contains(&session.username) {
                return Err(FundingError("Unable to fund account".into()));
            }
            let previous = session.balance.unwrap_or_default();
            Ok(PurchaseReceipt {
                amount,
                balance: Some(PostageBalance {
                    available_postage: previous + f64::from(amount),
                    control_total: session.control_total.unwrap_or_default() + f64::from(amount),
                }),
            })
        })
    }
}

/// Acquirer returning a scripted result per username.
#[derive(Default)]
pub struct FakeAcquirer {
    pub outcomes: Mutex<Vec<(String, Result<(), AccountError>)>>,
    pub calls: AtomicUsize,
}

impl FakeAcquirer {
    pub async fn script(&self, username: &str, outcome: Result<(), AccountError>) {
        self.outcomes
            .lock()
            .await
            .push((username.to_string(), outcome));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionAcquirer for FakeAcquirer {
    fn acquire<'a>(
        &'a self,
        username: &'a str,
        _password: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Session, AccountError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcomes
                .lock()
                .await
                .iter()
                .find(|(name, _)| name == username)
                .map(|(_, outcome)| outcome.clone())
                .unwrap_or(Ok(()));
            outcome.map(|()| session(username, Utc::now(), Some(100.0)))
        })
    }
}
