//! Admin API for the account pool, sessions and label jobs
//!
//! Operator endpoints on the worker's listener:
//! - GET    /admin/accounts                    — list accounts (enabled / active markers)
//! - POST   /admin/accounts                    — add or replace an account
//! - DELETE /admin/accounts/{username}         — remove account and its session
//! - POST   /admin/accounts/{username}/disable — disable an account
//! - POST   /admin/accounts/{username}/rotate  — disable and return the next enabled account
//! - GET    /admin/sessions                    — list sessions (never exposes headers)
//! - DELETE /admin/sessions                    — clear every session
//! - POST   /admin/sessions/refresh            — run a refresh cycle now
//! - GET    /admin/stats?since=YYYY-MM-DD      — label statistics since a day
//! - POST   /admin/labels                      — validate a shipment and queue a label job

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use carrier::Shipment;
use chrono::{Local, NaiveDate, Utc};
use common::{AccountErrorKind, ValidationError};
use serde::Deserialize;
use serde_json::{Value, json};
use session_pool::{AccountStore, LabelLedger, SessionStore, stats_since};
use tracing::{info, warn};

use crate::jobs::{LabelJob, SessionJob};
use crate::queue::JobQueue;
use crate::scheduler;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    accounts: Arc<AccountStore>,
    sessions: Arc<SessionStore>,
    ledger: Arc<dyn LabelLedger>,
    session_queue: JobQueue<SessionJob>,
    label_queue: JobQueue<LabelJob>,
}

impl AdminState {
    pub fn new(
        accounts: Arc<AccountStore>,
        sessions: Arc<SessionStore>,
        ledger: Arc<dyn LabelLedger>,
        session_queue: JobQueue<SessionJob>,
        label_queue: JobQueue<LabelJob>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            ledger,
            session_queue,
            label_queue,
        }
    }
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/accounts", get(list_accounts).post(add_account))
        .route("/admin/accounts/{username}", delete(delete_account))
        .route("/admin/accounts/{username}/disable", post(disable_account))
        .route("/admin/accounts/{username}/rotate", post(rotate_account))
        .route("/admin/sessions", get(list_sessions).delete(clear_sessions))
        .route("/admin/sessions/refresh", post(refresh_sessions))
        .route("/admin/stats", get(label_stats))
        .route("/admin/labels", post(submit_label))
        .with_state(state)
}

type JsonResponse = (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
);

fn respond(status: StatusCode, body: Value) -> JsonResponse {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

fn validation_failed(err: &ValidationError) -> JsonResponse {
    respond(
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "error": "validation failed", "fields": err.fields }),
    )
}

/// Map a store error onto a status code.
fn store_error(err: session_pool::Error) -> JsonResponse {
    if let session_pool::Error::Validation(e) = &err {
        return validation_failed(e);
    }
    let status = match err.account_kind() {
        Some(AccountErrorKind::NoAccountsFound) => StatusCode::NOT_FOUND,
        Some(AccountErrorKind::NoValidAccount) => StatusCode::CONFLICT,
        _ => {
            warn!(error = %err, "admin store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    respond(status, json!({ "error": err.to_string() }))
}

fn not_found(username: &str) -> JsonResponse {
    respond(
        StatusCode::NOT_FOUND,
        json!({ "error": format!("no account named {username}") }),
    )
}

/// Username of the active session, if any.
async fn active_username(sessions: &SessionStore) -> Option<String> {
    match sessions.get_active().await {
        Ok(active) => active.map(|s| s.username),
        Err(e) => {
            warn!(error = %e, "active session lookup failed");
            None
        }
    }
}

/// GET /admin/accounts — every account with enabled and active markers.
///
/// Never exposes passwords.
async fn list_accounts(State(state): State<AdminState>) -> impl IntoResponse {
    let accounts = match state.accounts.list().await {
        Ok(accounts) => accounts,
        Err(e) => return store_error(e),
    };
    let active = active_username(&state.sessions).await;

    let accounts: Vec<Value> = accounts
        .iter()
        .map(|a| {
            json!({
                "username": a.username,
                "enabled": a.enabled,
                "active": active.as_deref() == Some(a.username.as_str()),
            })
        })
        .collect();
    respond(StatusCode::OK, json!({ "accounts": accounts }))
}

/// Request body for adding an account.
#[derive(Deserialize)]
struct AddAccountRequest {
    username: String,
    password: String,
}

/// POST /admin/accounts — add an account, or replace one with the same username.
async fn add_account(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<AddAccountRequest>,
) -> impl IntoResponse {
    let mut errors = ValidationError::new();
    if body.username.trim().is_empty() {
        errors.insert("username", "required");
    }
    if body.password.is_empty() {
        errors.insert("password", "required");
    }
    if !errors.is_empty() {
        return validation_failed(&errors);
    }

    if let Err(e) = state.accounts.add(body.username.trim(), &body.password).await {
        return store_error(e);
    }
    respond(
        StatusCode::CREATED,
        json!({ "username": body.username.trim(), "status": "added" }),
    )
}

/// DELETE /admin/accounts/{username} — remove an account and its session.
async fn delete_account(
    State(state): State<AdminState>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let removed = match state.accounts.delete(&username).await {
        Ok(removed) => removed,
        Err(e) => return store_error(e),
    };
    if !removed {
        return not_found(&username);
    }
    let session_removed = match state.sessions.delete(&username).await {
        Ok(removed) => removed,
        Err(e) => return store_error(e),
    };

    info!(username, "account removed by operator");
    respond(
        StatusCode::OK,
        json!({
            "username": username,
            "status": "removed",
            "session_removed": session_removed,
        }),
    )
}

/// POST /admin/accounts/{username}/disable — idempotent.
async fn disable_account(
    State(state): State<AdminState>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    match state.accounts.disable(&username).await {
        Ok(true) => respond(
            StatusCode::OK,
            json!({ "username": username, "status": "disabled" }),
        ),
        Ok(false) => not_found(&username),
        Err(e) => store_error(e),
    }
}

/// POST /admin/accounts/{username}/rotate — disable and return the next
/// enabled account.
async fn rotate_account(
    State(state): State<AdminState>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    match state.accounts.rotate(&username).await {
        Ok(Some(next)) => {
            info!(disabled = %username, next = %next.username, "account rotated");
            respond(
                StatusCode::OK,
                json!({ "disabled": username, "next": next.username }),
            )
        }
        Ok(None) => not_found(&username),
        Err(e) => store_error(e),
    }
}

/// GET /admin/sessions — identifiers, balance and freshness per session.
async fn list_sessions(State(state): State<AdminState>) -> impl IntoResponse {
    let sessions = match state.sessions.list().await {
        Ok(sessions) => sessions,
        Err(e) => return store_error(e),
    };
    let active = active_username(&state.sessions).await;
    let now = Utc::now();

    let sessions: Vec<Value> = sessions
        .iter()
        .map(|s| {
            json!({
                "username": s.username,
                "customer_id": s.customer_id,
                "user_id": s.user_id,
                "created_at": s.created_at.to_rfc3339(),
                "balance": s.balance,
                "control_total": s.control_total,
                "fresh": s.is_fresh_at(now),
                "active": active.as_deref() == Some(s.username.as_str()),
            })
        })
        .collect();
    respond(StatusCode::OK, json!({ "sessions": sessions }))
}

/// DELETE /admin/sessions — manual session reset.
async fn clear_sessions(State(state): State<AdminState>) -> impl IntoResponse {
    match state.sessions.clear().await {
        Ok(()) => respond(StatusCode::OK, json!({ "status": "cleared" })),
        Err(e) => store_error(e),
    }
}

/// POST /admin/sessions/refresh — clear sessions and queue a refresh per
/// enabled account.
async fn refresh_sessions(State(state): State<AdminState>) -> impl IntoResponse {
    match scheduler::refresh_tick(&state.accounts, &state.sessions, &state.session_queue).await {
        Ok(jobs) => respond(StatusCode::ACCEPTED, json!({ "jobs_enqueued": jobs })),
        Err(e) => store_error(e),
    }
}

#[derive(Deserialize)]
struct StatsQuery {
    since: Option<NaiveDate>,
}

/// GET /admin/stats — label statistics from the start of `since` (UTC,
/// default today) until now.
async fn label_stats(
    State(state): State<AdminState>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    let now = Utc::now();
    let since = query.since.unwrap_or_else(|| now.date_naive());
    match stats_since(state.ledger.as_ref(), since, now).await {
        Ok(stats) => respond(
            StatusCode::OK,
            json!({ "since": since.to_string(), "stats": stats }),
        ),
        Err(e) => store_error(e),
    }
}

/// Request body for a label job.
#[derive(Deserialize)]
struct SubmitLabelRequest {
    shipment: Value,
    #[serde(default)]
    label_id: Option<String>,
    requester_ref: String,
}

/// POST /admin/labels — validate the shipment and queue a label job.
///
/// The label id is derived from the sender name and the current time when
/// not supplied.
async fn submit_label(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<SubmitLabelRequest>,
) -> impl IntoResponse {
    let shipment = match Shipment::from_value(body.shipment) {
        Ok(shipment) => shipment,
        Err(e) => return validation_failed(&e),
    };
    let label_id = body
        .label_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| shipment.label_id(Local::now()));

    let job = LabelJob {
        shipment,
        label_id: label_id.clone(),
        requester_ref: body.requester_ref,
    };
    match state.label_queue.enqueue(job) {
        Ok(job_id) => {
            info!(job_id = %job_id, label_id, "label job queued");
            respond(
                StatusCode::ACCEPTED,
                json!({ "job_id": job_id.to_string(), "label_id": label_id }),
            )
        }
        Err(e) => respond(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": e.to_string() }),
        ),
    }
}
