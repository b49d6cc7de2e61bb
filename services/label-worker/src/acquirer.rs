//! Session acquisition
//!
//! Logging in happens in a browser-automation sidecar. This module posts the
//! credentials to it, takes back the captured auth headers, then reads the
//! account's identifiers and postage balance from the portal.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use carrier::{AuthHeaders, CarrierClient, Session};
use chrono::Utc;
use common::{AccountError, Secret};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Turns credentials into an authenticated session.
pub trait SessionAcquirer: Send + Sync {
    fn acquire<'a>(
        &'a self,
        username: &'a str,
        password: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Session, AccountError>> + Send + 'a>>;
}

#[derive(Serialize)]
struct AcquireRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcquireResponse {
    headers: AuthHeaders,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Acquirer backed by the login sidecar's HTTP endpoint.
pub struct SidecarAcquirer {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    carrier: CarrierClient,
}

impl SidecarAcquirer {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        timeout: Duration,
        carrier: CarrierClient,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            timeout,
            carrier,
        }
    }

    async fn login(&self, username: &str, password: &Secret<String>) -> Result<Session, AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::cannot_login(username));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&AcquireRequest {
                username,
                password: password.expose(),
            })
            .send()
            .await
            .map_err(|e| AccountError::other(format!("session acquisition failed: {e}")))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            warn!(username, status = status.as_u16(), "login rejected");
            return Err(AccountError::cannot_login(username));
        }
        if !status.is_success() {
            return Err(AccountError::other(format!(
                "session acquisition returned {status}"
            )));
        }

        let acquired: AcquireResponse = response
            .json()
            .await
            .map_err(|e| AccountError::other(format!("invalid acquisition response: {e}")))?;

        let mut session = Session {
            headers: acquired.headers,
            username: username.to_string(),
            customer_id: acquired.customer_id,
            user_id: acquired.user_id,
            created_at: Utc::now(),
            balance: None,
            control_total: None,
        };

        match self.carrier.account_info(&session.headers).await {
            Ok(Some(info)) => {
                session.customer_id = session.customer_id.or(info.customer_id);
                session.user_id = session.user_id.or(info.user_id);
                session.apply_balance(info.balance);
            }
            Ok(None) => warn!(username, "account info unavailable, balance unknown"),
            Err(e) => warn!(username, error = %e, "account info lookup failed"),
        }

        info!(username, balance = ?session.balance, "session acquired");
        Ok(session)
    }
}

impl SessionAcquirer for SidecarAcquirer {
    fn acquire<'a>(
        &'a self,
        username: &'a str,
        password: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Session, AccountError>> + Send + 'a>> {
        Box::pin(self.login(username, password))
    }
}
