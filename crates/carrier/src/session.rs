//! Authenticated portal sessions
//!
//! A session is the header set captured from a logged-in browser plus the
//! account identifiers and the postage balance read at acquisition time.

use chrono::{DateTime, TimeDelta, Utc};
use common::Secret;
use serde::{Deserialize, Serialize};

/// Sessions older than this are not used for label work.
pub const SESSION_TTL: TimeDelta = TimeDelta::minutes(5);

/// Headers that authenticate portal calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthHeaders {
    pub cookie: Secret<String>,
    #[serde(rename = "sec-ch-ua", default)]
    pub sec_ch_ua: String,
    #[serde(rename = "sec-ch-ua-mobile", default)]
    pub sec_ch_ua_mobile: String,
    #[serde(rename = "sec-ch-ua-platform", default)]
    pub sec_ch_ua_platform: String,
}

impl AuthHeaders {
    /// Header name/value pairs to attach to a request.
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("cookie", self.cookie.expose().as_str()),
            ("sec-ch-ua", self.sec_ch_ua.as_str()),
            ("sec-ch-ua-mobile", self.sec_ch_ua_mobile.as_str()),
            ("sec-ch-ua-platform", self.sec_ch_ua_platform.as_str()),
        ]
    }
}

/// Postage balance as reported by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PostageBalance {
    pub available_postage: f64,
    pub control_total: f64,
}

/// An authenticated session for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub headers: AuthHeaders,
    pub username: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub control_total: Option<f64>,
}

impl Session {
    /// Fresh means younger than [`SESSION_TTL`] at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < SESSION_TTL
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// Record a balance reported by the portal (after a top-up, say).
    pub fn apply_balance(&mut self, balance: PostageBalance) {
        self.balance = Some(balance.available_postage);
        self.control_total = Some(balance.control_total);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn session_at(username: &str, created_at: DateTime<Utc>) -> Session {
        Session {
            headers: AuthHeaders {
                cookie: Secret::from("sid=abc"),
                sec_ch_ua: "\"Chromium\";v=\"126\"".into(),
                sec_ch_ua_mobile: "?0".into(),
                sec_ch_ua_platform: "\"Linux\"".into(),
            },
            username: username.to_string(),
            customer_id: Some("C-1".into()),
            user_id: Some("U-1".into()),
            created_at,
            balance: Some(42.0),
            control_total: Some(100.0),
        }
    }

    #[test]
    fn freshness_boundary() {
        let now = Utc::now();
        assert!(session_at("a", now - TimeDelta::minutes(4)).is_fresh_at(now));
        assert!(!session_at("a", now - TimeDelta::minutes(5)).is_fresh_at(now));
        assert!(!session_at("a", now - TimeDelta::minutes(6)).is_fresh_at(now));
    }

    #[test]
    fn serializes_with_portal_field_names() {
        let session = session_at("alice", Utc::now());
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["customerId"], "C-1");
        assert_eq!(value["controlTotal"], 100.0);
        assert_eq!(value["headers"]["cookie"], "sid=abc");
        assert_eq!(value["headers"]["sec-ch-ua-mobile"], "?0");

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn debug_redacts_cookie() {
        let session = session_at("alice", Utc::now());
        let debug = format!("{session:?}");
        assert!(!debug.contains("sid=abc"));
    }

    #[test]
    fn apply_balance_updates_both_fields() {
        let mut session = session_at("alice", Utc::now());
        session.apply_balance(PostageBalance {
            available_postage: 510.0,
            control_total: 600.0,
        });
        assert_eq!(session.balance, Some(510.0));
        assert_eq!(session.control_total, Some(600.0));
    }
}
