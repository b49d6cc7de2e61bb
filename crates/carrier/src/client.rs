//! Label protocol and account calls against the carrier portal
//!
//! Label generation is three sequential calls that all reuse the session's
//! captured headers:
//! 1. CreateIndicium: submit the shipment, receive a signed label URL token
//! 2. CreateTwoUpLabel: turn the token into a printable two-up document URL
//! 3. GET the document URL with the PDF rendering query appended
//!
//! POST bodies are JSON text sent with the portal's form content type.
//! No cookie refresh happens mid-protocol; a session that went stale
//! between acquisition and use surfaces as an "expired" classification.

use std::time::Duration;

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, REFERER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::classify::{LabelFailure, classify_indicium_error};
use crate::constants::{
    ACCOUNT_INFO_PATH, CREATE_INDICIUM_PATH, CREATE_TWO_UP_LABEL_PATH, FORM_CONTENT_TYPE,
    LAYOUT_LEFT, LAYOUT_RIGHT, PURCHASE_POSTAGE_PATH, RENDERING_QUERY, XHR_HEADERS,
};
use crate::error::{Error, FundingError, Result};
use crate::payload::IndiciumPayload;
use crate::session::{AuthHeaders, PostageBalance, Session};
use crate::shipment::Shipment;

/// Step-1 response. Either `URL` is set or `ErrorCode` is non-zero.
#[derive(Debug, Clone, Deserialize)]
pub struct IndiciumResponse {
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(rename = "trackingNumber", default)]
    pub tracking_number: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: Option<i64>,
    #[serde(rename = "ErrorDescription", default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwoUpResponse {
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(rename = "ErrorDescription", default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResponse {
    #[serde(rename = "ErrorCode", default)]
    error_code: Option<i64>,
    #[serde(default)]
    info: Option<AccountInfoBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountInfoBody {
    #[serde(rename = "CustomerID", default)]
    customer_id: Option<Value>,
    #[serde(rename = "UserID", default)]
    user_id: Option<Value>,
    postage_balance: PostageBalance,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PurchaseResponse {
    #[serde(default)]
    purchase_status: Option<String>,
    #[serde(default)]
    postage_balance: Option<PostageBalance>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Account identifiers and balance read from GetAccountInfo.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub customer_id: Option<String>,
    pub user_id: Option<String>,
    pub balance: PostageBalance,
}

/// A successful postage purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub amount: u32,
    /// Balance after the purchase, when the portal reports it.
    pub balance: Option<PostageBalance>,
}

/// A rendered label document.
#[derive(Debug, Clone)]
pub struct RenderedLabel {
    pub bytes: Bytes,
    pub filename: String,
    pub tracking_number: String,
}

/// Portal identifiers come back as numbers; sessions carry them as strings.
fn id_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// HTTP client for the carrier portal.
#[derive(Debug, Clone)]
pub struct CarrierClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl CarrierClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Session headers plus the fixed XHR set.
    fn headers(&self, auth: &AuthHeaders) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let mut insert = |name: &'static str, value: &str| -> Result<()> {
            let value =
                HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.to_string()))?;
            headers.insert(HeaderName::from_static(name), value);
            Ok(())
        };
        for &(name, value) in XHR_HEADERS {
            insert(name, value)?;
        }
        for (name, value) in auth.pairs() {
            insert(name, value)?;
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        let referer = format!("{}/", self.base_url);
        headers.insert(
            REFERER,
            HeaderValue::from_str(&referer).map_err(|_| Error::InvalidHeader("referer".into()))?,
        );
        Ok(headers)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Http(format!("{what} timed out after {:?}", self.timeout))
                } else {
                    Error::Http(format!("{what} request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        auth: &AuthHeaders,
        path: &str,
        body: Option<&Value>,
        what: &str,
    ) -> Result<T> {
        let mut request = self.http.post(self.url(path)).headers(self.headers(auth)?);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }
        let response = self.send(request, what).await?;
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("{what} body read failed: {e}")))?;
        serde_json::from_str(&text).map_err(|e| Error::Decode(format!("{what}: {e}")))
    }

    /// Step 1. Returns the label URL token and tracking number, or a
    /// classified `LABEL_CREATION_FAILED`.
    pub async fn create_indicium(
        &self,
        shipment: &Shipment,
        session: &Session,
        ship_date: NaiveDate,
    ) -> Result<(String, String)> {
        let payload = IndiciumPayload::build(shipment, session.customer_id.as_deref(), ship_date);
        let body = payload
            .to_body()
            .map_err(|e| Error::Decode(format!("indicium payload: {e}")))?;

        let response: IndiciumResponse = self
            .post_json(&session.headers, CREATE_INDICIUM_PATH, Some(&body), "create indicium")
            .await?;

        match (response.url, response.tracking_number) {
            (Some(url), Some(tracking)) if !url.is_empty() && !tracking.is_empty() => {
                Ok((url, tracking))
            }
            (Some(url), _) if !url.is_empty() => {
                tracing::error!(username = %session.username, "indicium has no tracking number");
                Err(LabelFailure::Other("no tracking number returned".into())
                    .into_error()
                    .into())
            }
            _ => {
                let failure = match response.error_code {
                    Some(0) => LabelFailure::Other("no label URL returned".into()),
                    code => {
                        let description = response.error_description.unwrap_or_else(|| {
                            format!("error code {}", code.unwrap_or_default())
                        });
                        classify_indicium_error(&description)
                    }
                };
                tracing::error!(
                    username = %session.username,
                    error_code = ?response.error_code,
                    "carrier refused indicium"
                );
                Err(failure.into_error().into())
            }
        }
    }

    /// Step 2. Returns the printable document URL.
    pub async fn create_two_up_label(&self, auth: &AuthHeaders, label_url: &str) -> Result<String> {
        let body = json!({
            "isCreateTwoUpForPdf": true,
            "layoutLeft": LAYOUT_LEFT,
            "layoutRight": LAYOUT_RIGHT,
            "labelUrl": label_url,
        });
        let response: TwoUpResponse = self
            .post_json(auth, CREATE_TWO_UP_LABEL_PATH, Some(&body), "create two-up label")
            .await?;
        match response.url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => {
                let description = response
                    .error_description
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| "no document URL returned".into());
                Err(LabelFailure::Other(description).into_error().into())
            }
        }
    }

    /// Step 3. Fetch the rendered PDF bytes.
    pub async fn fetch_rendering(&self, auth: &AuthHeaders, document_url: &str) -> Result<Bytes> {
        let url = format!("{document_url}{RENDERING_QUERY}");
        let request = self.http.get(url).headers(self.headers(auth)?);
        let response = match self.send(request, "fetch rendering").await {
            Err(Error::Status { status, .. }) => {
                return Err(LabelFailure::Other(format!("rendering returned {status}"))
                    .into_error()
                    .into());
            }
            other => other?,
        };
        response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("rendering body read failed: {e}")))
    }

    /// Run the full three-step protocol for one shipment.
    pub async fn print_label(&self, shipment: &Shipment, session: &Session) -> Result<RenderedLabel> {
        let ship_date = Utc::now().date_naive();
        let (label_url, tracking_number) =
            self.create_indicium(shipment, session, ship_date).await?;
        let document_url = self
            .create_two_up_label(&session.headers, &label_url)
            .await?;
        let bytes = self.fetch_rendering(&session.headers, &document_url).await?;

        let filename = format!("{}-{tracking_number}.pdf", shipment.service_name());
        tracing::info!(
            username = %session.username,
            filename = %filename,
            size = bytes.len(),
            "label rendered"
        );
        Ok(RenderedLabel {
            bytes,
            filename,
            tracking_number,
        })
    }

    /// Read identifiers and balance. `None` when the portal reports an error
    /// code or omits the info block.
    pub async fn account_info(&self, auth: &AuthHeaders) -> Result<Option<AccountInfo>> {
        let response: AccountInfoResponse = self
            .post_json(auth, ACCOUNT_INFO_PATH, None, "account info")
            .await?;
        if response.error_code != Some(0) {
            return Ok(None);
        }
        Ok(response.info.map(|info| AccountInfo {
            customer_id: id_string(info.customer_id),
            user_id: id_string(info.user_id),
            balance: info.postage_balance,
        }))
    }

    /// Purchase `amount` of postage against the session's control total.
    pub async fn purchase_postage(
        &self,
        session: &Session,
        amount: u32,
    ) -> std::result::Result<PurchaseReceipt, FundingError> {
        let body = json!({
            "PurchaseAmount": amount,
            "ControlTotal": session.control_total,
            "ClientFingerprint": "",
        });
        let response: PurchaseResponse = self
            .post_json(&session.headers, PURCHASE_POSTAGE_PATH, Some(&body), "purchase postage")
            .await
            .map_err(|e| FundingError(e.to_string()))?;

        if response.purchase_status.as_deref() != Some("Success") {
            let reason = response
                .error_description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "Unable to fund account".to_string());
            return Err(FundingError(reason));
        }

        Ok(PurchaseReceipt {
            amount,
            balance: response.postage_balance,
        })
    }
}
