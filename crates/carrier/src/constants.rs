//! Carrier portal endpoints and fixed request values
//!
//! Paths are relative to the configured portal base URL so tests can point
//! the client at a local mock. Header values mirror what the portal's own
//! web client sends for its XHR calls.

/// Default portal base URL.
pub const DEFAULT_BASE_URL: &str = "https://print.stamps.com";

/// Step 1: create the signed indicium.
pub const CREATE_INDICIUM_PATH: &str = "/WebPostage/Ajax/CreateIndicium.aspx?env=WebPostage";

/// Step 2: create the two-up label from the indicium token.
pub const CREATE_TWO_UP_LABEL_PATH: &str = "/WebPostage/Ajax/CreateTwoUpLabel.aspx";

/// Account info lookup (postage balance and control total).
pub const ACCOUNT_INFO_PATH: &str = "/WebPostage/Ajax/GetAccountInfo.aspx";

/// Postage purchase (balance top-up).
pub const PURCHASE_POSTAGE_PATH: &str = "/WebPostage/Ajax/PurchasePostage.aspx";

/// Query suffix appended to the step-2 URL when fetching the rendering.
pub const RENDERING_QUERY: &str = "&printType=pdf&scale=100:98&labelMargins=0:0:0:0";

/// Two-up layouts requested in step 2.
pub const LAYOUT_LEFT: &str = "domestic_pdf";
pub const LAYOUT_RIGHT: &str = "roll4x6";

/// Mail class code for ground service; everything else prints as Priority.
pub const MAIL_CLASS_GROUND: &str = "USGA";

/// Local-time stamp used in label ids and delivery captions.
pub const LABEL_TIME_FORMAT: &str = "%b %-d, %Y, %-I:%M %p";

/// Fixed XHR-style headers sent with every protocol call.
pub const XHR_HEADERS: &[(&str, &str)] = &[
    ("accept", "*/*"),
    ("accept-language", "en-US,en;q=0.9"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("x-requested-with", "XMLHttpRequest"),
    ("referrer-policy", "strict-origin"),
];

/// Content type the portal expects on POST bodies (JSON text, form media type).
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
