//! Carrier portal client: shipment model, sessions and the label protocol
//!
//! Provides:
//! - Shipment parsing with per-field validation
//! - Session and auth header types shared with the session store
//! - CreateIndicium payload construction
//! - Ordered classification of label refusals
//! - `CarrierClient` for the three-step label protocol, account info and
//!   postage purchases

pub mod classify;
pub mod client;
pub mod constants;
pub mod error;
pub mod payload;
pub mod session;
pub mod shipment;

pub use classify::{LabelFailure, classify_indicium_error};
pub use client::{AccountInfo, CarrierClient, PurchaseReceipt, RenderedLabel};
pub use error::{Error, FundingError, Result};
pub use session::{AuthHeaders, PostageBalance, SESSION_TTL, Session};
pub use shipment::{Recipient, Sender, Shipment};
