//! Carrier-backed job seams
//!
//! Job handlers and scheduler ticks depend on these traits rather than on
//! `CarrierClient` directly, so tests can count calls without a portal.

use std::future::Future;
use std::pin::Pin;

use carrier::{CarrierClient, FundingError, PurchaseReceipt, RenderedLabel, Session, Shipment};

/// Runs the three-step label protocol.
pub trait LabelPrinter: Send + Sync {
    fn print<'a>(
        &'a self,
        shipment: &'a Shipment,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = carrier::Result<RenderedLabel>> + Send + 'a>>;
}

/// Buys postage for a session's account.
pub trait PostageFunder: Send + Sync {
    fn fund<'a>(
        &'a self,
        session: &'a Session,
        amount: u32,
    ) -> Pin<Box<dyn Future<Output = Result<PurchaseReceipt, FundingError>> + Send + 'a>>;
}

impl LabelPrinter for CarrierClient {
    fn print<'a>(
        &'a self,
        shipment: &'a Shipment,
        session: &'a Session,
    ) -> Pin<Box<dyn Future<Output = carrier::Result<RenderedLabel>> + Send + 'a>> {
        Box::pin(self.print_label(shipment, session))
    }
}

impl PostageFunder for CarrierClient {
    fn fund<'a>(
        &'a self,
        session: &'a Session,
        amount: u32,
    ) -> Pin<Box<dyn Future<Output = Result<PurchaseReceipt, FundingError>> + Send + 'a>> {
        Box::pin(self.purchase_postage(session, amount))
    }
}
