//! Invoice ledger and payment applier.
//!
//! This crate holds the deterministic rules only (no IO, no HTTP, no storage).
//! Stores call into it from inside their transactions.

pub mod invoice;
pub mod payment;

pub use invoice::{CreateInvoice, Invoice, InvoiceDraft, InvoiceStatus, InvoiceStatusUpdate};
pub use payment::{ApplyPayment, Payment, PaymentMethod, PaymentOutcome};
