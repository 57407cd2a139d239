//! `repairdesk-core` — shared domain building blocks.
//!
//! Pure domain primitives only: identifiers, the error model, money and
//! line-item arithmetic, and document numbering. No IO lives here.

pub mod entity;
pub mod error;
pub mod id;
pub mod line_item;
pub mod money;
pub mod numbering;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ClaimId, CustomerId, EstimateId, InvoiceId, PaymentId, TenantId, TicketId};
pub use line_item::{LineItem, LineItemInput, Totals};
pub use money::{Money, max_money};
pub use numbering::DocumentKind;
