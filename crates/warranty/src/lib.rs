//! Warranty window derivation and the claim lifecycle.
//!
//! Claims snapshot the repair facts that were true when they were filed and
//! never read the live ticket again.

pub mod claim;
pub mod lookup;

pub use claim::{ClaimStatus, ClaimUpdate, FileClaim, RepairSnapshot, ResolutionType, WarrantyClaim};
pub use lookup::{WARRANTY_PERIOD_DAYS, WarrantyStatus, warranty_expires};
