//! Estimate engine: quotes with their own lifecycle that can be converted
//! (once) into a repair ticket.

pub mod estimate;

pub use estimate::{
    Conversion, CreateEstimate, DEFAULT_TAX_RATE, DEFAULT_VALIDITY_DAYS, Estimate, EstimateDraft,
    EstimateStatus, EstimateStatusUpdate,
};
