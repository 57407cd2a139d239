//! Human-readable, per-tenant document numbers.
//!
//! Sequence values are allocated by the store (one counter row per tenant and
//! kind); this module only formats them.

use serde::{Deserialize, Serialize};

/// Kinds of numbered documents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Estimate,
    Ticket,
    WarrantyClaim,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Invoice,
        DocumentKind::Estimate,
        DocumentKind::Ticket,
        DocumentKind::WarrantyClaim,
    ];

    /// Stable key used for the sequence row.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Estimate => "estimate",
            DocumentKind::Ticket => "ticket",
            DocumentKind::WarrantyClaim => "warranty_claim",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INV",
            DocumentKind::Estimate => "EST",
            DocumentKind::Ticket => "TKT",
            DocumentKind::WarrantyClaim => "WC",
        }
    }

    /// `INV-00042`. Values wider than five digits are printed in full.
    pub fn format(&self, sequence: u64) -> String {
        format!("{}-{:05}", self.prefix(), sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded_numbers() {
        assert_eq!(DocumentKind::Invoice.format(1), "INV-00001");
        assert_eq!(DocumentKind::Estimate.format(42), "EST-00042");
        assert_eq!(DocumentKind::Ticket.format(123_456), "TKT-123456");
    }
}
