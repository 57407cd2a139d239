use serde::{Deserialize, Serialize};

use repairdesk_core::{CustomerId, Entity, TenantId};

/// Customer record as exposed by the customer surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Customer {
    /// Loose phone match: compares digits only, and accepts a query that is a
    /// contiguous run of the stored number (e.g. without country code).
    pub fn phone_matches(&self, query: &str) -> bool {
        let wanted = digits_only(query);
        if wanted.is_empty() {
            return false;
        }
        self.phone
            .as_deref()
            .map(digits_only)
            .is_some_and(|have| have.contains(&wanted))
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Strip everything but ASCII digits.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}
