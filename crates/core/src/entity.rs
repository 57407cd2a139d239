//! Entity trait: identity plus the tenant that owns it.

use crate::TenantId;

/// A tenant-owned entity.
///
/// Stores use `tenant_id()` to filter every read and write, so an entity from
/// another tenant is never observable.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;

    fn tenant_id(&self) -> TenantId;

    /// True when this entity is owned by `tenant_id`.
    fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.tenant_id() == tenant_id
    }
}
