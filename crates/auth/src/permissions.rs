use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. "invoices.pay").
///
/// The wildcard `"*"` grants everything within the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission::from_static("*");

    pub const INVOICES_READ: Permission = Permission::from_static("invoices.read");
    pub const INVOICES_CREATE: Permission = Permission::from_static("invoices.create");
    pub const INVOICES_UPDATE: Permission = Permission::from_static("invoices.update");
    pub const INVOICES_DELETE: Permission = Permission::from_static("invoices.delete");
    pub const INVOICES_PAY: Permission = Permission::from_static("invoices.pay");

    pub const ESTIMATES_READ: Permission = Permission::from_static("estimates.read");
    pub const ESTIMATES_WRITE: Permission = Permission::from_static("estimates.write");
    pub const ESTIMATES_DELETE: Permission = Permission::from_static("estimates.delete");
    pub const ESTIMATES_CONVERT: Permission = Permission::from_static("estimates.convert");

    pub const WARRANTY_READ: Permission = Permission::from_static("warranty.read");
    pub const WARRANTY_FILE: Permission = Permission::from_static("warranty.file");
    pub const WARRANTY_MANAGE: Permission = Permission::from_static("warranty.manage");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
