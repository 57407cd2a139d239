use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role name carried in tokens ("owner", "front_desk", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Permissions this role grants. Unknown roles grant nothing.
    pub fn permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            "owner" | "admin" => vec![Permission::ALL],
            "manager" => vec![
                Permission::INVOICES_READ,
                Permission::INVOICES_CREATE,
                Permission::INVOICES_UPDATE,
                Permission::INVOICES_DELETE,
                Permission::INVOICES_PAY,
                Permission::ESTIMATES_READ,
                Permission::ESTIMATES_WRITE,
                Permission::ESTIMATES_DELETE,
                Permission::ESTIMATES_CONVERT,
                Permission::WARRANTY_READ,
                Permission::WARRANTY_FILE,
                Permission::WARRANTY_MANAGE,
            ],
            "technician" => vec![
                Permission::INVOICES_READ,
                Permission::ESTIMATES_READ,
                Permission::ESTIMATES_WRITE,
                Permission::WARRANTY_READ,
                Permission::WARRANTY_FILE,
            ],
            "front_desk" => vec![
                Permission::INVOICES_READ,
                Permission::INVOICES_CREATE,
                Permission::INVOICES_PAY,
                Permission::ESTIMATES_READ,
                Permission::ESTIMATES_WRITE,
                Permission::ESTIMATES_CONVERT,
                Permission::WARRANTY_READ,
                Permission::WARRANTY_FILE,
            ],
            _ => Vec::new(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Union of the permissions granted by `roles`, without duplicates.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut granted: Vec<Permission> = Vec::new();
    for perm in roles.iter().flat_map(Role::permissions) {
        if !granted.contains(&perm) {
            granted.push(perm);
        }
    }
    granted
}
