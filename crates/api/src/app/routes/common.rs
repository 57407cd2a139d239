use axum::response::Response;

use repairdesk_auth::{CommandAuthorization, Permission};

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

/// Pairs a command with the permissions needed to run it.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self { inner, required: vec![required] }
    }

    /// Authorize and hand back the command, or a 403 response.
    pub fn authorize(self, tenant: &TenantContext, principal: &PrincipalContext) -> Result<C, Response> {
        crate::authz::authorize_command(tenant, principal, &self).map_err(errors::forbidden)?;
        Ok(self.inner)
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Guard for reads, which carry no command.
pub fn require(tenant: &TenantContext, principal: &PrincipalContext, permission: Permission) -> Result<(), Response> {
    CmdAuth::new((), permission).authorize(tenant, principal)
}
