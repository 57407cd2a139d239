//! Permission guard applied by handlers before they call the billing service.

use repairdesk_auth::{AuthzError, CommandAuthorization, Principal, TenantMembership, authorize, permissions_for_roles};

use crate::context::{PrincipalContext, TenantContext};

/// Check every permission `command` requires against the caller's roles in
/// the request's shop.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_for_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::routes::common::CmdAuth;
    use repairdesk_auth::{Permission, PrincipalId, Role};
    use repairdesk_core::TenantId;

    fn contexts(role: &'static str) -> (TenantContext, PrincipalContext) {
        (
            TenantContext::new(TenantId::new()),
            PrincipalContext::new(PrincipalId::new(), vec![Role::new(role)]),
        )
    }

    #[test]
    fn front_desk_may_convert_but_not_delete() {
        let (tenant, principal) = contexts("front_desk");
        let convert = CmdAuth { inner: (), required: vec![Permission::ESTIMATES_CONVERT] };
        assert!(authorize_command(&tenant, &principal, &convert).is_ok());

        let delete = CmdAuth { inner: (), required: vec![Permission::INVOICES_DELETE] };
        assert_eq!(
            authorize_command(&tenant, &principal, &delete),
            Err(AuthzError::Forbidden("invoices.delete".to_string()))
        );
    }

    #[test]
    fn unknown_role_is_denied() {
        let (tenant, principal) = contexts("visitor");
        let read = CmdAuth { inner: (), required: vec![Permission::INVOICES_READ] };
        assert!(authorize_command(&tenant, &principal, &read).is_err());
    }
}
