//! Per-request principal resolution

use registry_core::effects::PrincipalDirectory;
use registry_core::{Principal, PrincipalId, RegistryError, Result};

/// Load the account and its current roles; inactive accounts are refused
///
/// Roles are read on every call so a revocation applies to the next request.
pub async fn resolve_principal<D>(directory: &D, id: PrincipalId) -> Result<Principal>
where
    D: PrincipalDirectory + ?Sized,
{
    let account = directory
        .account(id)
        .await?
        .ok_or_else(|| RegistryError::not_found(format!("principal {id}")))?;
    if !account.active {
        return Err(RegistryError::InactivePrincipal { principal: id });
    }
    let roles = directory.roles_of(id).await?;
    Ok(Principal::new(account, roles))
}
