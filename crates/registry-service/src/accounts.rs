//! Account administration
//!
//! Creating, activating and listing accounts needs `manage_users`; anything
//! that writes a role assignment also needs `manage_roles`. Role names are
//! checked against the role table here, at write time. The engine itself
//! stays lenient and ignores unknown names it meets at decision time.

use crate::principals::resolve_principal;
use registry_authorization::AccessGate;
use registry_core::effects::PrincipalDirectory;
use registry_core::{
    Account, Capability, NewAccount, Principal, PrincipalId, RegistryError, Result, RoleName,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Account with its current role assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// The account
    #[serde(flatten)]
    pub account: Account,
    /// Assigned role names
    pub roles: Vec<RoleName>,
}

/// Gated account operations over a principal directory
pub struct AccountService<D> {
    directory: Arc<D>,
    gate: AccessGate,
}

impl<D: PrincipalDirectory> AccountService<D> {
    /// Assemble the service
    pub fn new(directory: Arc<D>, gate: AccessGate) -> Self {
        Self { directory, gate }
    }

    /// Create an account
    pub async fn create_account(&self, actor: PrincipalId, new: NewAccount) -> Result<Account> {
        let principal = self.admin(actor, !new.roles.is_empty()).await?;
        new.validate()?;
        self.check_role_names(&new.roles)?;

        let account = self.directory.create_account(new).await?;
        info!(
            account = %account.id,
            username = %account.username,
            actor = %principal.id(),
            "account created"
        );
        Ok(account)
    }

    /// Replace the roles assigned to `target`
    pub async fn assign_roles(
        &self,
        actor: PrincipalId,
        target: PrincipalId,
        roles: Vec<RoleName>,
    ) -> Result<Vec<RoleName>> {
        let principal = self.admin(actor, true).await?;
        self.check_role_names(&roles)?;

        self.directory.set_roles(target, &roles).await?;
        info!(
            account = %target,
            roles = ?roles,
            actor = %principal.id(),
            "roles assigned"
        );
        self.directory.roles_of(target).await
    }

    /// Activate or deactivate `target`; its receipts are untouched
    pub async fn set_active(
        &self,
        actor: PrincipalId,
        target: PrincipalId,
        active: bool,
    ) -> Result<Account> {
        let principal = self.admin(actor, false).await?;
        let account = self.directory.set_active(target, active).await?;
        info!(account = %target, active, actor = %principal.id(), "account activation changed");
        Ok(account)
    }

    /// Grant or revoke superuser status of `target`
    pub async fn set_superuser(
        &self,
        actor: PrincipalId,
        target: PrincipalId,
        superuser: bool,
    ) -> Result<Account> {
        let principal = self.admin(actor, false).await?;
        let account = self.directory.set_superuser(target, superuser).await?;
        info!(account = %target, superuser, actor = %principal.id(), "superuser flag changed");
        Ok(account)
    }

    /// Every account with its roles, ordered by username
    pub async fn list_accounts(&self, actor: PrincipalId) -> Result<Vec<AccountSummary>> {
        self.admin(actor, false).await?;
        let mut summaries = Vec::new();
        for account in self.directory.list_accounts().await? {
            let roles = self.directory.roles_of(account.id).await?;
            summaries.push(AccountSummary { account, roles });
        }
        Ok(summaries)
    }

    /// Create whichever of `accounts` do not exist yet, without gating
    ///
    /// First-run provisioning only: there is no administrator to act as
    /// before this has run. Existing usernames are left as they are.
    pub async fn bootstrap(&self, accounts: Vec<NewAccount>) -> Result<Vec<Account>> {
        let mut created = Vec::new();
        for new in accounts {
            new.validate()?;
            self.check_role_names(&new.roles)?;
            if self
                .directory
                .account_by_username(&new.username)
                .await?
                .is_some()
            {
                debug!(username = %new.username, "bootstrap account already present");
                continue;
            }
            let account = self.directory.create_account(new).await?;
            info!(account = %account.id, username = %account.username, "bootstrap account created");
            created.push(account);
        }
        Ok(created)
    }

    async fn admin(&self, actor: PrincipalId, touches_roles: bool) -> Result<Principal> {
        let principal = resolve_principal(self.directory.as_ref(), actor).await?;
        self.gate.require(&principal, Capability::ManageUsers)?;
        if touches_roles {
            self.gate.require(&principal, Capability::ManageRoles)?;
        }
        Ok(principal)
    }

    fn check_role_names(&self, roles: &[RoleName]) -> Result<()> {
        let table = self.gate.engine().roles();
        match roles.iter().find(|r| !table.contains(r.as_str())) {
            Some(unknown) => Err(RegistryError::invalid(format!("unknown role: {unknown}"))),
            None => Ok(()),
        }
    }
}
