//! Principal directory interface
//!
//! Supplies accounts and their current role assignments. Role assignments are
//! ground truth per call; callers must not cache them across requests.

use crate::errors::Result;
use crate::identifiers::PrincipalId;
use crate::principal::{Account, NewAccount, RoleName};
use async_trait::async_trait;

/// Account and role-assignment lookups plus administrative mutations
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Look up an account by identity
    async fn account(&self, id: PrincipalId) -> Result<Option<Account>>;

    /// Look up an account by login name
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>>;

    /// Role names currently assigned to a principal
    async fn roles_of(&self, id: PrincipalId) -> Result<Vec<RoleName>>;

    /// Persist a new account with its initial roles
    ///
    /// Fails with `Conflict` when the username is taken.
    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    /// Replace a principal's role assignment
    async fn set_roles(&self, id: PrincipalId, roles: &[RoleName]) -> Result<()>;

    /// Activate or deactivate an account
    async fn set_active(&self, id: PrincipalId, active: bool) -> Result<Account>;

    /// Grant or revoke superuser status
    async fn set_superuser(&self, id: PrincipalId, superuser: bool) -> Result<Account>;

    /// Every account, ordered by username
    async fn list_accounts(&self) -> Result<Vec<Account>>;
}
