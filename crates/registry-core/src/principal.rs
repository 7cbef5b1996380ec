//! Principals, accounts and role names

use crate::errors::{RegistryError, Result};
use crate::identifiers::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum username length accepted by the account store
pub const MAX_USERNAME_LEN: usize = 50;

/// Name of a role as assigned to principals
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    /// Wrap a role name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the role name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoleName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Persisted principal account
///
/// Accounts are never deleted; deactivation clears `active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned identity
    pub id: PrincipalId,
    /// Unique login name
    pub username: String,
    /// Deactivated accounts cannot act
    pub active: bool,
    /// Superusers hold every capability
    pub superuser: bool,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// An authenticated actor together with the roles resolved for this request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The underlying account
    pub account: Account,
    /// Role names currently assigned, read fresh per request
    pub roles: BTreeSet<RoleName>,
}

impl Principal {
    /// Combine an account with its role assignment
    pub fn new(account: Account, roles: impl IntoIterator<Item = RoleName>) -> Self {
        Self {
            account,
            roles: roles.into_iter().collect(),
        }
    }

    /// Principal identity
    pub fn id(&self) -> PrincipalId {
        self.account.id
    }

    /// Login name
    pub fn username(&self) -> &str {
        &self.account.username
    }

    /// Superuser flag
    pub fn is_superuser(&self) -> bool {
        self.account.superuser
    }

    /// Active flag
    pub fn is_active(&self) -> bool {
        self.account.active
    }

    /// Whether the named role is assigned
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == role)
    }
}

/// Request to create an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Unique login name
    pub username: String,
    /// Initial active flag
    pub active: bool,
    /// Initial superuser flag
    pub superuser: bool,
    /// Initial role assignment
    pub roles: Vec<RoleName>,
}

impl NewAccount {
    /// Active, non-superuser account with the given roles
    pub fn new(username: impl Into<String>, roles: impl IntoIterator<Item = RoleName>) -> Self {
        Self {
            username: username.into(),
            active: true,
            superuser: false,
            roles: roles.into_iter().collect(),
        }
    }

    /// Mark the account as superuser
    pub fn superuser(mut self) -> Self {
        self.superuser = true;
        self
    }

    /// Check the username constraints
    pub fn validate(&self) -> Result<()> {
        let name = self.username.trim();
        if name.is_empty() {
            return Err(RegistryError::invalid("username must not be empty"));
        }
        if name.len() != self.username.len() {
            return Err(RegistryError::invalid(
                "username must not have surrounding whitespace",
            ));
        }
        if self.username.chars().count() > MAX_USERNAME_LEN {
            return Err(RegistryError::invalid(format!(
                "username exceeds {MAX_USERNAME_LEN} characters"
            )));
        }
        Ok(())
    }
}
