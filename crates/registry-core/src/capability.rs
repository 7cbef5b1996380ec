//! Capability tokens and grant scopes
//!
//! The capability set is closed: every guarded action names exactly one
//! variant. Role bundles pair a capability with a [`GrantScope`] describing
//! which records the grant reaches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Atomic permission token guarding one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read member records
    ReadUserData,
    /// Create member records
    CreateUserData,
    /// Update member records
    UpdateUserData,
    /// Delete member records
    DeleteUserData,
    /// Export member records
    ExportUserData,
    /// Read village/area lookups
    ReadVillageArea,
    /// Create village/area lookups
    CreateVillageArea,
    /// Update village/area lookups
    UpdateVillageArea,
    /// Delete village/area lookups
    DeleteVillageArea,
    /// Read donation receipts
    ReadReceipts,
    /// Create donation receipts
    CreateReceipts,
    /// Update donation receipts
    UpdateReceipts,
    /// Cancel donation receipts
    DeleteReceipts,
    /// Export receipt data sets
    ExportReceipts,
    /// Create and administer principal accounts
    ManageUsers,
    /// Assign roles to principals
    ManageRoles,
    /// View aggregate system statistics
    ViewSystemStats,
}

impl Capability {
    /// Every capability, in declaration order
    pub const ALL: [Capability; 17] = [
        Capability::ReadUserData,
        Capability::CreateUserData,
        Capability::UpdateUserData,
        Capability::DeleteUserData,
        Capability::ExportUserData,
        Capability::ReadVillageArea,
        Capability::CreateVillageArea,
        Capability::UpdateVillageArea,
        Capability::DeleteVillageArea,
        Capability::ReadReceipts,
        Capability::CreateReceipts,
        Capability::UpdateReceipts,
        Capability::DeleteReceipts,
        Capability::ExportReceipts,
        Capability::ManageUsers,
        Capability::ManageRoles,
        Capability::ViewSystemStats,
    ];

    /// Stable snake_case token
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadUserData => "read_user_data",
            Capability::CreateUserData => "create_user_data",
            Capability::UpdateUserData => "update_user_data",
            Capability::DeleteUserData => "delete_user_data",
            Capability::ExportUserData => "export_user_data",
            Capability::ReadVillageArea => "read_village_area",
            Capability::CreateVillageArea => "create_village_area",
            Capability::UpdateVillageArea => "update_village_area",
            Capability::DeleteVillageArea => "delete_village_area",
            Capability::ReadReceipts => "read_receipts",
            Capability::CreateReceipts => "create_receipts",
            Capability::UpdateReceipts => "update_receipts",
            Capability::DeleteReceipts => "delete_receipts",
            Capability::ExportReceipts => "export_receipts",
            Capability::ManageUsers => "manage_users",
            Capability::ManageRoles => "manage_roles",
            Capability::ViewSystemStats => "view_system_stats",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown capability or grant token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability token: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// Which records a grant reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    /// Records created by the principal only
    Own,
    /// Every record
    Any,
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantScope::Own => f.write_str("own"),
            GrantScope::Any => f.write_str("any"),
        }
    }
}

/// A capability together with the scope it is granted at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    /// The capability granted
    pub capability: Capability,
    /// Records the grant reaches
    pub scope: GrantScope,
}

impl Grant {
    /// Grant over every record
    pub const fn any(capability: Capability) -> Self {
        Self {
            capability,
            scope: GrantScope::Any,
        }
    }

    /// Grant over the principal's own records
    pub const fn own(capability: Capability) -> Self {
        Self {
            capability,
            scope: GrantScope::Own,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            GrantScope::Any => write!(f, "{}", self.capability),
            GrantScope::Own => write!(f, "{}:own", self.capability),
        }
    }
}

/// Parses `capability`, `capability:any` or `capability:own`
impl FromStr for Grant {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, scope) = match s.split_once(':') {
            None => (s, GrantScope::Any),
            Some((token, "any")) => (token, GrantScope::Any),
            Some((token, "own")) => (token, GrantScope::Own),
            Some(_) => return Err(UnknownCapability(s.to_string())),
        };
        Ok(Self {
            capability: token.trim().parse()?,
            scope,
        })
    }
}
