//! Static role table
//!
//! Maps role names to their grant bundles. The table is a plain immutable
//! value: it is built once at start-up (from the built-in definitions or the
//! config file) and handed to the engine, so tests can substitute alternative
//! tables without touching process-wide state.

use registry_core::config::RegistryConfig;
use registry_core::{Capability, Grant, GrantScope, RegistryError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Administrator role name in the built-in table
pub const ADMIN: &str = "admin";
/// Member-data editor role name in the built-in table
pub const USER_DATA_EDITOR: &str = "user_data_editor";
/// Member-data viewer role name in the built-in table
pub const USER_DATA_VIEWER: &str = "user_data_viewer";
/// Receipt report viewer role name in the built-in table
pub const RECEIPT_REPORT_VIEWER: &str = "receipt_report_viewer";
/// Receipt creator role name in the built-in table
pub const RECEIPT_CREATOR: &str = "receipt_creator";

/// Grants of one role, at most one per capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleBundle {
    grants: BTreeMap<Capability, GrantScope>,
}

impl RoleBundle {
    /// Build a bundle; a capability listed twice keeps its widest scope
    pub fn new(grants: impl IntoIterator<Item = Grant>) -> Self {
        let mut bundle = Self::default();
        for grant in grants {
            bundle
                .grants
                .entry(grant.capability)
                .and_modify(|scope| *scope = (*scope).max(grant.scope))
                .or_insert(grant.scope);
        }
        bundle
    }

    /// Scope at which the bundle grants `capability`, if at all
    pub fn scope_of(&self, capability: Capability) -> Option<GrantScope> {
        self.grants.get(&capability).copied()
    }

    /// Every grant in capability order
    pub fn grants(&self) -> impl Iterator<Item = Grant> + '_ {
        self.grants.iter().map(|(capability, scope)| Grant {
            capability: *capability,
            scope: *scope,
        })
    }

    /// Number of capabilities granted
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether the bundle grants nothing
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Immutable role name to bundle mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleTable {
    roles: BTreeMap<String, RoleBundle>,
}

impl RoleTable {
    /// Empty table; every role grants nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// The deployment's standard roles
    pub fn builtin() -> Self {
        use Capability::*;

        let mut roles = BTreeMap::new();
        roles.insert(
            ADMIN.to_string(),
            RoleBundle::new(Capability::ALL.into_iter().map(Grant::any)),
        );
        roles.insert(
            USER_DATA_EDITOR.to_string(),
            RoleBundle::new(
                [
                    ReadUserData,
                    CreateUserData,
                    UpdateUserData,
                    DeleteUserData,
                    ExportUserData,
                    ReadVillageArea,
                    CreateVillageArea,
                    UpdateVillageArea,
                    DeleteVillageArea,
                    ViewSystemStats,
                ]
                .into_iter()
                .map(Grant::any),
            ),
        );
        roles.insert(
            USER_DATA_VIEWER.to_string(),
            RoleBundle::new(
                [ReadUserData, ReadVillageArea, ExportUserData]
                    .into_iter()
                    .map(Grant::any),
            ),
        );
        roles.insert(
            RECEIPT_REPORT_VIEWER.to_string(),
            RoleBundle::new([ReadReceipts, ExportReceipts].into_iter().map(Grant::any)),
        );
        roles.insert(
            RECEIPT_CREATOR.to_string(),
            RoleBundle::new([
                Grant::any(CreateReceipts),
                Grant::own(ReadReceipts),
                Grant::own(UpdateReceipts),
                Grant::own(DeleteReceipts),
            ]),
        );
        Self { roles }
    }

    /// Build a table from explicit role definitions
    pub fn from_definitions<I, S, G>(definitions: I) -> Self
    where
        I: IntoIterator<Item = (S, G)>,
        S: Into<String>,
        G: IntoIterator<Item = Grant>,
    {
        Self {
            roles: definitions
                .into_iter()
                .map(|(name, grants)| (name.into(), RoleBundle::new(grants)))
                .collect(),
        }
    }

    /// Table described by the config: its `roles` section when present,
    /// the built-in table otherwise
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let Some(definitions) = &config.roles else {
            return Ok(Self::builtin());
        };

        let mut roles = BTreeMap::new();
        for (name, definition) in definitions {
            let grants = definition
                .parsed_grants()
                .map_err(|e| RegistryError::config(format!("role {name}: {e}")))?;
            roles.insert(name.clone(), RoleBundle::new(grants));
        }
        Ok(Self { roles })
    }

    /// Bundle of a role, `None` for names not in the table
    pub fn bundle(&self, role: &str) -> Option<&RoleBundle> {
        self.roles.get(role)
    }

    /// Whether the table defines `role`
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Defined role names in order
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Every role with its bundle
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RoleBundle)> {
        self.roles.iter().map(|(name, bundle)| (name.as_str(), bundle))
    }
}
