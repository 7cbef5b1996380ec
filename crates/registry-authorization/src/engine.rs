//! Permission engine
//!
//! Pure decision function over a principal and a capability. The engine never
//! touches storage: the caller resolves the principal (account flags plus the
//! role names assigned right now) and the engine answers from the role table.
//!
//! Rules, in order:
//! 1. a superuser is allowed everything at any scope;
//! 2. otherwise the grants of every held role are unioned, and an `any`
//!    grant dominates an `own` grant for the same capability;
//! 3. role names missing from the table contribute nothing.

use crate::decision::ScopedDecision;
use crate::roles::RoleTable;
use registry_core::{Capability, GrantScope, Principal};
use std::sync::Arc;
use tracing::debug;

/// Decides capabilities from the role table
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    roles: Arc<RoleTable>,
}

impl PermissionEngine {
    /// Engine over the given table
    pub fn new(roles: Arc<RoleTable>) -> Self {
        Self { roles }
    }

    /// Engine over the built-in table
    pub fn builtin() -> Self {
        Self::new(Arc::new(RoleTable::builtin()))
    }

    /// Role table in use
    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Whether the principal holds `capability` at any scope
    pub fn authorize(&self, principal: &Principal, capability: Capability) -> bool {
        self.authorize_scoped(principal, capability).is_permitted()
    }

    /// Scoped decision for `capability`
    pub fn authorize_scoped(&self, principal: &Principal, capability: Capability) -> ScopedDecision {
        if principal.is_superuser() {
            return ScopedDecision::Allow;
        }
        ScopedDecision::from_scope(self.widest_scope(principal, capability))
    }

    /// Every capability the principal holds, with its decision
    pub fn effective_grants(&self, principal: &Principal) -> Vec<(Capability, ScopedDecision)> {
        Capability::ALL
            .into_iter()
            .map(|cap| (cap, self.authorize_scoped(principal, cap)))
            .filter(|(_, decision)| decision.is_permitted())
            .collect()
    }

    fn widest_scope(&self, principal: &Principal, capability: Capability) -> Option<GrantScope> {
        let mut widest = None;
        for role in &principal.roles {
            let Some(bundle) = self.roles.bundle(role.as_str()) else {
                debug!(
                    principal = %principal.id(),
                    role = %role,
                    "ignoring role missing from role table"
                );
                continue;
            };
            match bundle.scope_of(capability) {
                Some(GrantScope::Any) => return Some(GrantScope::Any),
                Some(scope) => widest = widest.max(Some(scope)),
                None => {}
            }
        }
        widest
    }
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::builtin()
    }
}
