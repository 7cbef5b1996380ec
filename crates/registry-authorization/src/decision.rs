//! Scoped authorization outcome

use registry_core::{GrantScope, PrincipalId};
use serde::{Deserialize, Serialize};

/// Result of evaluating one capability for one principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopedDecision {
    /// Permitted on every record
    Allow,
    /// Permitted only on records the principal created
    AllowOwnOnly,
    /// Not permitted
    Deny,
}

impl ScopedDecision {
    /// Decision implied by the widest scope held, if any
    pub fn from_scope(scope: Option<GrantScope>) -> Self {
        match scope {
            Some(GrantScope::Any) => ScopedDecision::Allow,
            Some(GrantScope::Own) => ScopedDecision::AllowOwnOnly,
            None => ScopedDecision::Deny,
        }
    }

    /// Whether the capability is held at any scope
    pub fn is_permitted(&self) -> bool {
        !matches!(self, ScopedDecision::Deny)
    }

    /// Whether the principal is limited to its own records
    pub fn is_own_only(&self) -> bool {
        matches!(self, ScopedDecision::AllowOwnOnly)
    }

    /// Whether a record created by `owner` is reachable under this decision
    pub fn admits(&self, principal: PrincipalId, owner: PrincipalId) -> bool {
        match self {
            ScopedDecision::Allow => true,
            ScopedDecision::AllowOwnOnly => principal == owner,
            ScopedDecision::Deny => false,
        }
    }

    /// Combine decisions from two sources; the wider one wins
    pub fn union(self, other: ScopedDecision) -> ScopedDecision {
        use ScopedDecision::*;
        match (self, other) {
            (Allow, _) | (_, Allow) => Allow,
            (AllowOwnOnly, _) | (_, AllowOwnOnly) => AllowOwnOnly,
            (Deny, Deny) => Deny,
        }
    }
}
