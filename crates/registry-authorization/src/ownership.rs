//! Access gate
//!
//! Turns engine decisions into errors at the service boundary and applies
//! ownership: own-only principals may touch a record only when they created
//! it, and their list queries are narrowed to their own records regardless of
//! what the caller asked for.

use crate::decision::ScopedDecision;
use crate::engine::PermissionEngine;
use registry_core::{
    Capability, MemberFilter, Owned, Principal, PrincipalId, ReceiptFilter, RegistryError, Result,
};
use tracing::{debug, warn};

/// Capability and ownership checks for service entry points
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    engine: PermissionEngine,
}

impl AccessGate {
    /// Gate over an engine
    pub fn new(engine: PermissionEngine) -> Self {
        Self { engine }
    }

    /// Underlying engine
    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    /// Require `capability` at some scope
    pub fn require(&self, principal: &Principal, capability: Capability) -> Result<ScopedDecision> {
        let decision = self.engine.authorize_scoped(principal, capability);
        debug!(
            principal = %principal.id(),
            capability = %capability,
            ?decision,
            "authorization decision"
        );
        if decision.is_permitted() {
            Ok(decision)
        } else {
            warn!(
                principal = %principal.id(),
                capability = %capability,
                "permission denied"
            );
            Err(RegistryError::permission_denied(capability))
        }
    }

    /// Require `capability` and, for own-only principals, ownership of `record`
    pub fn check_record<R: Owned>(
        &self,
        principal: &Principal,
        capability: Capability,
        record: &R,
    ) -> Result<ScopedDecision> {
        let decision = self.require(principal, capability)?;
        if decision.admits(principal.id(), record.owner()) {
            Ok(decision)
        } else {
            warn!(
                principal = %principal.id(),
                capability = %capability,
                record = %record.record(),
                owner = %record.owner(),
                "ownership violation"
            );
            Err(RegistryError::ownership_violation(capability, record.record()))
        }
    }

    /// Require `capability`; the creator every query must be narrowed to, if any
    pub fn owner_scope(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> Result<Option<PrincipalId>> {
        let decision = self.require(principal, capability)?;
        Ok(decision.is_own_only().then(|| principal.id()))
    }

    /// Require `capability` and narrow a receipt filter to what the principal may see
    pub fn scope_query(
        &self,
        principal: &Principal,
        capability: Capability,
        mut filter: ReceiptFilter,
    ) -> Result<ReceiptFilter> {
        if let Some(owner) = self.owner_scope(principal, capability)? {
            filter.created_by = Some(owner);
        }
        Ok(filter)
    }

    /// Require `capability` and narrow a member filter to what the principal may see
    pub fn scope_members(
        &self,
        principal: &Principal,
        capability: Capability,
        mut filter: MemberFilter,
    ) -> Result<MemberFilter> {
        if let Some(owner) = self.owner_scope(principal, capability)? {
            filter.created_by = Some(owner);
        }
        Ok(filter)
    }
}
