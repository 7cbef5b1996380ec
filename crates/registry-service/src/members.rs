//! Member service
//!
//! Gated CRUD over member records. Reads, writes and exports each need their
//! own user-data capability, and own-only grants hold a principal to the
//! members they created. Deletion is soft.

use crate::principals::resolve_principal;
use registry_authorization::AccessGate;
use registry_core::effects::{ClockEffects, MemberStore, PrincipalDirectory};
use registry_core::{
    Capability, Member, MemberChanges, MemberDraft, MemberFilter, MemberId, MemberPage,
    MemberStats, PageRequest, Principal, PrincipalId, RegistryError, Result,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Gated member operations over a store, a directory and a clock
pub struct MemberService<S, D, C> {
    store: Arc<S>,
    directory: Arc<D>,
    clock: C,
    gate: AccessGate,
}

impl<S, D, C> MemberService<S, D, C>
where
    S: MemberStore,
    D: PrincipalDirectory,
    C: ClockEffects,
{
    /// Assemble the service
    pub fn new(store: Arc<S>, directory: Arc<D>, clock: C, gate: AccessGate) -> Self {
        Self {
            store,
            directory,
            clock,
            gate,
        }
    }

    /// Add a member owned by `actor`
    pub async fn create_member(&self, actor: PrincipalId, draft: MemberDraft) -> Result<Member> {
        let principal = self.principal(actor).await?;
        self.gate.require(&principal, Capability::CreateUserData)?;
        let draft = draft.validated()?;

        let member = self
            .store
            .insert_member(draft, actor, self.clock.now())
            .await?;
        info!(member = %member.id, actor = %actor, "member created");
        Ok(member)
    }

    /// Fetch one member
    pub async fn get_member(&self, actor: PrincipalId, id: MemberId) -> Result<Member> {
        let principal = self.principal(actor).await?;
        self.load_checked(&principal, Capability::ReadUserData, id)
            .await
    }

    /// One page of the members the actor may see
    pub async fn list_members(
        &self,
        actor: PrincipalId,
        filter: MemberFilter,
        page: PageRequest,
    ) -> Result<MemberPage> {
        page.validate()?;
        let principal = self.principal(actor).await?;
        let filter = self
            .gate
            .scope_members(&principal, Capability::ReadUserData, filter)?;
        self.store.query_members(&filter, page).await
    }

    /// Change the set fields of a member
    pub async fn update_member(
        &self,
        actor: PrincipalId,
        id: MemberId,
        changes: MemberChanges,
    ) -> Result<Member> {
        let principal = self.principal(actor).await?;
        self.gate.require(&principal, Capability::UpdateUserData)?;
        let changes = changes.validated()?;
        self.load_checked(&principal, Capability::UpdateUserData, id)
            .await?;

        let member = self
            .store
            .update_member(id, changes, self.clock.now())
            .await?;
        info!(member = %id, actor = %actor, "member updated");
        Ok(member)
    }

    /// Soft-delete a member; it disappears from every later read
    pub async fn delete_member(&self, actor: PrincipalId, id: MemberId) -> Result<Member> {
        let principal = self.principal(actor).await?;
        self.load_checked(&principal, Capability::DeleteUserData, id)
            .await?;

        let member = self.store.delete_member(id, self.clock.now()).await?;
        info!(member = %id, actor = %actor, "member deleted");
        Ok(member)
    }

    /// Every member matching `filter` that the actor may export
    pub async fn export_members(
        &self,
        actor: PrincipalId,
        filter: MemberFilter,
    ) -> Result<Vec<Member>> {
        let principal = self.principal(actor).await?;
        let filter = self
            .gate
            .scope_members(&principal, Capability::ExportUserData, filter)?;
        let rows = self.store.query_all_members(&filter).await?;
        info!(actor = %actor, rows = rows.len(), "members exported");
        Ok(rows)
    }

    /// Member counts the actor may see
    ///
    /// Principals without `read_user_data` get all-zero counts rather than
    /// an error, so dashboards can render for every role.
    pub async fn member_stats(&self, actor: PrincipalId) -> Result<MemberStats> {
        let principal = self.principal(actor).await?;
        match self
            .gate
            .scope_members(&principal, Capability::ReadUserData, MemberFilter::default())
        {
            Ok(filter) => self.store.member_stats(&filter).await,
            Err(RegistryError::PermissionDenied { .. }) => {
                debug!(actor = %actor, "member stats withheld");
                Ok(MemberStats::default())
            }
            Err(err) => Err(err),
        }
    }

    async fn principal(&self, id: PrincipalId) -> Result<Principal> {
        resolve_principal(self.directory.as_ref(), id).await
    }

    async fn load_checked(
        &self,
        principal: &Principal,
        capability: Capability,
        id: MemberId,
    ) -> Result<Member> {
        self.gate.require(principal, capability)?;
        let member = self
            .store
            .member(id)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("member {id}")))?;
        self.gate.check_record(principal, capability, &member)?;
        Ok(member)
    }
}
