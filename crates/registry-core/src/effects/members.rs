//! Member storage interface

use crate::errors::Result;
use crate::identifiers::{MemberId, PrincipalId};
use crate::member::{Member, MemberChanges, MemberDraft, MemberFilter, MemberPage, MemberStats};
use crate::receipt::PageRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Member records with soft deletion
///
/// Every read skips deleted members, and writes addressed at a deleted
/// member fail with `NotFound` exactly as if it had never existed.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Persist a validated draft and return the stored member
    async fn insert_member(
        &self,
        draft: MemberDraft,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Member>;

    /// Read a live member
    async fn member(&self, id: MemberId) -> Result<Option<Member>>;

    /// Apply changes to a live member
    async fn update_member(
        &self,
        id: MemberId,
        changes: MemberChanges,
        now: DateTime<Utc>,
    ) -> Result<Member>;

    /// Flag a live member as deleted and return the final state
    async fn delete_member(&self, id: MemberId, now: DateTime<Utc>) -> Result<Member>;

    /// One page of live members matching `filter`, in listing order
    async fn query_members(&self, filter: &MemberFilter, page: PageRequest) -> Result<MemberPage>;

    /// Every live member matching `filter`, in listing order
    async fn query_all_members(&self, filter: &MemberFilter) -> Result<Vec<Member>>;

    /// Counts over live members matching `filter`
    async fn member_stats(&self, filter: &MemberFilter) -> Result<MemberStats>;
}
