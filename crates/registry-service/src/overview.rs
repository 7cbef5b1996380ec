//! System-wide counts for the `view_system_stats` capability

use crate::principals::resolve_principal;
use registry_authorization::AccessGate;
use registry_core::effects::{MemberStore, PrincipalDirectory, ReceiptStore};
use registry_core::{Capability, MemberFilter, PrincipalId, ReceiptFilter, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Record counts across the whole registry; no amounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    /// Every account
    pub total_accounts: u64,
    /// Accounts that may still act
    pub active_accounts: u64,
    /// Live members
    pub total_members: u64,
    /// Receipts in any status
    pub total_receipts: u64,
}

/// Unscoped counts over receipts, members and accounts
pub struct OverviewService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    gate: AccessGate,
}

impl<S, D> OverviewService<S, D>
where
    S: ReceiptStore + MemberStore,
    D: PrincipalDirectory,
{
    /// Assemble the service
    pub fn new(store: Arc<S>, directory: Arc<D>, gate: AccessGate) -> Self {
        Self {
            store,
            directory,
            gate,
        }
    }

    /// Counts across the registry, ignoring ownership
    pub async fn system_stats(&self, actor: PrincipalId) -> Result<SystemStats> {
        let principal = resolve_principal(self.directory.as_ref(), actor).await?;
        self.gate.require(&principal, Capability::ViewSystemStats)?;

        let accounts = self.directory.list_accounts().await?;
        let members = self.store.member_stats(&MemberFilter::default()).await?;
        let receipts = self.store.totals(&ReceiptFilter::default()).await?;
        Ok(SystemStats {
            total_accounts: accounts.len() as u64,
            active_accounts: accounts.iter().filter(|a| a.active).count() as u64,
            total_members: members.total,
            total_receipts: receipts.total_receipts,
        })
    }
}
