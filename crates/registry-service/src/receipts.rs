//! Receipt service
//!
//! Every operation resolves the acting principal, asks the access gate, and
//! only then touches the store. Ownership is checked against the stored
//! record before any write.

use crate::principals::resolve_principal;
use crate::sequencer::Sequencer;
use registry_authorization::AccessGate;
use registry_core::effects::{ClockEffects, PrincipalDirectory, ReceiptStore};
use registry_core::{
    Account, Capability, PageRequest, Principal, PrincipalId, Receipt, ReceiptChanges,
    ReceiptDraft, ReceiptFilter, ReceiptId, ReceiptPage, ReceiptStats, ReceiptStatus,
    RegistryError, Result,
};
use std::sync::Arc;
use tracing::info;

/// Gated receipt operations over a store, a directory and a clock
pub struct ReceiptService<S, D, C> {
    store: Arc<S>,
    directory: Arc<D>,
    clock: C,
    gate: AccessGate,
    sequencer: Sequencer,
}

impl<S, D, C> ReceiptService<S, D, C>
where
    S: ReceiptStore,
    D: PrincipalDirectory,
    C: ClockEffects,
{
    /// Assemble the service
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        clock: C,
        gate: AccessGate,
        sequencer: Sequencer,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            gate,
            sequencer,
        }
    }

    /// Create a receipt owned by `actor` and assign its code
    pub async fn create_receipt(&self, actor: PrincipalId, draft: ReceiptDraft) -> Result<Receipt> {
        let principal = self.principal(actor).await?;
        self.gate.require(&principal, Capability::CreateReceipts)?;
        let draft = draft.validated()?;

        let receipt = self
            .sequencer
            .allocate(self.store.as_ref(), &principal, draft, self.clock.now())
            .await?;
        info!(
            receipt = %receipt.id,
            code = %receipt.receipt_no,
            actor = %actor,
            "receipt created"
        );
        Ok(receipt)
    }

    /// Fetch one receipt
    pub async fn get_receipt(&self, actor: PrincipalId, id: ReceiptId) -> Result<Receipt> {
        let principal = self.principal(actor).await?;
        self.load_checked(&principal, Capability::ReadReceipts, id)
            .await
    }

    /// One page of the receipts the actor may see
    pub async fn list_receipts(
        &self,
        actor: PrincipalId,
        filter: ReceiptFilter,
        page: PageRequest,
    ) -> Result<ReceiptPage> {
        page.validate()?;
        let principal = self.principal(actor).await?;
        let filter = self
            .gate
            .scope_query(&principal, Capability::ReadReceipts, filter)?;
        self.store.query(&filter, page).await
    }

    /// Change non-identifying fields or the status of a receipt
    pub async fn update_receipt(
        &self,
        actor: PrincipalId,
        id: ReceiptId,
        changes: ReceiptChanges,
    ) -> Result<Receipt> {
        let principal = self.principal(actor).await?;
        self.gate.require(&principal, Capability::UpdateReceipts)?;
        let changes = changes.validated()?;
        self.load_checked(&principal, Capability::UpdateReceipts, id)
            .await?;

        let receipt = self
            .store
            .update_receipt(id, changes, self.clock.now())
            .await?;
        info!(receipt = %id, code = %receipt.receipt_no, actor = %actor, "receipt updated");
        Ok(receipt)
    }

    /// Cancel a receipt; cancelling a cancelled receipt is a no-op
    pub async fn cancel_receipt(&self, actor: PrincipalId, id: ReceiptId) -> Result<Receipt> {
        let principal = self.principal(actor).await?;
        self.load_checked(&principal, Capability::DeleteReceipts, id)
            .await?;

        let receipt = self
            .store
            .update_receipt(
                id,
                ReceiptChanges::status(ReceiptStatus::Cancelled),
                self.clock.now(),
            )
            .await?;
        info!(receipt = %id, code = %receipt.receipt_no, actor = %actor, "receipt cancelled");
        Ok(receipt)
    }

    /// Aggregates over the receipts the actor may see
    pub async fn receipt_stats(&self, actor: PrincipalId) -> Result<ReceiptStats> {
        let principal = self.principal(actor).await?;
        let filter =
            self.gate
                .scope_query(&principal, Capability::ReadReceipts, ReceiptFilter::default())?;
        let totals = self.store.totals(&filter).await?;
        Ok(ReceiptStats {
            totals,
            current_year: self.clock.current_year(),
        })
    }

    /// Active accounts that created at least one visible receipt, by username
    pub async fn receipt_creators(&self, actor: PrincipalId) -> Result<Vec<Account>> {
        let principal = self.principal(actor).await?;
        let decision = self.gate.require(&principal, Capability::ReadReceipts)?;

        let mut creators = Vec::new();
        for id in self.store.creator_ids().await? {
            if !decision.admits(principal.id(), id) {
                continue;
            }
            if let Some(account) = self.directory.account(id).await? {
                if account.active {
                    creators.push(account);
                }
            }
        }
        creators.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(creators)
    }

    /// Every receipt matching `filter` that the actor may export
    pub async fn export_receipts(
        &self,
        actor: PrincipalId,
        filter: ReceiptFilter,
    ) -> Result<Vec<Receipt>> {
        let principal = self.principal(actor).await?;
        let filter = self
            .gate
            .scope_query(&principal, Capability::ExportReceipts, filter)?;
        let rows = self.store.query_all(&filter).await?;
        info!(actor = %actor, rows = rows.len(), "receipts exported");
        Ok(rows)
    }

    async fn principal(&self, id: PrincipalId) -> Result<Principal> {
        resolve_principal(self.directory.as_ref(), id).await
    }

    async fn load_checked(
        &self,
        principal: &Principal,
        capability: Capability,
        id: ReceiptId,
    ) -> Result<Receipt> {
        self.gate.require(principal, capability)?;
        let receipt = self
            .store
            .receipt(id)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("receipt {id}")))?;
        self.gate.check_record(principal, capability, &receipt)?;
        Ok(receipt)
    }
}
