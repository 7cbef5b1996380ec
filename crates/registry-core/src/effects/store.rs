//! Receipt storage interface
//!
//! The store provides transactional insert-with-identity-return, conditional
//! update, and a uniqueness constraint on the receipt code. Receipt creation
//! runs inside [`ReceiptStore::transaction`]: the closure sees a
//! [`ReceiptTransaction`] whose writes become visible only when the closure
//! returns `Ok`. Any error, or a panic, leaves nothing behind.
//!
//! A transaction creates at most one receipt. Receipt identities come from a
//! counter that survives rollback, so an identity observed by an aborted
//! transaction is never handed out again.

use crate::errors::{RegistryError, Result};
use crate::identifiers::{PrincipalId, ReceiptId};
use crate::receipt::{
    PageRequest, Receipt, ReceiptChanges, ReceiptCode, ReceiptDraft, ReceiptFilter, ReceiptPage,
    ReceiptTotals,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Handler-level storage failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A unique column already holds the value
    #[error("unique constraint violated on {column}: {value}")]
    UniqueViolation {
        /// Column carrying the constraint
        column: String,
        /// Offending value
        value: String,
    },

    /// The row addressed by a write does not exist
    #[error("row not found: {0}")]
    NotFound(String),

    /// Backend could not be reached or the transaction aborted
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The write breaks the transaction contract and will never succeed
    #[error("rejected write: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Whether retrying the same write may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::UniqueViolation { .. } | StoreError::Unavailable(_)
        )
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { column, value } if column == "receipt_no" => {
                RegistryError::conflict_on_create(format!("receipt code {value} already exists"))
            }
            StoreError::UniqueViolation { column, value } => {
                RegistryError::conflict(format!("{column} {value} already exists"))
            }
            StoreError::NotFound(what) => RegistryError::not_found(what),
            StoreError::Unavailable(reason) => RegistryError::store_unavailable(reason),
            StoreError::Corrupt(reason) => {
                RegistryError::store_unavailable(format!("corrupt row: {reason}"))
            }
            StoreError::Rejected(reason) => RegistryError::invalid(reason),
        }
    }
}

/// Writes available inside one receipt transaction
///
/// Synchronous on purpose: the store holds its write lock for the whole
/// transaction and nothing may suspend while it is held.
pub trait ReceiptTransaction {
    /// Insert a receipt under a placeholder code and return the identity the
    /// store assigned to it, without committing
    ///
    /// Fails with [`StoreError::Rejected`] once a receipt has been inserted in
    /// the same transaction. A failed insert may be retried.
    fn insert_provisional(
        &mut self,
        draft: &ReceiptDraft,
        placeholder: &ReceiptCode,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> std::result::Result<ReceiptId, StoreError>;

    /// Replace the placeholder code of a receipt inserted in this transaction
    fn finalize_code(
        &mut self,
        id: ReceiptId,
        code: &ReceiptCode,
    ) -> std::result::Result<(), StoreError>;

    /// Read a receipt as this transaction sees it
    fn load(&mut self, id: ReceiptId) -> std::result::Result<Option<Receipt>, StoreError>;
}

/// Transactional receipt storage
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Run `work` in one transaction; commit on `Ok`, roll back on `Err`
    async fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn ReceiptTransaction) -> Result<T> + Send + 'static;

    /// Read a committed receipt
    async fn receipt(&self, id: ReceiptId) -> Result<Option<Receipt>>;

    /// Apply changes to a committed receipt
    ///
    /// The lifecycle check and the write happen under the same lock, so a
    /// concurrent cancellation cannot be overwritten by a stale status.
    async fn update_receipt(
        &self,
        id: ReceiptId,
        changes: ReceiptChanges,
        now: DateTime<Utc>,
    ) -> Result<Receipt>;

    /// One page of committed receipts matching `filter`, in listing order
    async fn query(&self, filter: &ReceiptFilter, page: PageRequest) -> Result<ReceiptPage>;

    /// Every committed receipt matching `filter`, in listing order
    async fn query_all(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>>;

    /// Aggregates over committed receipts matching `filter`
    async fn totals(&self, filter: &ReceiptFilter) -> Result<ReceiptTotals>;

    /// Distinct creators of committed receipts, ascending
    async fn creator_ids(&self) -> Result<Vec<PrincipalId>>;
}
