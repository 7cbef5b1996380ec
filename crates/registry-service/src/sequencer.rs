//! Receipt sequencer
//!
//! Allocates the receipt code inside the same store transaction that creates
//! the row:
//!
//! 1. insert the row under a random placeholder code (retried on collision
//!    or transient failure);
//! 2. read back the store-assigned identity without committing;
//! 3. derive `{creator}/{year}/{sequence}` from the principal, the year and
//!    the identity;
//! 4. overwrite the placeholder and commit.
//!
//! Uniqueness and ordering of codes follow from the store's identity
//! allocation; codes carry no counter of their own. A failure anywhere rolls
//! the whole transaction back.
//!
//! Two identities can map to the same code: below the offset the raw identity
//! is used, so with offset 2 both identity 1 and identity 3 yield `0001`. When
//! the final code is already taken the transaction is rolled back and the
//! whole allocation is retried; the store never reissues the burned identity,
//! so the next attempt gets a fresh one.

use chrono::{DateTime, Datelike, Utc};
use registry_core::config::SequencerConfig;
use registry_core::effects::{ReceiptStore, ReceiptTransaction, StoreError};
use registry_core::receipt::PLACEHOLDER_PREFIX;
use registry_core::{
    Principal, PrincipalId, Receipt, ReceiptCode, ReceiptDraft, ReceiptId, RegistryError, Result,
};
use tracing::{debug, warn};
use uuid::Uuid;

const NONCE_LEN: usize = 12;

/// Derives receipt codes and runs the allocation transaction
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    config: SequencerConfig,
}

impl Sequencer {
    /// Sequencer with the given numbering parameters
    pub fn new(config: SequencerConfig) -> Self {
        Self { config }
    }

    /// Numbering parameters in use
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Creator component of a receipt code
    ///
    /// Superusers and holders of the admin role share the admin code. A
    /// username made of the creator prefix followed by digits maps to the
    /// code prefix plus those digits; anything else falls back to the code
    /// prefix plus the principal identity.
    pub fn creator_code(&self, principal: &Principal) -> String {
        let cfg = &self.config;
        if principal.is_superuser() || principal.has_role(&cfg.admin_role) {
            return cfg.admin_code.clone();
        }
        if let Some(digits) = principal
            .username()
            .strip_prefix(cfg.creator_username_prefix.as_str())
        {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return format!("{}{digits}", cfg.code_prefix);
            }
        }
        format!("{}{}", cfg.code_prefix, principal.id())
    }

    /// Sequence component for a store identity
    pub fn sequence_for(&self, id: ReceiptId) -> i64 {
        let shifted = id.value() - self.config.offset;
        if shifted <= 0 {
            id.value()
        } else {
            shifted
        }
    }

    /// Full receipt code for a creator, year and identity
    pub fn format_code(&self, creator_code: &str, year: i32, id: ReceiptId) -> Result<ReceiptCode> {
        ReceiptCode::new(format!(
            "{creator_code}/{year}/{:04}",
            self.sequence_for(id)
        ))
    }

    /// Fresh placeholder code, unique with overwhelming probability
    pub fn placeholder(creator: PrincipalId, now: DateTime<Utc>) -> Result<ReceiptCode> {
        let nonce = Uuid::new_v4().simple().to_string();
        ReceiptCode::new(format!(
            "{PLACEHOLDER_PREFIX}{}_{creator}_{}",
            now.timestamp_millis(),
            &nonce[..NONCE_LEN]
        ))
    }

    /// Create a receipt and give it its final code in one transaction
    ///
    /// A final code that is already taken restarts the allocation with a new
    /// identity, up to `placeholder_attempts` times.
    pub async fn allocate<S>(
        &self,
        store: &S,
        principal: &Principal,
        draft: ReceiptDraft,
        now: DateTime<Utc>,
    ) -> Result<Receipt>
    where
        S: ReceiptStore + ?Sized,
    {
        let creator = principal.id();
        let creator_code = self.creator_code(principal);
        let attempts = self.config.placeholder_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .allocate_once(store, creator, creator_code.clone(), draft.clone(), now)
                .await
            {
                Err(RegistryError::Conflict { message }) if attempt < attempts => {
                    warn!(attempt, attempts, %message, "final code taken, allocating again");
                    attempt += 1;
                }
                Err(RegistryError::Conflict { message }) => {
                    return Err(RegistryError::conflict_on_create(message));
                }
                outcome => return outcome,
            }
        }
    }

    /// One allocation transaction; a taken final code rolls back as `Conflict`
    async fn allocate_once<S>(
        &self,
        store: &S,
        creator: PrincipalId,
        creator_code: String,
        draft: ReceiptDraft,
        now: DateTime<Utc>,
    ) -> Result<Receipt>
    where
        S: ReceiptStore + ?Sized,
    {
        let sequencer = self.clone();
        let year = now.year();

        store
            .transaction(move |tx| {
                let id = sequencer.insert_provisional(tx, &draft, creator, now)?;
                let code = sequencer.format_code(&creator_code, year, id)?;
                debug!(receipt = %id, code = %code, "finalizing receipt code");
                tx.finalize_code(id, &code).map_err(|err| match err {
                    StoreError::UniqueViolation { .. } => RegistryError::conflict(format!(
                        "receipt code {code} already exists"
                    )),
                    other => other.into(),
                })?;
                tx.load(id)?.ok_or_else(|| {
                    RegistryError::store_unavailable(format!("receipt {id} missing after insert"))
                })
            })
            .await
    }

    fn insert_provisional(
        &self,
        tx: &mut dyn ReceiptTransaction,
        draft: &ReceiptDraft,
        creator: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<ReceiptId> {
        let attempts = self.config.placeholder_attempts.max(1);
        let mut attempt = 1;
        loop {
            let placeholder = Self::placeholder(creator, now)?;
            match tx.insert_provisional(draft, &placeholder, creator, now) {
                Ok(id) => return Ok(id),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        error = %err,
                        "provisional insert failed, retrying with a new placeholder"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
