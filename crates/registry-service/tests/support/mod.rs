//! Shared fixture: in-memory store, frozen clock, built-in role table
//!
//! The free functions build the same wiring over any store, for tests that
//! must hold on every handler.

#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use registry_authorization::{AccessGate, PermissionEngine};
use registry_core::config::SequencerConfig;
use registry_core::effects::{FixedClock, PrincipalDirectory, ReceiptStore};
use registry_core::{Account, NewAccount, PaymentMode, ReceiptDraft, RoleName};
use registry_service::{AccountService, MemberService, OverviewService, ReceiptService, Sequencer};
use registry_store::MemoryStore;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: FixedClock,
    pub receipts: ReceiptService<MemoryStore, MemoryStore, FixedClock>,
    pub members: MemberService<MemoryStore, MemoryStore, FixedClock>,
    pub accounts: AccountService<MemoryStore>,
    pub overview: OverviewService<MemoryStore, MemoryStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        let clock = frozen_clock();
        let gate = AccessGate::new(PermissionEngine::builtin());
        let receipts = ReceiptService::new(
            Arc::clone(&store),
            Arc::clone(&store),
            clock.clone(),
            gate.clone(),
            Sequencer::new(SequencerConfig::default()),
        );
        let members = MemberService::new(
            Arc::clone(&store),
            Arc::clone(&store),
            clock.clone(),
            gate.clone(),
        );
        let overview = OverviewService::new(Arc::clone(&store), Arc::clone(&store), gate.clone());
        let accounts = AccountService::new(Arc::clone(&store), gate);
        Self {
            store,
            clock,
            receipts,
            members,
            accounts,
            overview,
        }
    }

    pub async fn account(&self, username: &str, roles: &[&str]) -> Account {
        account_in(self.store.as_ref(), username, roles).await
    }

    pub async fn superuser(&self, username: &str) -> Account {
        self.store
            .create_account(NewAccount::new(username, []).superuser())
            .await
            .unwrap()
    }
}

pub fn frozen_clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap())
}

/// Receipt service over one store acting as both store and directory
pub fn receipt_service<S>(
    store: &Arc<S>,
    config: SequencerConfig,
) -> ReceiptService<S, S, FixedClock>
where
    S: ReceiptStore + PrincipalDirectory + 'static,
{
    ReceiptService::new(
        Arc::clone(store),
        Arc::clone(store),
        frozen_clock(),
        AccessGate::new(PermissionEngine::builtin()),
        Sequencer::new(config),
    )
}

pub async fn account_in<D: PrincipalDirectory>(
    directory: &D,
    username: &str,
    roles: &[&str],
) -> Account {
    directory
        .create_account(NewAccount::new(
            username,
            roles.iter().map(|r| RoleName::from(*r)),
        ))
        .await
        .unwrap()
}

pub fn draft(donor: &str, rupees: i64) -> ReceiptDraft {
    ReceiptDraft {
        village: Some("Rampur".to_string()),
        donation1_purpose: Some("Temple construction".to_string()),
        donation1_amount: Decimal::new(rupees, 0),
        ..ReceiptDraft::new(
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            donor,
            PaymentMode::Cash,
            Decimal::new(rupees, 0),
        )
    }
}
