//! In-memory receipt store, member store and principal directory
//!
//! Deterministic handler for tests. A transaction
//! holds the state lock for its whole duration and stages its rows in a local
//! write set that is merged only on commit. Receipt identities come from a
//! shared counter that never goes backwards, so an identity handed to a
//! rolled-back transaction is never issued again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use registry_core::effects::{
    ClockEffects, MemberStore, PrincipalDirectory, ReceiptStore, ReceiptTransaction, StoreError,
    SystemClock,
};
use registry_core::{
    Account, Member, MemberChanges, MemberDraft, MemberFilter, MemberId, MemberPage, MemberStats,
    NewAccount, PageRequest, PrincipalId, Receipt, ReceiptChanges, ReceiptCode, ReceiptDraft,
    ReceiptFilter, ReceiptId, ReceiptPage, ReceiptTotals, RegistryError, Result, RoleName,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Injected failures, consumed as they fire
#[derive(Debug, Default)]
struct Faults {
    unavailable_inserts: u32,
    conflicting_inserts: u32,
    failing_finalizes: u32,
}

#[derive(Debug)]
struct State {
    next_receipt_id: i64,
    receipts: BTreeMap<ReceiptId, Receipt>,
    codes: HashMap<String, ReceiptId>,
    next_account_id: i64,
    accounts: BTreeMap<PrincipalId, Account>,
    roles: BTreeMap<PrincipalId, BTreeSet<RoleName>>,
    next_member_id: i64,
    members: BTreeMap<MemberId, Member>,
    faults: Faults,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_receipt_id: 1,
            receipts: BTreeMap::new(),
            codes: HashMap::new(),
            next_account_id: 1,
            accounts: BTreeMap::new(),
            roles: BTreeMap::new(),
            next_member_id: 1,
            members: BTreeMap::new(),
            faults: Faults::default(),
        }
    }
}

/// In-memory handler for [`ReceiptStore`], [`MemberStore`] and [`PrincipalDirectory`]
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn ClockEffects>,
}

impl MemoryStore {
    /// Empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty store stamping accounts with `clock`
    pub fn with_clock(clock: Arc<dyn ClockEffects>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    /// Start receipt identities at `next`
    pub fn with_next_receipt_id(self, next: i64) -> Self {
        self.state.lock().next_receipt_id = next;
        self
    }

    /// Start account identities at `next`
    pub fn with_next_account_id(self, next: i64) -> Self {
        self.state.lock().next_account_id = next;
        self
    }

    /// Make the next `count` provisional inserts fail as unavailable
    pub fn fail_next_inserts(&self, count: u32) {
        self.state.lock().faults.unavailable_inserts = count;
    }

    /// Make the next `count` provisional inserts hit a placeholder collision
    pub fn collide_next_inserts(&self, count: u32) {
        self.state.lock().faults.conflicting_inserts = count;
    }

    /// Make the next `count` code finalizations fail as unavailable
    pub fn fail_next_finalizes(&self, count: u32) {
        self.state.lock().faults.failing_finalizes = count;
    }

    /// Number of committed receipts
    pub fn receipt_count(&self) -> usize {
        self.state.lock().receipts.len()
    }

    /// Committed receipts whose code is still a placeholder
    pub fn placeholder_count(&self) -> usize {
        self.state
            .lock()
            .receipts
            .values()
            .filter(|r| r.receipt_no.is_placeholder())
            .count()
    }

    fn with_account<T>(
        &self,
        id: PrincipalId,
        update: impl FnOnce(&mut Account) -> T,
    ) -> Result<T> {
        let mut state = self.state.lock();
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found(format!("account {id}")))?;
        Ok(update(account))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

struct MemoryTransaction<'a> {
    state: &'a mut State,
    staged: BTreeMap<ReceiptId, Receipt>,
}

impl MemoryTransaction<'_> {
    fn code_taken(&self, code: &str, except: Option<ReceiptId>) -> bool {
        let committed = self
            .state
            .codes
            .get(code)
            .is_some_and(|id| Some(*id) != except);
        committed
            || self
                .staged
                .values()
                .any(|r| r.receipt_no.as_str() == code && Some(r.id) != except)
    }

    fn commit(self) {
        for (id, receipt) in self.staged {
            self.state
                .codes
                .insert(receipt.receipt_no.as_str().to_string(), id);
            self.state.receipts.insert(id, receipt);
        }
    }
}

impl ReceiptTransaction for MemoryTransaction<'_> {
    fn insert_provisional(
        &mut self,
        draft: &ReceiptDraft,
        placeholder: &ReceiptCode,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> std::result::Result<ReceiptId, StoreError> {
        if let Some(existing) = self.staged.keys().next() {
            return Err(StoreError::Rejected(format!(
                "transaction already created receipt {existing}"
            )));
        }
        let faults = &mut self.state.faults;
        if faults.unavailable_inserts > 0 {
            faults.unavailable_inserts -= 1;
            return Err(StoreError::unavailable("injected insert failure"));
        }
        if faults.conflicting_inserts > 0 {
            faults.conflicting_inserts -= 1;
            return Err(StoreError::UniqueViolation {
                column: "receipt_no".to_string(),
                value: placeholder.to_string(),
            });
        }
        if self.code_taken(placeholder.as_str(), None) {
            return Err(StoreError::UniqueViolation {
                column: "receipt_no".to_string(),
                value: placeholder.to_string(),
            });
        }

        let id = ReceiptId(self.state.next_receipt_id);
        self.state.next_receipt_id += 1;
        self.staged.insert(
            id,
            Receipt::from_draft(id, placeholder.clone(), draft, created_by, now),
        );
        Ok(id)
    }

    fn finalize_code(
        &mut self,
        id: ReceiptId,
        code: &ReceiptCode,
    ) -> std::result::Result<(), StoreError> {
        let faults = &mut self.state.faults;
        if faults.failing_finalizes > 0 {
            faults.failing_finalizes -= 1;
            return Err(StoreError::unavailable("injected finalize failure"));
        }
        if self.code_taken(code.as_str(), Some(id)) {
            return Err(StoreError::UniqueViolation {
                column: "receipt_no".to_string(),
                value: code.to_string(),
            });
        }
        let receipt = self
            .staged
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("receipt {id} in transaction")))?;
        receipt.receipt_no = code.clone();
        Ok(())
    }

    fn load(&mut self, id: ReceiptId) -> std::result::Result<Option<Receipt>, StoreError> {
        Ok(self
            .staged
            .get(&id)
            .or_else(|| self.state.receipts.get(&id))
            .cloned())
    }
}

fn sorted_matches(state: &State, filter: &ReceiptFilter) -> Vec<Receipt> {
    let mut rows: Vec<Receipt> = state
        .receipts
        .values()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    rows.sort_by(Receipt::listing_order);
    rows
}

#[async_trait]
impl ReceiptStore for MemoryStore {
    async fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn ReceiptTransaction) -> Result<T> + Send + 'static,
    {
        let mut state = self.state.lock();
        let mut tx = MemoryTransaction {
            state: &mut *state,
            staged: BTreeMap::new(),
        };
        let outcome = {
            let handle: &mut dyn ReceiptTransaction = &mut tx;
            work(handle)
        };
        match outcome {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(err) => {
                debug!(staged = tx.staged.len(), error = %err, "rolling back transaction");
                Err(err)
            }
        }
    }

    async fn receipt(&self, id: ReceiptId) -> Result<Option<Receipt>> {
        Ok(self.state.lock().receipts.get(&id).cloned())
    }

    async fn update_receipt(
        &self,
        id: ReceiptId,
        changes: ReceiptChanges,
        now: DateTime<Utc>,
    ) -> Result<Receipt> {
        let mut state = self.state.lock();
        let stored = state
            .receipts
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found(format!("receipt {id}")))?;
        changes.apply_to(stored, now)?;
        Ok(stored.clone())
    }

    async fn query(&self, filter: &ReceiptFilter, page: PageRequest) -> Result<ReceiptPage> {
        page.validate()?;
        let rows = sorted_matches(&self.state.lock(), filter);
        let total_count = rows.len() as u64;
        let data = rows
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.page_size as usize)
            .collect();
        Ok(ReceiptPage {
            total_count,
            page_num: page.page_num,
            page_size: page.page_size,
            data,
        })
    }

    async fn query_all(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>> {
        Ok(sorted_matches(&self.state.lock(), filter))
    }

    async fn totals(&self, filter: &ReceiptFilter) -> Result<ReceiptTotals> {
        let state = self.state.lock();
        let mut totals = ReceiptTotals::default();
        for receipt in state.receipts.values().filter(|r| filter.matches(r)) {
            totals.add(receipt);
        }
        Ok(totals)
    }

    async fn creator_ids(&self) -> Result<Vec<PrincipalId>> {
        let state = self.state.lock();
        let creators: BTreeSet<PrincipalId> =
            state.receipts.values().map(|r| r.created_by).collect();
        Ok(creators.into_iter().collect())
    }
}

fn sorted_members(state: &State, filter: &MemberFilter) -> Vec<Member> {
    let mut rows: Vec<Member> = state
        .members
        .values()
        .filter(|m| filter.matches(m))
        .cloned()
        .collect();
    rows.sort_by(Member::listing_order);
    rows
}

impl State {
    fn live_member(&mut self, id: MemberId) -> Result<&mut Member> {
        self.members
            .get_mut(&id)
            .filter(|m| !m.deleted)
            .ok_or_else(|| RegistryError::not_found(format!("member {id}")))
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn insert_member(
        &self,
        draft: MemberDraft,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Member> {
        let mut state = self.state.lock();
        let id = MemberId(state.next_member_id);
        state.next_member_id += 1;
        let member = Member::from_draft(id, draft, created_by, now);
        state.members.insert(id, member.clone());
        Ok(member)
    }

    async fn member(&self, id: MemberId) -> Result<Option<Member>> {
        Ok(self
            .state
            .lock()
            .members
            .get(&id)
            .filter(|m| !m.deleted)
            .cloned())
    }

    async fn update_member(
        &self,
        id: MemberId,
        changes: MemberChanges,
        now: DateTime<Utc>,
    ) -> Result<Member> {
        let mut state = self.state.lock();
        let member = state.live_member(id)?;
        changes.apply_to(member, now);
        Ok(member.clone())
    }

    async fn delete_member(&self, id: MemberId, now: DateTime<Utc>) -> Result<Member> {
        let mut state = self.state.lock();
        let member = state.live_member(id)?;
        member.deleted = true;
        member.modified_at = now;
        Ok(member.clone())
    }

    async fn query_members(&self, filter: &MemberFilter, page: PageRequest) -> Result<MemberPage> {
        page.validate()?;
        let rows = sorted_members(&self.state.lock(), filter);
        Ok(MemberPage::slice(rows, page))
    }

    async fn query_all_members(&self, filter: &MemberFilter) -> Result<Vec<Member>> {
        Ok(sorted_members(&self.state.lock(), filter))
    }

    async fn member_stats(&self, filter: &MemberFilter) -> Result<MemberStats> {
        let state = self.state.lock();
        let mut stats = MemberStats::default();
        for member in state.members.values().filter(|m| filter.matches(m)) {
            stats.add(member.member_type);
        }
        Ok(stats)
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryStore {
    async fn account(&self, id: PrincipalId) -> Result<Option<Account>> {
        Ok(self.state.lock().accounts.get(&id).cloned())
    }

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>> {
        Ok(self
            .state
            .lock()
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn roles_of(&self, id: PrincipalId) -> Result<Vec<RoleName>> {
        Ok(self
            .state
            .lock()
            .roles
            .get(&id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_account(&self, new: NewAccount) -> Result<Account> {
        new.validate()?;
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.accounts.values().any(|a| a.username == new.username) {
            return Err(StoreError::UniqueViolation {
                column: "username".to_string(),
                value: new.username,
            }
            .into());
        }

        let id = PrincipalId(state.next_account_id);
        state.next_account_id += 1;
        let account = Account {
            id,
            username: new.username,
            active: new.active,
            superuser: new.superuser,
            created_at: now,
        };
        state.accounts.insert(id, account.clone());
        state.roles.insert(id, new.roles.into_iter().collect());
        Ok(account)
    }

    async fn set_roles(&self, id: PrincipalId, roles: &[RoleName]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.accounts.contains_key(&id) {
            return Err(RegistryError::not_found(format!("account {id}")));
        }
        state.roles.insert(id, roles.iter().cloned().collect());
        Ok(())
    }

    async fn set_active(&self, id: PrincipalId, active: bool) -> Result<Account> {
        self.with_account(id, |account| {
            account.active = active;
            account.clone()
        })
    }

    async fn set_superuser(&self, id: PrincipalId, superuser: bool) -> Result<Account> {
        self.with_account(id, |account| {
            account.superuser = superuser;
            account.clone()
        })
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self.state.lock().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use registry_core::{PaymentMode, ReceiptStatus};
    use rust_decimal::Decimal;

    fn draft(donor: &str) -> ReceiptDraft {
        ReceiptDraft::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            donor,
            PaymentMode::Cash,
            Decimal::new(100, 0),
        )
    }

    fn code(s: &str) -> ReceiptCode {
        ReceiptCode::new(s).unwrap()
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let id = store
            .transaction(|tx| {
                let id = tx.insert_provisional(
                    &draft("A"),
                    &code("TEMP_1"),
                    PrincipalId(1),
                    Utc::now(),
                )?;
                tx.finalize_code(id, &code("RC1/2025/0001"))?;
                Ok(id)
            })
            .await
            .unwrap();

        let stored = store.receipt(id).await.unwrap().unwrap();
        assert_eq!(stored.receipt_no.as_str(), "RC1/2025/0001");
        assert_eq!(stored.status, ReceiptStatus::Completed);
    }

    #[tokio::test]
    async fn rolled_back_transaction_leaves_nothing_and_burns_identity() {
        let store = MemoryStore::new();
        let result: Result<ReceiptId> = store
            .transaction(|tx| {
                tx.insert_provisional(&draft("A"), &code("TEMP_1"), PrincipalId(1), Utc::now())?;
                Err(RegistryError::invalid("abort"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.receipt_count(), 0);

        let id = store
            .transaction(|tx| {
                let id = tx.insert_provisional(
                    &draft("B"),
                    &code("TEMP_2"),
                    PrincipalId(1),
                    Utc::now(),
                )?;
                tx.finalize_code(id, &code("X"))?;
                Ok(id)
            })
            .await
            .unwrap();
        assert_eq!(id, ReceiptId(2));
    }

    #[tokio::test]
    async fn second_insert_in_one_transaction_is_rejected() {
        let store = MemoryStore::new();
        let result: Result<ReceiptId> = store
            .transaction(|tx| {
                tx.insert_provisional(&draft("A"), &code("TEMP_1"), PrincipalId(1), Utc::now())?;
                tx.insert_provisional(&draft("B"), &code("TEMP_2"), PrincipalId(1), Utc::now())
                    .map_err(RegistryError::from)
            })
            .await;
        assert_matches!(result, Err(RegistryError::Invalid { .. }));
        assert_eq!(store.receipt_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_final_code_is_rejected() {
        let store = MemoryStore::new();
        let insert = |placeholder: &'static str| {
            move |tx: &mut dyn ReceiptTransaction| -> Result<ReceiptId> {
                let id = tx.insert_provisional(
                    &draft("A"),
                    &code(placeholder),
                    PrincipalId(1),
                    Utc::now(),
                )?;
                tx.finalize_code(id, &code("RCA/2025/0001"))?;
                Ok(id)
            }
        };
        store.transaction(insert("TEMP_a")).await.unwrap();
        assert_matches!(
            store.transaction(insert("TEMP_b")).await,
            Err(RegistryError::ConflictOnCreate { .. })
        );
        assert_eq!(store.receipt_count(), 1);
    }

    #[tokio::test]
    async fn injected_faults_fire_once_each() {
        let store = MemoryStore::new();
        store.fail_next_inserts(1);
        store.collide_next_inserts(1);

        let attempt = || {
            store.transaction(|tx| {
                tx.insert_provisional(&draft("A"), &code("TEMP_x"), PrincipalId(1), Utc::now())
                    .map_err(RegistryError::from)
            })
        };
        assert_matches!(attempt().await, Err(RegistryError::StoreUnavailable { .. }));
        assert_matches!(attempt().await, Err(RegistryError::ConflictOnCreate { .. }));
        assert!(attempt().await.is_ok());
    }

    #[tokio::test]
    async fn update_rejects_reactivation_without_writing() {
        let store = MemoryStore::new();
        let id = store
            .transaction(|tx| {
                let id =
                    tx.insert_provisional(&draft("A"), &code("T"), PrincipalId(1), Utc::now())?;
                tx.finalize_code(id, &code("RC1/2025/0001"))?;
                Ok(id)
            })
            .await
            .unwrap();

        let cancelled = store
            .update_receipt(id, ReceiptChanges::status(ReceiptStatus::Cancelled), Utc::now())
            .await
            .unwrap();
        assert_eq!(cancelled.status, ReceiptStatus::Cancelled);

        let revive = ReceiptChanges {
            donor_name: Some("Changed".to_string()),
            status: Some(ReceiptStatus::Completed),
            ..ReceiptChanges::default()
        };
        assert_matches!(
            store.update_receipt(id, revive, Utc::now()).await,
            Err(RegistryError::InvalidTransition { .. })
        );
        let stored = store.receipt(id).await.unwrap().unwrap();
        assert_eq!(stored.donor_name, "A");
    }

    #[tokio::test]
    async fn deleted_members_disappear_from_every_read() {
        let store = MemoryStore::new();
        let kept = store
            .insert_member(
                MemberDraft::new("Asha", registry_core::MemberType::General),
                PrincipalId(1),
                Utc::now(),
            )
            .await
            .unwrap();
        let gone = store
            .insert_member(
                MemberDraft::new("Bina", registry_core::MemberType::Committee),
                PrincipalId(1),
                Utc::now(),
            )
            .await
            .unwrap();

        store.delete_member(gone.id, Utc::now()).await.unwrap();
        assert!(store.member(gone.id).await.unwrap().is_none());
        assert_matches!(
            store.delete_member(gone.id, Utc::now()).await,
            Err(RegistryError::NotFound { .. })
        );
        assert_matches!(
            store
                .update_member(gone.id, MemberChanges::default(), Utc::now())
                .await,
            Err(RegistryError::NotFound { .. })
        );

        let all = store.query_all_members(&MemberFilter::default()).await.unwrap();
        assert_eq!(all, vec![kept]);
        let stats = store.member_stats(&MemberFilter::default()).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_type["commitee"], 0);
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = MemoryStore::new();
        store
            .create_account(NewAccount::new("clerk", [RoleName::from("receipt_creator")]))
            .await
            .unwrap();
        assert_matches!(
            store.create_account(NewAccount::new("clerk", [])).await,
            Err(RegistryError::Conflict { .. })
        );
    }
}
