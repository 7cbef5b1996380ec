//! Both storage handlers must agree on the observable contract: listing
//! order, ownership filtering, totals, lifecycle checks, rollback, identity
//! allocation, case folding and member soft deletion.

use assert_matches::assert_matches;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use registry_core::effects::{MemberStore, PrincipalDirectory, ReceiptStore};
use registry_core::{
    MemberChanges, MemberDraft, MemberFilter, MemberStatus, MemberType, NewAccount, PageRequest,
    PaymentMode, PrincipalId, ReceiptChanges, ReceiptCode, ReceiptDraft, ReceiptFilter, ReceiptId,
    ReceiptStatus, RegistryError, RoleName,
};
use registry_store::{MemoryStore, SqliteStore};
use rust_decimal::Decimal;
use std::sync::Arc;

fn draft(donor: impl Into<String>, day: u32, amount: i64) -> ReceiptDraft {
    ReceiptDraft::new(
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap(),
        donor,
        PaymentMode::Cash,
        Decimal::new(amount, 0),
    )
}

async fn insert<S: ReceiptStore>(
    store: &S,
    owner: i64,
    day: u32,
    amount: i64,
    code: &str,
) -> ReceiptId {
    insert_draft(store, owner, draft(format!("Donor {day}"), day, amount), code).await
}

async fn insert_draft<S: ReceiptStore>(
    store: &S,
    owner: i64,
    draft: ReceiptDraft,
    code: &str,
) -> ReceiptId {
    let placeholder = ReceiptCode::new(format!("TEMP_{code}")).unwrap();
    let code = ReceiptCode::new(code).unwrap();
    store
        .transaction(move |tx| {
            let id = tx.insert_provisional(&draft, &placeholder, PrincipalId(owner), Utc::now())?;
            tx.finalize_code(id, &code)?;
            Ok(id)
        })
        .await
        .unwrap()
}

async fn exercise<S: ReceiptStore + PrincipalDirectory>(store: S) {
    let a = insert(&store, 1, 10, 100, "RC1/2025/0001").await;
    insert(&store, 2, 12, 50, "RC2/2025/0002").await;
    insert(&store, 1, 11, 25, "RC1/2025/0003").await;

    let mine = store.query_all(&ReceiptFilter::owned_by(PrincipalId(1))).await.unwrap();
    let days: Vec<_> = mine.iter().map(|r| r.donor_name.clone()).collect();
    assert_eq!(days, vec!["Donor 11", "Donor 10"]);

    let page = store
        .query(&ReceiptFilter::default(), PageRequest::new(1, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(page.total_count, 3);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0].donor_name, "Donor 12");

    store
        .update_receipt(a, ReceiptChanges::status(ReceiptStatus::Cancelled), Utc::now())
        .await
        .unwrap();
    assert_matches!(
        store
            .update_receipt(a, ReceiptChanges::status(ReceiptStatus::Completed), Utc::now())
            .await,
        Err(RegistryError::InvalidTransition { .. })
    );
    assert_matches!(
        store
            .update_receipt(ReceiptId(9_999), ReceiptChanges::default(), Utc::now())
            .await,
        Err(RegistryError::NotFound { .. })
    );

    let totals = store.totals(&ReceiptFilter::default()).await.unwrap();
    assert_eq!(totals.total_receipts, 3);
    assert_eq!(totals.cancelled_receipts, 1);
    assert_eq!(totals.completed_receipts, 2);
    assert_eq!(totals.total_donation_amount, Decimal::new(175, 0));

    assert_eq!(
        store.creator_ids().await.unwrap(),
        vec![PrincipalId(1), PrincipalId(2)]
    );

    let account = store
        .create_account(NewAccount::new("viewer", [RoleName::from("receipt_report_viewer")]))
        .await
        .unwrap();
    store
        .set_roles(account.id, &[RoleName::from("receipt_creator")])
        .await
        .unwrap();
    assert_eq!(
        store.roles_of(account.id).await.unwrap(),
        vec![RoleName::from("receipt_creator")]
    );
    let promoted = store.set_superuser(account.id, true).await.unwrap();
    assert!(promoted.superuser);
    assert_eq!(store.list_accounts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn memory_store_meets_contract() {
    exercise(MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_meets_contract() {
    exercise(SqliteStore::open_in_memory().unwrap()).await;
}

/// Insert under `code` and fail at finalization, reporting the identity the
/// aborted transaction was given
async fn abort_on_collision<S: ReceiptStore>(store: &S, code: &str) -> ReceiptId {
    let seen = Arc::new(Mutex::new(None));
    let observed = Arc::clone(&seen);
    let placeholder = ReceiptCode::new(format!("TEMP_abort_{code}")).unwrap();
    let code = ReceiptCode::new(code).unwrap();
    let outcome = store
        .transaction(move |tx| {
            let id = tx.insert_provisional(
                &draft("Aborted", 20, 10),
                &placeholder,
                PrincipalId(1),
                Utc::now(),
            )?;
            *observed.lock() = Some(id);
            tx.finalize_code(id, &code)?;
            Ok(id)
        })
        .await;
    assert_matches!(outcome, Err(RegistryError::ConflictOnCreate { .. }));
    let id = seen.lock().take();
    id.unwrap()
}

async fn identities_are_never_reissued<S: ReceiptStore>(store: S) {
    let first = insert(&store, 1, 1, 10, "RC1/2025/0001").await;
    let second = insert(&store, 1, 2, 10, "RC1/2025/0002").await;

    let mut aborted = Vec::new();
    for _ in 0..3 {
        aborted.push(abort_on_collision(&store, "RC1/2025/0001").await);
    }
    let next = insert(&store, 1, 3, 10, "RC1/2025/0005").await;

    let mut issued = vec![first, second];
    issued.extend(aborted.iter().copied());
    issued.push(next);
    assert!(
        issued.windows(2).all(|pair| pair[0] < pair[1]),
        "identities must strictly increase across rollbacks: {issued:?}"
    );
    assert!(store.receipt(aborted[0]).await.unwrap().is_none());
    assert_eq!(store.query_all(&ReceiptFilter::default()).await.unwrap().len(), 3);
}

async fn text_filters_fold_non_ascii<S: ReceiptStore>(store: S) {
    insert_draft(&store, 1, draft("ÉLISE Dupont", 4, 10), "RC1/2025/0001").await;
    let mut village = draft("Ravi", 5, 10);
    village.village = Some("ÖRNSKÖLDSVIK".to_string());
    insert_draft(&store, 1, village, "RC1/2025/0002").await;

    let search = ReceiptFilter {
        search: Some("élise".to_string()),
        ..ReceiptFilter::default()
    };
    assert_eq!(store.query_all(&search).await.unwrap().len(), 1);
    let by_village = ReceiptFilter {
        village: Some("örnsköld".to_string()),
        ..ReceiptFilter::default()
    };
    let hits = store.query_all(&by_village).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].donor_name, "Ravi");
    let literal = ReceiptFilter {
        search: Some("%".to_string()),
        ..ReceiptFilter::default()
    };
    assert!(store.query_all(&literal).await.unwrap().is_empty());
}

async fn members_behave_alike<S: MemberStore>(store: S) {
    let add = |name: &str, member_type: MemberType, village: Option<&str>| MemberDraft {
        village: village.map(str::to_string),
        mobile_no1: Some(format!("98{}", name.len())),
        ..MemberDraft::new(name, member_type)
    };
    let zara = store
        .insert_member(add("Zara", MemberType::NonResident, None), PrincipalId(2), Utc::now())
        .await
        .unwrap();
    let bina = store
        .insert_member(add("Bina", MemberType::General, Some("Rampur")), PrincipalId(1), Utc::now())
        .await
        .unwrap();
    let arun = store
        .insert_member(add("Arun", MemberType::General, Some("Rampur")), PrincipalId(1), Utc::now())
        .await
        .unwrap();
    let chet = store
        .insert_member(add("Chet", MemberType::General, None), PrincipalId(1), Utc::now())
        .await
        .unwrap();

    let listed = store.query_all_members(&MemberFilter::default()).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![chet.id, arun.id, bina.id, zara.id]);

    let page = store
        .query_members(&MemberFilter::default(), PageRequest::new(2, 3).unwrap())
        .await
        .unwrap();
    assert_eq!(page.total_count, 4);
    assert_eq!(page.data.len(), 1);

    let mine = MemberFilter {
        created_by: Some(PrincipalId(1)),
        villages: vec!["RAMPUR".to_string()],
        ..MemberFilter::default()
    };
    assert_eq!(store.query_all_members(&mine).await.unwrap().len(), 2);

    let moved = store
        .update_member(
            bina.id,
            MemberChanges {
                status: Some(MemberStatus::Shifted),
                member_type: Some(MemberType::Committee),
                ..MemberChanges::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(moved.status, MemberStatus::Shifted);
    assert_eq!(moved.village.as_deref(), Some("Rampur"));

    store.delete_member(zara.id, Utc::now()).await.unwrap();
    assert!(store.member(zara.id).await.unwrap().is_none());
    assert_matches!(
        store
            .update_member(zara.id, MemberChanges::default(), Utc::now())
            .await,
        Err(RegistryError::NotFound { .. })
    );

    let stats = store.member_stats(&MemberFilter::default()).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_type["all"], 2);
    assert_eq!(stats.by_type["commitee"], 1);
    assert_eq!(stats.by_type["nrs"], 0);
}

#[tokio::test]
async fn memory_store_never_reissues_identities() {
    identities_are_never_reissued(MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_never_reissues_identities() {
    identities_are_never_reissued(SqliteStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn memory_store_folds_non_ascii_text() {
    text_filters_fold_non_ascii(MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_folds_non_ascii_text() {
    text_filters_fold_non_ascii(SqliteStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn memory_store_keeps_members() {
    members_behave_alike(MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_keeps_members() {
    members_behave_alike(SqliteStore::open_in_memory().unwrap()).await;
}
