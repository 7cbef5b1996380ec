//! Receipt code allocation through the service

mod support;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use registry_core::config::SequencerConfig;
use registry_core::effects::{PrincipalDirectory, ReceiptStore};
use registry_core::{ReceiptFilter, ReceiptId, ReceiptStatus, RegistryError};
use registry_store::{MemoryStore, SqliteStore};
use std::sync::Arc;
use support::{account_in, draft, receipt_service, Fixture};

#[tokio::test]
async fn creator_username_digits_drive_the_code() {
    let fx = Fixture::with_store(MemoryStore::new().with_next_receipt_id(1407));
    let creator = fx.account("receipt_creator7", &["receipt_creator"]).await;

    let receipt = fx
        .receipts
        .create_receipt(creator.id, draft("John Doe", 500))
        .await
        .unwrap();

    assert_eq!(receipt.receipt_no.as_str(), "RC7/2025/0777");
    assert_eq!(receipt.created_by, creator.id);
    assert_eq!(receipt.status, ReceiptStatus::Completed);
}

#[tokio::test]
async fn superuser_gets_admin_code_with_raw_identity_below_offset() {
    let fx = Fixture::with_store(MemoryStore::new().with_next_receipt_id(50));
    let root = fx.superuser("root").await;

    let receipt = fx
        .receipts
        .create_receipt(root.id, draft("Asha", 1001))
        .await
        .unwrap();
    assert_eq!(receipt.receipt_no.as_str(), "RCA/2025/0050");
}

#[tokio::test]
async fn admin_role_holder_shares_admin_code_and_year_follows_clock() {
    let fx = Fixture::with_store(MemoryStore::new().with_next_receipt_id(700));
    let admin = fx.account("office", &["admin"]).await;
    fx.clock
        .set(Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());

    let receipt = fx
        .receipts
        .create_receipt(admin.id, draft("Ravi", 10))
        .await
        .unwrap();
    assert_eq!(receipt.receipt_no.as_str(), "RCA/2026/0070");
}

#[tokio::test]
async fn unrecognized_username_falls_back_to_principal_identity() {
    let fx = Fixture::with_store(MemoryStore::new().with_next_account_id(31).with_next_receipt_id(640));
    let clerk = fx.account("clerk", &["receipt_creator"]).await;

    let receipt = fx
        .receipts
        .create_receipt(clerk.id, draft("Meena", 75))
        .await
        .unwrap();
    assert_eq!(receipt.receipt_no.as_str(), "RC31/2025/0010");
}

#[tokio::test]
async fn placeholder_collisions_are_retried() {
    let fx = Fixture::new();
    let creator = fx.account("receipt_creator2", &["receipt_creator"]).await;
    fx.store.collide_next_inserts(2);

    let receipt = fx
        .receipts
        .create_receipt(creator.id, draft("Kiran", 40))
        .await
        .unwrap();
    assert!(!receipt.receipt_no.is_placeholder());
    assert_eq!(fx.store.receipt_count(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_conflict_and_leave_nothing() {
    let fx = Fixture::new();
    let creator = fx.account("receipt_creator2", &["receipt_creator"]).await;
    fx.store.collide_next_inserts(3);

    assert_matches!(
        fx.receipts.create_receipt(creator.id, draft("Kiran", 40)).await,
        Err(RegistryError::ConflictOnCreate { .. })
    );
    assert_eq!(fx.store.receipt_count(), 0);

    fx.store.fail_next_inserts(3);
    assert_matches!(
        fx.receipts.create_receipt(creator.id, draft("Kiran", 40)).await,
        Err(RegistryError::StoreUnavailable { .. })
    );
    assert_eq!(fx.store.receipt_count(), 0);
}

#[tokio::test]
async fn failed_finalization_rolls_back_the_provisional_row() {
    let fx = Fixture::new();
    let creator = fx.account("receipt_creator3", &["receipt_creator"]).await;
    fx.store.fail_next_finalizes(1);

    assert_matches!(
        fx.receipts.create_receipt(creator.id, draft("Lata", 20)).await,
        Err(RegistryError::StoreUnavailable { .. })
    );
    assert_eq!(fx.store.receipt_count(), 0);
    assert_eq!(fx.store.placeholder_count(), 0);

    let receipt = fx
        .receipts
        .create_receipt(creator.id, draft("Lata", 20))
        .await
        .unwrap();
    assert_eq!(receipt.id.value(), 2);
}

#[tokio::test]
async fn invalid_draft_is_rejected_before_any_write() {
    let fx = Fixture::new();
    let creator = fx.account("receipt_creator4", &["receipt_creator"]).await;

    assert_matches!(
        fx.receipts.create_receipt(creator.id, draft("Nil", 0)).await,
        Err(RegistryError::Invalid { .. })
    );
    assert_eq!(fx.store.receipt_count(), 0);
}

fn small_offset(placeholder_attempts: u32) -> SequencerConfig {
    SequencerConfig {
        offset: 2,
        placeholder_attempts,
        ..SequencerConfig::default()
    }
}

/// Identities 3 and 4 map onto the codes of identities 1 and 2
async fn code_collisions_retry_with_fresh_identities<S>(store: S)
where
    S: ReceiptStore + PrincipalDirectory + 'static,
{
    let store = Arc::new(store);
    let service = receipt_service(&store, small_offset(3));
    let creator = account_in(store.as_ref(), "receipt_creator1", &["receipt_creator"]).await;

    let mut codes = Vec::new();
    for n in 0..3 {
        let receipt = service
            .create_receipt(creator.id, draft(&format!("Donor {n}"), 10))
            .await
            .unwrap();
        codes.push((receipt.id, receipt.receipt_no.to_string()));
    }
    assert_eq!(
        codes,
        vec![
            (ReceiptId(1), "RC1/2025/0001".to_string()),
            (ReceiptId(2), "RC1/2025/0002".to_string()),
            (ReceiptId(5), "RC1/2025/0003".to_string()),
        ]
    );
    assert_eq!(store.query_all(&ReceiptFilter::default()).await.unwrap().len(), 3);
}

/// Without retries each collision surfaces, commits nothing, and burns its identity
async fn rolled_back_allocations_never_reuse_identities<S>(store: S)
where
    S: ReceiptStore + PrincipalDirectory + 'static,
{
    let store = Arc::new(store);
    let service = receipt_service(&store, small_offset(1));
    let creator = account_in(store.as_ref(), "receipt_creator1", &["receipt_creator"]).await;

    for n in 0..2 {
        service
            .create_receipt(creator.id, draft(&format!("Donor {n}"), 10))
            .await
            .unwrap();
    }
    for _ in 0..2 {
        assert_matches!(
            service.create_receipt(creator.id, draft("Clash", 10)).await,
            Err(RegistryError::ConflictOnCreate { .. })
        );
        assert_eq!(store.query_all(&ReceiptFilter::default()).await.unwrap().len(), 2);
    }

    let receipt = service
        .create_receipt(creator.id, draft("Settled", 10))
        .await
        .unwrap();
    assert_eq!(receipt.id, ReceiptId(5));
    assert_eq!(receipt.receipt_no.as_str(), "RC1/2025/0003");
    let placeholders = store
        .query_all(&ReceiptFilter::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.receipt_no.is_placeholder())
        .count();
    assert_eq!(placeholders, 0);
}

#[tokio::test]
async fn memory_store_retries_taken_final_codes() {
    code_collisions_retry_with_fresh_identities(MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_retries_taken_final_codes() {
    code_collisions_retry_with_fresh_identities(SqliteStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn memory_store_burns_identities_of_rolled_back_allocations() {
    rolled_back_allocations_never_reuse_identities(MemoryStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_burns_identities_of_rolled_back_allocations() {
    rolled_back_allocations_never_reuse_identities(SqliteStore::open_in_memory().unwrap()).await;
}
