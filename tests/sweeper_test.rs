mod common;

use std::sync::Arc;
use std::time::Duration;

use carepay_core::adapters::InMemoryTransactionStore;
use carepay_core::config::SweepConfig;
use carepay_core::domain::{PayerContact, Platform, Transaction, TransactionStatus};
use carepay_core::ports::TransactionStore;
use carepay_core::services::orchestrator::CallbackOutcome;
use carepay_core::services::{sweep_once, SweepReport};
use chrono::Utc;
use common::{orchestrator, provider_outcome, signed_callback, FakeGateway, ProviderReply};

fn sweep_config() -> SweepConfig {
    SweepConfig {
        interval: Duration::from_secs(60),
        batch_size: 10,
        reconcile_after: Duration::from_secs(300),
        pending_expiry: Duration::from_secs(3_600),
    }
}

async fn pending_created_ago(store: &InMemoryTransactionStore, age: chrono::Duration) -> String {
    let mut tx = Transaction::new(
        "member-7".to_string(),
        50_000,
        Platform::Web,
        PayerContact::default(),
    );
    tx.created_at = Utc::now() - age;
    tx.updated_at = tx.created_at;
    store.create(&tx).await.unwrap();
    tx.transaction_id
}

#[tokio::test]
async fn test_sweep_skips_recent_payments() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let id = pending_created_ago(&store, chrono::Duration::seconds(30)).await;

    let report = sweep_once(&orchestrator, &sweep_config()).await.unwrap();

    assert_eq!(report, SweepReport::default());
    assert_eq!(gateway.status_calls(), 0);
    assert_eq!(
        store.find_by_id(&id).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_sweep_settles_stale_payments() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let paid = pending_created_ago(&store, chrono::Duration::minutes(10)).await;
    let declined = pending_created_ago(&store, chrono::Duration::minutes(10)).await;
    let waiting = pending_created_ago(&store, chrono::Duration::minutes(10)).await;
    gateway.reply_with(&paid, ProviderReply::Success);
    gateway.reply_with(&declined, ProviderReply::Failed);
    gateway.reply_with(&waiting, ProviderReply::Pending);

    let report = sweep_once(&orchestrator, &sweep_config()).await.unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.settled, 2);
    assert_eq!(report.still_pending, 1);
    assert_eq!(report.expired, 0);
    assert_eq!(
        store.find_by_id(&paid).await.unwrap().status,
        TransactionStatus::Success
    );
    assert_eq!(
        store.find_by_id(&declined).await.unwrap().status,
        TransactionStatus::Failed
    );
    assert_eq!(
        store.find_by_id(&waiting).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_sweep_expires_payments_still_pending_past_deadline() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let gateway = Arc::new(FakeGateway::new());
    gateway.reply_to_all(ProviderReply::Pending);
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let abandoned = pending_created_ago(&store, chrono::Duration::hours(2)).await;
    let stale = pending_created_ago(&store, chrono::Duration::minutes(10)).await;

    let report = sweep_once(&orchestrator, &sweep_config()).await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.expired, 1);
    assert_eq!(report.still_pending, 1);

    let expired = store.find_by_id(&abandoned).await.unwrap();
    assert_eq!(expired.status, TransactionStatus::Failed);
    assert_eq!(expired.provider_response.unwrap()["reason"], "expired");

    assert_eq!(
        store.find_by_id(&stale).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn test_sweep_during_provider_outage_keeps_payments_pending() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let gateway = Arc::new(FakeGateway::new());
    gateway.reply_to_all(ProviderReply::Timeout);
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let id = pending_created_ago(&store, chrono::Duration::hours(2)).await;

    let report = sweep_once(&orchestrator, &sweep_config()).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.expired, 0);
    assert_eq!(report.still_pending, 1);
    assert_eq!(
        store.find_by_id(&id).await.unwrap().status,
        TransactionStatus::Pending
    );

    // The customer did pay; the late callback must still settle the record.
    let (body, checksum) = signed_callback(&provider_outcome(&id, true, "PAYMENT_SUCCESS"));
    let outcome = orchestrator
        .handle_callback(&body, Some(&checksum))
        .await
        .unwrap();

    assert!(matches!(outcome, CallbackOutcome::Settled(_)));
    assert_eq!(
        store.find_by_id(&id).await.unwrap().status,
        TransactionStatus::Success
    );
}

#[tokio::test]
async fn test_sweep_holds_amount_mismatch_for_review() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let mut tx = Transaction::new(
        "member-7".to_string(),
        90_000,
        Platform::Web,
        PayerContact::default(),
    );
    tx.created_at = Utc::now() - chrono::Duration::hours(2);
    store.create(&tx).await.unwrap();
    gateway.reply_with(&tx.transaction_id, ProviderReply::Success);

    let report = sweep_once(&orchestrator, &sweep_config()).await.unwrap();

    assert_eq!(report.settled, 0);
    assert_eq!(report.expired, 0);
    assert_eq!(report.errors, 1);
    let stored = store.find_by_id(&tx.transaction_id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(stored.provider_response.unwrap()["data"]["amount"], 50_000);
}

#[tokio::test]
async fn test_sweep_expiry_never_overrides_settled_payment() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    let id = pending_created_ago(&store, chrono::Duration::hours(2)).await;
    store
        .update_status_if_pending(&id, TransactionStatus::Success, serde_json::json!({}))
        .await
        .unwrap();

    let update = orchestrator.expire(&id).await.unwrap();

    assert!(!update.applied());
    assert_eq!(
        store.find_by_id(&id).await.unwrap().status,
        TransactionStatus::Success
    );
}

#[tokio::test]
async fn test_sweep_respects_batch_size() {
    let store = Arc::new(InMemoryTransactionStore::new());
    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = orchestrator(store.clone(), gateway.clone());
    for _ in 0..5 {
        pending_created_ago(&store, chrono::Duration::minutes(10)).await;
    }
    let config = SweepConfig {
        batch_size: 2,
        ..sweep_config()
    };

    let report = sweep_once(&orchestrator, &config).await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(gateway.status_calls(), 2);
}
