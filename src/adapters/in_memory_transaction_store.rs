use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{StatusUpdate, StoreError, StoreResult, TransactionStore};

/// A thread-safe in-memory transaction store.
///
/// The write lock is only held for the duration of a map operation, which makes
/// the status check and the write a single atomic step.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.transaction_id) {
            return Err(StoreError::Duplicate(tx.transaction_id.clone()));
        }
        transactions.insert(tx.transaction_id.clone(), tx.clone());
        Ok(tx.clone())
    }

    async fn find_by_id(&self, transaction_id: &str) -> StoreResult<Transaction> {
        let transactions = self.transactions.read().await;
        transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(transaction_id.to_string()))
    }

    async fn update_status_if_pending(
        &self,
        transaction_id: &str,
        new_status: TransactionStatus,
        provider_response: serde_json::Value,
    ) -> StoreResult<StatusUpdate> {
        if !new_status.is_terminal() {
            return Err(StoreError::InvalidTransition(new_status));
        }

        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::NotFound(transaction_id.to_string()))?;

        if tx.is_terminal() {
            return Ok(StatusUpdate::TerminalStateConflict(tx.clone()));
        }

        tx.status = new_status;
        tx.provider_response = Some(provider_response);
        tx.updated_at = Utc::now();
        Ok(StatusUpdate::Applied(tx.clone()))
    }

    async fn record_provider_response(
        &self,
        transaction_id: &str,
        provider_response: serde_json::Value,
    ) -> StoreResult<()> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::NotFound(transaction_id.to_string()))?;
        tx.provider_response = Some(provider_response);
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut pending: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending && tx.created_at <= created_before)
            .cloned()
            .collect();
        pending.sort_by_key(|tx| tx.created_at);
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
