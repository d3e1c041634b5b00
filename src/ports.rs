//! Seams between the payment orchestrator and its I/O collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Transaction, TransactionStatus};
use crate::gateway::client::{GatewayError, SessionRequest};
use crate::gateway::models::StatusReport;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transaction {0} already exists")]
    Duplicate(String),
    #[error("Transaction {0} not found")]
    NotFound(String),
    #[error("Cannot move transaction to {0}")]
    InvalidTransition(TransactionStatus),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The record was `pending` and now carries the new status.
    Applied(Transaction),
    /// The record was already terminal; nothing changed. Carries the settled record.
    TerminalStateConflict(Transaction),
}

impl StatusUpdate {
    pub fn applied(&self) -> bool {
        matches!(self, StatusUpdate::Applied(_))
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            StatusUpdate::Applied(tx) | StatusUpdate::TerminalStateConflict(tx) => tx,
        }
    }
}

/// Durable record of payment transactions.
///
/// `update_status_if_pending` is the only way `status` changes and must be a
/// single compare-and-swap at the storage layer.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, tx: &Transaction) -> StoreResult<Transaction>;

    async fn find_by_id(&self, transaction_id: &str) -> StoreResult<Transaction>;

    async fn update_status_if_pending(
        &self,
        transaction_id: &str,
        new_status: TransactionStatus,
        provider_response: serde_json::Value,
    ) -> StoreResult<StatusUpdate>;

    /// Overwrites the audit copy of the provider's last response. Never touches `status`.
    async fn record_provider_response(
        &self,
        transaction_id: &str,
        provider_response: serde_json::Value,
    ) -> StoreResult<()>;

    /// Oldest-first `pending` records created at or before `created_before`.
    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Outbound calls to the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout session and returns its URL.
    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError>;

    /// Idempotent status lookup. Safe to retry.
    async fn query_status(&self, transaction_id: &str) -> Result<StatusReport, GatewayError>;
}
