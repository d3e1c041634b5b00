//! Postgres implementation of TransactionStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{PayerContact, Transaction, TransactionStatus};
use crate::ports::{StatusUpdate, StoreError, StoreResult, TransactionStore};

const RETURNING_COLUMNS: &str = "transaction_id, subject_id, payer_name, mobile_number, email, \
     amount_minor_units, status, platform, request_payload, provider_response, \
     created_at, updated_at";

/// Postgres-backed transaction store.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn create(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO payment_transactions (
                transaction_id, subject_id, payer_name, mobile_number, email,
                amount_minor_units, status, platform, request_payload, provider_response,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING {}
            "#,
            RETURNING_COLUMNS
        ))
        .bind(&tx.transaction_id)
        .bind(&tx.subject_id)
        .bind(&tx.contact.name)
        .bind(&tx.contact.mobile_number)
        .bind(&tx.contact.email)
        .bind(tx.amount_minor_units)
        .bind(tx.status.as_str())
        .bind(tx.platform.as_str())
        .bind(&tx.request_payload)
        .bind(&tx.provider_response)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(StoreError::Duplicate(tx.transaction_id.clone())),
        }
    }

    async fn find_by_id(&self, transaction_id: &str) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE transaction_id = $1",
            RETURNING_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(transaction_id.to_string()))?
            .into_domain()
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

        // The status guard in the WHERE clause is the compare-and-swap.
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE payment_transactions
            SET status = $2, provider_response = $3, updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            RETURNING_COLUMNS
        ))
        .bind(transaction_id)
        .bind(new_status.as_str())
        .bind(&provider_response)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(StatusUpdate::Applied(row.into_domain()?)),
            None => {
                let current = self.find_by_id(transaction_id).await?;
                Ok(StatusUpdate::TerminalStateConflict(current))
            }
        }
    }

    async fn record_provider_response(
        &self,
        transaction_id: &str,
        provider_response: serde_json::Value,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET provider_response = $2, updated_at = NOW()
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(&provider_response)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(transaction_id.to_string()));
        }
        Ok(())
    }

    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        // No row locks; concurrent sweepers race on the conditional update.
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {}
            FROM payment_transactions
            WHERE status = 'pending' AND created_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            RETURNING_COLUMNS
        ))
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    subject_id: String,
    payer_name: Option<String>,
    mobile_number: Option<String>,
    email: Option<String>,
    amount_minor_units: i64,
    status: String,
    platform: String,
    request_payload: Option<serde_json::Value>,
    provider_response: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let status = self.status.parse().map_err(StoreError::Database)?;
        let platform = self.platform.parse().map_err(StoreError::Database)?;

        Ok(Transaction {
            transaction_id: self.transaction_id,
            subject_id: self.subject_id,
            amount_minor_units: self.amount_minor_units,
            status,
            platform,
            contact: PayerContact {
                name: self.payer_name,
                mobile_number: self.mobile_number,
                email: self.email,
            },
            request_payload: self.request_payload,
            provider_response: self.provider_response,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
