//! Payment transaction state machine.
//!
//! A transaction starts `pending` and is settled exactly once, to `success` or
//! `failed`, by whichever of the provider callback, the user's status poll or the
//! pending sweep reaches [`TransactionStore::update_status_if_pending`] first.
//! The losers observe a terminal-state conflict, which is a normal outcome: they
//! only refresh the audit copy of the provider response and read back the
//! settled status.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::RedirectTargets;
use crate::domain::{PayerContact, Platform, Transaction, TransactionStatus};
use crate::gateway::checksum::{ChecksumSigner, ChecksumTarget};
use crate::gateway::client::{GatewayError, SessionRequest};
use crate::gateway::models::{CallbackEnvelope, PaymentOutcome};
use crate::ports::{PaymentGateway, StatusUpdate, StoreError, TransactionStore};

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error("Payment initiation failed for {transaction_id}: {source}")]
    InitiationFailed {
        transaction_id: String,
        #[source]
        source: GatewayError,
    },

    #[error("Transaction {0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Amount mismatch for {transaction_id}: expected {expected}, provider reported {reported}")]
    AmountMismatch {
        transaction_id: String,
        expected: i64,
        reported: i64,
    },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PaymentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => PaymentError::NotFound(id),
            other => PaymentError::Store(other),
        }
    }
}

/// Input for starting a hosted-checkout payment.
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub subject_id: String,
    pub amount_minor_units: i64,
    pub platform: Platform,
    pub contact: PayerContact,
}

#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub transaction_id: String,
    pub checkout_url: String,
}

/// What a verified callback did to the record.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Settled(Transaction),
    AlreadySettled(Transaction),
    StillPending(String),
}

/// Result of asking the provider about one transaction.
#[derive(Debug)]
pub enum PollResult {
    Settled(StatusUpdate),
    StillPending,
    Unavailable(GatewayError),
    /// The provider reported success for a different amount; left `pending`.
    AmountMismatch { expected: i64, reported: i64 },
}

/// Where to send the user after a status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRedirect {
    pub status: TransactionStatus,
    pub platform: Platform,
    pub location: String,
}

pub struct PaymentOrchestrator {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    signer: ChecksumSigner,
    redirects: RedirectTargets,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        signer: ChecksumSigner,
        redirects: RedirectTargets,
    ) -> Self {
        Self {
            store,
            gateway,
            signer,
            redirects,
        }
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Persists a `pending` record, then opens the provider checkout session.
    ///
    /// If the provider call fails the record stays `pending` and is left to the
    /// status poll or the pending sweep.
    pub async fn initiate(&self, input: InitiatePayment) -> Result<InitiatedPayment, PaymentError> {
        if input.subject_id.trim().is_empty() {
            return Err(PaymentError::Validation("userId is required".to_string()));
        }
        if input.amount_minor_units <= 0 {
            return Err(PaymentError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }

        let mut tx = Transaction::new(
            input.subject_id,
            input.amount_minor_units,
            input.platform,
            input.contact,
        );
        let session = SessionRequest {
            transaction_id: tx.transaction_id.clone(),
            subject_id: tx.subject_id.clone(),
            amount_minor_units: tx.amount_minor_units,
            mobile_number: tx.contact.mobile_number.clone(),
            platform: tx.platform,
        };
        tx.request_payload = serde_json::to_value(&session).ok();

        let tx = self.store.create(&tx).await?;
        tracing::info!(
            transaction_id = %tx.transaction_id,
            subject_id = %tx.subject_id,
            amount_minor_units = tx.amount_minor_units,
            platform = %tx.platform,
            "Payment initiated"
        );

        match self.gateway.create_session(&session).await {
            Ok(checkout_url) => Ok(InitiatedPayment {
                transaction_id: tx.transaction_id,
                checkout_url,
            }),
            Err(e) => {
                tracing::error!(
                    transaction_id = %tx.transaction_id,
                    error = %e,
                    "Checkout session creation failed; transaction left pending"
                );
                Err(PaymentError::InitiationFailed {
                    transaction_id: tx.transaction_id,
                    source: e,
                })
            }
        }
    }

    /// Verifies and applies a provider callback.
    ///
    /// Nothing is read from the payload before its signature checks out.
    pub async fn handle_callback(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackOutcome, PaymentError> {
        let envelope: CallbackEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::MalformedCallback(e.to_string()))?;

        let target = ChecksumTarget::Callback {
            encoded_response: &envelope.response,
        };
        let verified = signature.is_some_and(|sig| self.signer.verify(sig, &target));
        if !verified {
            tracing::warn!(
                security_event = true,
                signature_present = signature.is_some(),
                "Rejected payment callback with invalid checksum"
            );
            return Err(PaymentError::InvalidSignature);
        }

        let decoded = BASE64
            .decode(envelope.response.trim())
            .map_err(|e| PaymentError::MalformedCallback(e.to_string()))?;
        let raw: serde_json::Value = serde_json::from_slice(&decoded)
            .map_err(|e| PaymentError::MalformedCallback(e.to_string()))?;
        let outcome = PaymentOutcome::deserialize(&raw)
            .map_err(|e| PaymentError::MalformedCallback(e.to_string()))?;
        let transaction_id = outcome
            .merchant_transaction_id()
            .ok_or_else(|| {
                PaymentError::MalformedCallback("missing merchantTransactionId".to_string())
            })?
            .to_string();

        match self.check_amount(&transaction_id, &outcome).await {
            Ok(()) => {}
            Err(e @ PaymentError::AmountMismatch { .. }) => {
                self.store
                    .record_provider_response(&transaction_id, raw)
                    .await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        match outcome.settled_status() {
            Some(status) => match self.settle(&transaction_id, status, raw).await? {
                StatusUpdate::Applied(tx) => Ok(CallbackOutcome::Settled(tx)),
                StatusUpdate::TerminalStateConflict(tx) => Ok(CallbackOutcome::AlreadySettled(tx)),
            },
            None => {
                self.store
                    .record_provider_response(&transaction_id, raw)
                    .await?;
                tracing::info!(transaction_id = %transaction_id, "Callback reports payment still pending");
                Ok(CallbackOutcome::StillPending(transaction_id))
            }
        }
    }

    /// Polls the provider and decides the user's redirect from the stored status.
    ///
    /// Never fails. Anything short of a settled success ends on the platform's
    /// failure page.
    pub async fn handle_status_query(
        &self,
        transaction_id: &str,
        requested_platform: Option<Platform>,
    ) -> StatusRedirect {
        let fallback_platform = requested_platform.unwrap_or_default();

        let record = match self.store.find_by_id(transaction_id).await {
            Ok(tx) => tx,
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(transaction_id = %transaction_id, "Status query for unknown transaction");
                return self.redirect(TransactionStatus::Failed, fallback_platform);
            }
            Err(e) => {
                tracing::error!(transaction_id = %transaction_id, error = %e, "Status query lookup failed");
                return self.redirect(TransactionStatus::Pending, fallback_platform);
            }
        };

        if let Some(requested) = requested_platform {
            if requested != record.platform {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    requested = %requested,
                    stored = %record.platform,
                    "Status query platform differs from the stored platform"
                );
            }
        }

        let current = match self.poll(transaction_id).await {
            Ok(PollResult::Settled(update)) => update.into_transaction(),
            Ok(PollResult::StillPending)
            | Ok(PollResult::Unavailable(_))
            | Ok(PollResult::AmountMismatch { .. }) => {
                // A callback may have settled the record while the poll was in flight.
                self.store.find_by_id(transaction_id).await.unwrap_or(record)
            }
            Err(e) => {
                tracing::error!(transaction_id = %transaction_id, error = %e, "Status reconciliation failed");
                record
            }
        };

        tracing::info!(
            transaction_id = %transaction_id,
            status = %current.status,
            platform = %current.platform,
            "Redirecting after status query"
        );
        self.redirect(current.status, current.platform)
    }

    /// Asks the provider for the transaction's outcome and applies it if settled.
    ///
    /// Gateway failures are reported as [`PollResult::Unavailable`]; absence of
    /// information never changes the status.
    pub async fn poll(&self, transaction_id: &str) -> Result<PollResult, PaymentError> {
        let report = match self.gateway.query_status(transaction_id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(transaction_id = %transaction_id, error = %e, "Status query to gateway failed");
                return Ok(PollResult::Unavailable(e));
            }
        };

        match self.check_amount(transaction_id, &report.outcome).await {
            Ok(()) => {}
            Err(PaymentError::AmountMismatch {
                expected, reported, ..
            }) => {
                self.store
                    .record_provider_response(transaction_id, report.raw)
                    .await?;
                return Ok(PollResult::AmountMismatch { expected, reported });
            }
            Err(e) => return Err(e),
        }

        match report.outcome.settled_status() {
            Some(status) => {
                let update = self.settle(transaction_id, status, report.raw).await?;
                Ok(PollResult::Settled(update))
            }
            None => {
                self.store
                    .record_provider_response(transaction_id, report.raw)
                    .await?;
                Ok(PollResult::StillPending)
            }
        }
    }

    /// Fails a transaction the provider still reports as pending past its
    /// deadline. A no-op if it already settled.
    pub async fn expire(&self, transaction_id: &str) -> Result<StatusUpdate, PaymentError> {
        let response = json!({ "reason": "expired" });
        self.settle(transaction_id, TransactionStatus::Failed, response)
            .await
    }

    pub async fn transaction(&self, transaction_id: &str) -> Result<Transaction, PaymentError> {
        Ok(self.store.find_by_id(transaction_id).await?)
    }

    /// Refuses a `success` whose reported amount differs from the stored one.
    async fn check_amount(
        &self,
        transaction_id: &str,
        outcome: &PaymentOutcome,
    ) -> Result<(), PaymentError> {
        if outcome.settled_status() != Some(TransactionStatus::Success) {
            return Ok(());
        }
        let Some(reported) = outcome.reported_amount() else {
            return Ok(());
        };

        let stored = self.store.find_by_id(transaction_id).await?;
        if reported == stored.amount_minor_units {
            return Ok(());
        }

        tracing::warn!(
            security_event = true,
            transaction_id = %transaction_id,
            expected = stored.amount_minor_units,
            reported,
            "Provider reported success for a different amount; transaction left pending"
        );
        Err(PaymentError::AmountMismatch {
            transaction_id: transaction_id.to_string(),
            expected: stored.amount_minor_units,
            reported,
        })
    }

    async fn settle(
        &self,
        transaction_id: &str,
        status: TransactionStatus,
        provider_response: serde_json::Value,
    ) -> Result<StatusUpdate, PaymentError> {
        let update = self
            .store
            .update_status_if_pending(transaction_id, status, provider_response.clone())
            .await?;

        match &update {
            StatusUpdate::Applied(tx) => {
                tracing::info!(
                    transaction_id = %transaction_id,
                    status = %tx.status,
                    "Payment settled"
                );
            }
            StatusUpdate::TerminalStateConflict(tx) => {
                tracing::debug!(
                    transaction_id = %transaction_id,
                    stored = %tx.status,
                    incoming = %status,
                    "Transaction already settled; keeping stored status"
                );
                if let Err(e) = self
                    .store
                    .record_provider_response(transaction_id, provider_response)
                    .await
                {
                    tracing::warn!(transaction_id = %transaction_id, error = %e, "Failed to record provider response");
                }
            }
        }

        Ok(update)
    }

    pub fn redirect(&self, status: TransactionStatus, platform: Platform) -> StatusRedirect {
        StatusRedirect {
            status,
            platform,
            location: self.redirects.target(status, platform).to_string(),
        }
    }
}
