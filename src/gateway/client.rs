use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::MerchantConfig;
use crate::domain::Platform;
use crate::gateway::checksum::{ChecksumSigner, ChecksumTarget};
use crate::gateway::models::{
    PayPayload, PayRequestBody, PayResponse, PaymentInstrument, PaymentOutcome, StatusReport,
};
use crate::ports::PaymentGateway;

const VERIFY_HEADER: &str = "X-VERIFY";
const MERCHANT_ID_HEADER: &str = "X-MERCHANT-ID";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(reqwest::Error),
    #[error("Gateway request timed out")]
    Timeout,
    #[error("Gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Invalid gateway configuration: {0}")]
    Configuration(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::RequestError(e)
        }
    }
}

/// Everything the provider needs to open a hosted checkout page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRequest {
    pub transaction_id: String,
    pub subject_id: String,
    pub amount_minor_units: i64,
    pub mobile_number: Option<String>,
    pub platform: Platform,
}

/// HTTP client for the PhonePe pay-page API
#[derive(Clone)]
pub struct PhonePeClient {
    client: Client,
    merchant: Arc<MerchantConfig>,
    signer: ChecksumSigner,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PhonePeClient {
    /// Creates a client that trips after 5 consecutive failures and retries after ~30s.
    pub fn new(merchant: MerchantConfig) -> Self {
        Self::with_circuit_breaker(merchant, 5, 30)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        merchant: MerchantConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(merchant.request_timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        let signer = ChecksumSigner::new(merchant.merchant_key.clone(), merchant.key_index);

        PhonePeClient {
            client,
            merchant: Arc::new(merchant),
            signer,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// Builds the unsigned session-create payload.
    pub fn pay_payload(&self, request: &SessionRequest) -> Result<PayPayload, GatewayError> {
        Ok(PayPayload {
            merchant_id: self.merchant.merchant_id.clone(),
            merchant_transaction_id: request.transaction_id.clone(),
            merchant_user_id: request.subject_id.clone(),
            amount: request.amount_minor_units,
            redirect_url: with_return_params(&self.merchant.redirect_url, request)?,
            redirect_mode: "POST".to_string(),
            callback_url: with_return_params(&self.merchant.callback_url, request)?,
            mobile_number: request.mobile_number.clone(),
            payment_instrument: PaymentInstrument {
                kind: "PAY_PAGE".to_string(),
            },
        })
    }

    fn status_endpoint(&self, transaction_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.merchant.status_url.trim_end_matches('/'),
            self.merchant.merchant_id,
            transaction_id
        )
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, GatewayError>>,
    {
        match self.circuit_breaker.call(call).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "PhonePe circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for PhonePeClient {
    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError> {
        let payload = self.pay_payload(request)?;
        let json = serde_json::to_vec(&payload)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        let encoded = BASE64.encode(json);
        let checksum = self.signer.sign(&ChecksumTarget::PayRequest {
            encoded_payload: &encoded,
        });

        let client = self.client.clone();
        let url = self.merchant.pay_url.clone();

        self.guarded(async move {
            let response = client
                .post(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .header(VERIFY_HEADER, checksum)
                .json(&PayRequestBody { request: encoded })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let pay = response.json::<PayResponse>().await?;
            if !pay.success {
                return Err(GatewayError::InvalidResponse(format!(
                    "session not created: {}",
                    pay.code.as_deref().unwrap_or("unknown code")
                )));
            }

            pay.checkout_url()
                .map(str::to_string)
                .ok_or_else(|| GatewayError::InvalidResponse("missing redirect url".to_string()))
        })
        .await
    }

    async fn query_status(&self, transaction_id: &str) -> Result<StatusReport, GatewayError> {
        let checksum = self.signer.sign(&ChecksumTarget::StatusQuery {
            merchant_id: &self.merchant.merchant_id,
            transaction_id,
        });

        let client = self.client.clone();
        let url = self.status_endpoint(transaction_id);
        let merchant_id = self.merchant.merchant_id.clone();

        self.guarded(async move {
            let response = client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .header(VERIFY_HEADER, checksum)
                .header(MERCHANT_ID_HEADER, merchant_id)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let raw = response.json::<serde_json::Value>().await?;
            let outcome = PaymentOutcome::deserialize(&raw)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

            Ok(StatusReport { outcome, raw })
        })
        .await
    }
}

fn with_return_params(base: &str, request: &SessionRequest) -> Result<String, GatewayError> {
    let mut url = Url::parse(base).map_err(|e| GatewayError::Configuration(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("id", &request.transaction_id)
        .append_pair("platform", request.platform.as_str());
    Ok(url.to_string())
}
