#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use carepay_core::adapters::InMemoryTransactionStore;
use carepay_core::config::RedirectTargets;
use carepay_core::gateway::{
    ChecksumSigner, ChecksumTarget, GatewayError, PaymentOutcome, SessionRequest, StatusReport,
};
use carepay_core::ports::PaymentGateway;
use carepay_core::services::PaymentOrchestrator;
use serde::Deserialize;
use serde_json::{json, Value};

pub const MERCHANT_KEY: &str = "099eb0cd-02cf-4e2a-8aca-3e6c6aff0399";
pub const KEY_INDEX: u32 = 1;

pub const WEB_SUCCESS: &str = "https://www.example.com/subscription/success";
pub const WEB_FAILURE: &str = "https://www.example.com/subscription/failure";
pub const MOBILE_SUCCESS: &str = "carepay://payment/success";
pub const MOBILE_FAILURE: &str = "carepay://payment/failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderReply {
    Success,
    Failed,
    Pending,
    Timeout,
}

/// Scriptable stand-in for the payment provider.
pub struct FakeGateway {
    checkout_fails: AtomicBool,
    default_reply: Mutex<ProviderReply>,
    replies: Mutex<HashMap<String, ProviderReply>>,
    pub sessions: Mutex<Vec<SessionRequest>>,
    pub status_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            checkout_fails: AtomicBool::new(false),
            default_reply: Mutex::new(ProviderReply::Pending),
            replies: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_checkout(&self) {
        self.checkout_fails.store(true, Ordering::SeqCst);
    }

    pub fn reply_with(&self, transaction_id: &str, reply: ProviderReply) {
        self.replies
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), reply);
    }

    pub fn reply_to_all(&self, reply: ProviderReply) {
        *self.default_reply.lock().unwrap() = reply;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn last_session(&self) -> Option<SessionRequest> {
        self.sessions.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError> {
        self.sessions.lock().unwrap().push(request.clone());
        if self.checkout_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        Ok(format!(
            "https://mercury-uat.phonepe.com/transact/{}",
            request.transaction_id
        ))
    }

    async fn query_status(&self, transaction_id: &str) -> Result<StatusReport, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(transaction_id)
            .copied()
            .unwrap_or(*self.default_reply.lock().unwrap());

        let raw = match reply {
            ProviderReply::Success => provider_outcome(transaction_id, true, "PAYMENT_SUCCESS"),
            ProviderReply::Failed => provider_outcome(transaction_id, false, "PAYMENT_ERROR"),
            ProviderReply::Pending => provider_outcome(transaction_id, true, "PAYMENT_PENDING"),
            ProviderReply::Timeout => return Err(GatewayError::Timeout),
        };
        let outcome = PaymentOutcome::deserialize(&raw)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(StatusReport { outcome, raw })
    }
}

pub fn provider_outcome(transaction_id: &str, success: bool, code: &str) -> Value {
    json!({
        "success": success,
        "code": code,
        "message": "Your payment status",
        "data": {
            "merchantId": "MERCHANTUAT",
            "merchantTransactionId": transaction_id,
            "transactionId": "T2410161234567890",
            "amount": 50000,
            "state": if success { "COMPLETED" } else { "FAILED" }
        }
    })
}

pub fn signer() -> ChecksumSigner {
    ChecksumSigner::new(MERCHANT_KEY, KEY_INDEX)
}

/// Builds a callback body `{"response": base64}` and its valid `X-VERIFY` value.
pub fn signed_callback(outcome: &Value) -> (Vec<u8>, String) {
    let encoded = BASE64.encode(outcome.to_string());
    let checksum = signer().sign(&ChecksumTarget::Callback {
        encoded_response: &encoded,
    });
    let body = json!({ "response": encoded }).to_string().into_bytes();
    (body, checksum)
}

pub fn redirects() -> RedirectTargets {
    RedirectTargets {
        web_success: WEB_SUCCESS.to_string(),
        web_failure: WEB_FAILURE.to_string(),
        mobile_success: MOBILE_SUCCESS.to_string(),
        mobile_failure: MOBILE_FAILURE.to_string(),
    }
}

pub fn orchestrator(
    store: Arc<InMemoryTransactionStore>,
    gateway: Arc<FakeGateway>,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(store, gateway, signer(), redirects())
}
