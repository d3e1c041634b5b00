//! Wire types for the PhonePe pay-page API.

use serde::{Deserialize, Serialize};

use crate::domain::TransactionStatus;

/// Provider code for a payment that has not settled yet.
pub const CODE_PAYMENT_PENDING: &str = "PAYMENT_PENDING";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstrument {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Unsigned session-create payload. Sent base64 encoded inside [`PayRequestBody`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayPayload {
    pub merchant_id: String,
    pub merchant_transaction_id: String,
    pub merchant_user_id: String,
    pub amount: i64,
    pub redirect_url: String,
    pub redirect_mode: String,
    pub callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    pub payment_instrument: PaymentInstrument,
}

#[derive(Debug, Serialize)]
pub struct PayRequestBody {
    pub request: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayResponse {
    #[serde(default)]
    pub success: bool,
    pub code: Option<String>,
    pub message: Option<String>,
    pub data: Option<PayResponseData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayResponseData {
    pub merchant_transaction_id: Option<String>,
    pub instrument_response: Option<InstrumentResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentResponse {
    pub redirect_info: Option<RedirectInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedirectInfo {
    pub url: Option<String>,
}

impl PayResponse {
    pub fn checkout_url(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .instrument_response
            .as_ref()?
            .redirect_info
            .as_ref()?
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
    }
}

/// Outcome payload shared by the status endpoint and the decoded callback.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    #[serde(default)]
    pub success: bool,
    pub code: Option<String>,
    pub data: Option<PaymentOutcomeData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcomeData {
    pub merchant_transaction_id: Option<String>,
    pub transaction_id: Option<String>,
    pub amount: Option<i64>,
    pub state: Option<String>,
}

impl PaymentOutcome {
    /// Terminal status implied by the provider, or `None` while still pending.
    pub fn settled_status(&self) -> Option<TransactionStatus> {
        if self.code.as_deref() == Some(CODE_PAYMENT_PENDING) {
            return None;
        }
        if self.success {
            Some(TransactionStatus::Success)
        } else {
            Some(TransactionStatus::Failed)
        }
    }

    pub fn merchant_transaction_id(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .merchant_transaction_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Amount the provider says was paid, in minor units.
    pub fn reported_amount(&self) -> Option<i64> {
        self.data.as_ref()?.amount
    }
}

/// Result of a status poll: the decoded outcome plus the raw body kept for audit.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub outcome: PaymentOutcome,
    pub raw: serde_json::Value,
}

/// Body of the provider's server-to-server callback.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    pub response: String,
}
