//! Request/response integrity checksums for the PhonePe hosted-checkout protocol.
//!
//! Every signed message is reduced to a canonical string (see [`ChecksumTarget`]),
//! the merchant secret is appended, and the SHA-256 digest is hex encoded and
//! suffixed with `###<key index>`.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

const KEY_INDEX_SEPARATOR: &str = "###";
const PAY_PATH: &str = "/pg/v1/pay";
const STATUS_PATH: &str = "/pg/v1/status";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("checksum is missing the key index separator")]
    MissingSeparator,
    #[error("checksum key index '{0}' is not a number")]
    InvalidKeyIndex(String),
    #[error("checksum digest is not valid hex")]
    InvalidDigest,
}

/// Which message is being signed. Each endpoint has its own canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumTarget<'a> {
    /// Session create: base64 request body followed by the pay path.
    PayRequest { encoded_payload: &'a str },
    /// Status query: the status path for this merchant and transaction.
    StatusQuery {
        merchant_id: &'a str,
        transaction_id: &'a str,
    },
    /// Server callback: the base64 `response` field, no path suffix.
    Callback { encoded_response: &'a str },
}

impl ChecksumTarget<'_> {
    pub fn canonicalize(&self) -> String {
        match self {
            ChecksumTarget::PayRequest { encoded_payload } => {
                format!("{}{}", encoded_payload, PAY_PATH)
            }
            ChecksumTarget::StatusQuery {
                merchant_id,
                transaction_id,
            } => format!("{}/{}/{}", STATUS_PATH, merchant_id, transaction_id),
            ChecksumTarget::Callback { encoded_response } => encoded_response.to_string(),
        }
    }
}

/// Signs outbound requests and verifies inbound callbacks for one merchant key.
#[derive(Clone)]
pub struct ChecksumSigner {
    secret: String,
    key_index: u32,
}

impl std::fmt::Debug for ChecksumSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumSigner")
            .field("secret", &"****")
            .field("key_index", &self.key_index)
            .finish()
    }
}

impl ChecksumSigner {
    pub fn new(secret: impl Into<String>, key_index: u32) -> Self {
        Self {
            secret: secret.into(),
            key_index,
        }
    }

    pub fn sign(&self, target: &ChecksumTarget<'_>) -> String {
        format!(
            "{}{}{}",
            self.digest_hex(target),
            KEY_INDEX_SEPARATOR,
            self.key_index
        )
    }

    /// Returns `true` only when both the digest and the key index match.
    pub fn verify(&self, received: &str, target: &ChecksumTarget<'_>) -> bool {
        match self.check(received, target) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable checksum");
                false
            }
        }
    }

    fn check(&self, received: &str, target: &ChecksumTarget<'_>) -> Result<bool, ChecksumError> {
        let (digest, key_index) = split_checksum(received)?;
        if key_index != self.key_index {
            return Ok(false);
        }

        let received_digest =
            hex::decode(digest.trim()).map_err(|_| ChecksumError::InvalidDigest)?;
        let expected_digest = self.digest(target);

        Ok(received_digest.ct_eq(expected_digest.as_slice()).into())
    }

    fn digest(&self, target: &ChecksumTarget<'_>) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(target.canonicalize().as_bytes());
        hasher.update(self.secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn digest_hex(&self, target: &ChecksumTarget<'_>) -> String {
        hex::encode(self.digest(target))
    }
}

/// Splits `<digest>###<key index>` on the last separator.
pub fn split_checksum(value: &str) -> Result<(&str, u32), ChecksumError> {
    let (digest, index) = value
        .rsplit_once(KEY_INDEX_SEPARATOR)
        .ok_or(ChecksumError::MissingSeparator)?;
    let key_index = index
        .trim()
        .parse::<u32>()
        .map_err(|_| ChecksumError::InvalidKeyIndex(index.to_string()))?;
    Ok((digest, key_index))
}
