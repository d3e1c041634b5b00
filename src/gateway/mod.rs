pub mod checksum;
pub mod client;
pub mod models;

pub use checksum::{ChecksumSigner, ChecksumTarget};
pub use client::{GatewayError, PhonePeClient, SessionRequest};
pub use models::{PaymentOutcome, StatusReport};
