pub mod amount;
pub mod transaction;

pub use amount::to_minor_units;
pub use transaction::{PayerContact, Platform, Transaction, TransactionStatus};
