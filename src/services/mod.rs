pub mod orchestrator;
pub mod sweeper;

pub use orchestrator::{PaymentError, PaymentOrchestrator};
pub use sweeper::{run_sweeper, sweep_once, SweepReport};
