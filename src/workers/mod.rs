//! Background workers.
//!
//! Each worker exposes `run_once` for deterministic testing and `spawn`
//! for production, where it runs on a tokio interval. Workers never fail
//! a sweep because of a single bad item: per-item errors are counted and
//! the sweep continues.

pub mod agreement;
pub mod retention;
pub mod timeout;

pub use agreement::{AgreementRecomputeWorker, EnqueueOutcome, RecomputeReport};
pub use retention::{RetentionReport, RetentionWorker, RetentionWorkerConfig};
pub use timeout::{TimeoutSweepReport, TimeoutWorker, TimeoutWorkerConfig};
