//! Foundational service plumbing shared by every subsystem.
//!
//! - `clock`: injectable time source so reservation deadlines, retention
//!   cutoffs, and signed-URL expiry are testable
//! - `telemetry`: pluggable event sink decoupled from any observability
//!   backend

pub mod clock;
pub mod telemetry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use telemetry::{MemorySink, TelemetryEvent, TelemetrySink, TracingSink};
