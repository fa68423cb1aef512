//! # ANVIL - Multi-tenant Human Labeling Queue Service
//!
//! Anvil distributes samples to human annotators, validates their labels
//! against versioned schemas, enforces reservation deadlines and
//! redundancy targets, computes inter-rater agreement, and emits
//! immutable, reproducible export artifacts. Sample content lives in the
//! external Forge store; Anvil holds references and leases.
//!
//! ## Architecture
//!
//! - `core`: injectable clock and pluggable telemetry sink
//! - `model`: tenant-scoped domain entities and the assignment status
//!   machine
//! - `store`: persistence contract with optimistic locking, plus the
//!   in-memory backend
//! - `bridge`: Forge access (direct / HTTP-with-circuit-breaker / cached)
//! - `validation`: payload validation, version freezing, migrations
//! - `policy`: pluggable sample-selection policies
//! - `dispatch`: the lease protocol and label submission
//! - `agreement`: Cohen / Fleiss / Krippendorff agreement math
//! - `export`: deterministic streaming exports with manifests
//! - `privacy`: redaction, pseudonyms, retention math, signed URLs
//! - `tenant`: isolation guards and the role lattice
//! - `workers`: timeout, agreement-recompute, and retention sweeps
//! - `api`: the `/v1` axum surface

#![warn(clippy::all)]

pub mod agreement;
pub mod api;
pub mod bridge;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod export;
pub mod model;
pub mod policy;
pub mod privacy;
pub mod store;
pub mod tenant;
pub mod validation;
pub mod workers;

// Re-export the types most integrations touch.
pub use config::{BridgeBackend, ServiceConfig};
pub use dispatch::{DispatchError, Dispatcher, DispatcherConfig};
pub use store::{MemoryStore, Store, StoreError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
