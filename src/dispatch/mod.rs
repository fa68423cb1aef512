//! Assignment dispatching: the two-phase lease protocol.
//!
//! `fetch_next` builds the eligible candidate set, lets the queue's policy
//! choose, and reserves under the store's optimistic lock; `submit_label`
//! validates and lands the label, the schema-version freeze, and the
//! assignment completion in one store transaction.

pub mod dispatcher;

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::policy::PolicyError;
use crate::store::StoreError;
use crate::tenant::AccessError;
use crate::validation::FieldError;

pub use dispatcher::{Dispatcher, DispatcherConfig};

/// Dispatch errors, the vocabulary of the leasing and submission
/// endpoints.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Nothing eligible for this labeler right now. Also the terminal
    /// outcome of losing every optimistic-lock retry.
    #[error("no samples available")]
    NoSamples,

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The reservation deadline has passed.
    #[error("assignment has expired")]
    Expired,

    /// This labeler already labeled this assignment.
    #[error("duplicate label")]
    DuplicateLabel,

    #[error("resource not found: {0}")]
    NotFound(String),

    /// Payload validation failed; carries the complete per-field list.
    #[error("invalid payload ({} error(s))", .0.len())]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Forge could not be reached while resolving sample content.
    #[error("forge unavailable")]
    ForgeUnavailable,

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DispatchError::NotFound(id),
            StoreError::DuplicateLabel { .. } => DispatchError::DuplicateLabel,
            other => DispatchError::Store(other),
        }
    }
}

impl From<BridgeError> for DispatchError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotFound(id) => DispatchError::NotFound(id),
            // Breaker and transport failures all read as Forge being down.
            _ => DispatchError::ForgeUnavailable,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
