//! PII handling: redaction policies, labeler pseudonyms, retention math,
//! and signed asset URLs.
//!
//! Everything here is deterministic and clock-injected so exports stay
//! reproducible and the suite can pin time.

pub mod pseudonym;
pub mod redaction;
pub mod retention;
pub mod signed_url;

pub use pseudonym::{PseudonymError, PseudonymGenerator};
pub use redaction::{RedactionMode, RedactionPolicy};
pub use retention::{expiration_date, is_expired, RetentionStrategy};
pub use signed_url::{secure_compare, SignedUrlError, SignedUrlOptions};
