//! Retry primitives shared by every Portal client call.
//!
//! A logical request is driven as an explicit loop of attempts. Each attempt
//! reports an [`AttemptOutcome`]: it either produced a value, failed in a way
//! that a later attempt may fix, or failed in a way no retry can fix. The
//! driver owns the decision to continue or stop, so "this attempt failed" is
//! never confused with "the whole operation failed".
//!
//! # Example
//!
//! ```rust,ignore
//! use portal_resilience::{retry_with_backoff, AttemptOutcome, RetryConfig};
//!
//! let output = retry_with_backoff(&RetryConfig::default(), "list_datasets", |attempt| async move {
//!     match fetch().await {
//!         Ok(value) => AttemptOutcome::Success(value),
//!         Err(e) if e.is_transient() => AttemptOutcome::Retryable { error: e, retry_after: None },
//!         Err(e) => AttemptOutcome::Fatal(e),
//!     }
//! })
//! .await;
//! ```
pub mod retry;

pub use retry::{retry_with_backoff, AttemptOutcome, RetryConfig, RetryOutput, RetryState};
