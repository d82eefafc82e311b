//! Resilient client for the SQD Portal API.
//!
//! Requests flow through a query-size guard, dataset resolution, block-range
//! validation and a retrying HTTP client before records are decoded:
//!
//! ```text
//! caller → QuerySizeGuard → DatasetRegistry → BlockRangeValidator → PortalHttpClient → decoder
//! ```
//!
//! Any failure along the way surfaces as one [`PortalError`] carrying
//! remediation suggestions.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod tests;

pub use cli::PortalCliArgs;
pub use client::PortalHttpClient;
pub use config::PortalParams;
pub use error::{ClassifiedError, ErrorKind, PortalError, PortalResult, ValidationError};
pub use guard::{QueryLimits, QuerySizeDecision, QuerySizeGuard, Severity};
pub use registry::DatasetRegistry;
pub use service::PortalClient;
pub use types::{BlockHead, ChainType, Dataset, DatasetMetadata, QueryCategory, StreamQuery, StreamResult, ValidatedRange};
pub use validation::{BlockRangeValidator, RangeHint};
