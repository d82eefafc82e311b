use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use httpmock::prelude::*;

use super::common::{mock_chain, test_client};
use crate::error::{PortalError, ValidationError};
use crate::guard::QueryLimits;
use crate::registry::DatasetRegistry;
use crate::types::{LatencyBand, QueryCategory};
use crate::validation::{BlockRangeValidator, RangeHint};

const DATASET: &str = "ethereum-mainnet";

fn validator(server: &MockServer) -> BlockRangeValidator {
    let registry = Arc::new(DatasetRegistry::new(test_client(server), Duration::from_secs(300)));
    BlockRangeValidator::new(registry, QueryLimits::default())
}

#[tokio::test]
async fn from_block_before_start_is_rejected() {
    let server = MockServer::start_async().await;
    mock_chain(&server, DATASET, 1_000, 20_000, None).await;

    let err = validator(&server).validate(DATASET, 999, Some(1_500), false, None).await.unwrap_err();

    assert_matches!(
        err,
        PortalError::Validation(ValidationError::BeforeStartBlock { from_block: 999, start_block: 1_000, .. })
    );
}

#[tokio::test]
async fn from_block_after_head_is_rejected() {
    let server = MockServer::start_async().await;
    mock_chain(&server, DATASET, 0, 20_000, None).await;

    let err = validator(&server).validate(DATASET, 20_001, None, false, None).await.unwrap_err();

    assert_matches!(
        err,
        PortalError::Validation(ValidationError::AfterHead { max_block: 20_000, finalized: false, .. })
    );
}

#[tokio::test]
async fn to_block_is_clamped_to_head_and_clamping_is_a_fixed_point() {
    let server = MockServer::start_async().await;
    mock_chain(&server, DATASET, 0, 20_000, None).await;
    let validator = validator(&server);

    let first = validator.validate(DATASET, 19_000, Some(1_000_000), false, None).await.unwrap();
    assert_eq!(first.to_block, 20_000);
    assert_eq!(first.head.number, 20_000);
    assert!(!first.finalized);

    let second = validator.validate(DATASET, 19_000, Some(first.to_block), false, None).await.unwrap();
    assert_eq!(second.to_block, first.to_block);

    let open = validator.validate(DATASET, 19_000, None, false, None).await.unwrap();
    assert_eq!(open.to_block, 20_000);
    assert_eq!(open.width(), 1_001);
}

#[tokio::test]
async fn finalized_head_governs_when_requested_and_present() {
    let server = MockServer::start_async().await;
    let chain = mock_chain(&server, DATASET, 0, 20_000, Some(19_936)).await;
    let validator = validator(&server);

    let range = validator.validate(DATASET, 19_900, None, true, None).await.unwrap();
    assert_eq!(range.to_block, 19_936);
    assert_eq!(range.head.number, 19_936);
    assert!(range.finalized);

    let err = validator.validate(DATASET, 19_950, None, true, None).await.unwrap_err();
    assert_matches!(
        err,
        PortalError::Validation(ValidationError::AfterHead { max_block: 19_936, finalized: true, .. })
    );

    let latest = validator.validate(DATASET, 19_950, None, false, None).await.unwrap();
    assert_eq!(latest.to_block, 20_000);
    chain.finalized_head.assert_hits_async(2).await;
}

#[tokio::test]
async fn missing_finalized_head_falls_back_to_latest() {
    let server = MockServer::start_async().await;
    mock_chain(&server, "solana-mainnet", 0, 300_000_000, None).await;

    let range = validator(&server).validate("solana-mainnet", 299_999_990, None, true, None).await.unwrap();

    assert_eq!(range.to_block, 300_000_000);
    assert_eq!(range.head.number, 300_000_000);
    assert!(!range.finalized);
}

#[tokio::test]
async fn inverted_range_never_reaches_the_network() {
    let server = MockServer::start_async().await;
    let chain = mock_chain(&server, DATASET, 0, 20_000, None).await;

    let err = validator(&server).validate(DATASET, 500, Some(100), false, None).await.unwrap_err();

    assert_matches!(err, PortalError::Validation(ValidationError::InvertedRange { from_block: 500, to_block: 100 }));
    chain.metadata.assert_hits_async(0).await;
    chain.head.assert_hits_async(0).await;
}

#[tokio::test]
async fn wide_range_carries_latency_warning() {
    let server = MockServer::start_async().await;
    mock_chain(&server, DATASET, 0, 20_000, None).await;
    let hint = RangeHint { category: QueryCategory::Transactions, has_filters: true };

    let range = validator(&server).validate(DATASET, 0, Some(19_999), false, Some(hint)).await.unwrap();

    let warning = range.warning.expect("range above recommendation should warn");
    assert_eq!(warning.width, 20_000);
    assert_eq!(warning.recommended, 5_000);
    assert_eq!(warning.latency, LatencyBand::Moderate);

    let narrow = validator(&server).validate(DATASET, 0, Some(999), false, Some(hint)).await.unwrap();
    assert!(narrow.warning.is_none());
}
