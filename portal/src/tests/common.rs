use std::time::Duration;

use httpmock::prelude::*;
use httpmock::Mock;
use portal_resilience::RetryConfig;
use serde_json::{json, Value};
use url::Url;

use crate::client::PortalHttpClient;
use crate::config::PortalParams;

/// Params pointing at `server`, with short deadlines and millisecond backoff
pub fn test_params(server: &MockServer) -> PortalParams {
    portal_utils::logging::init_logging();
    let mut params = PortalParams::new(Url::parse(&server.base_url()).unwrap());
    params.request_timeout = Duration::from_millis(300);
    params.stream_timeout = Duration::from_millis(300);
    params.retry = RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        ..Default::default()
    };
    params
}

pub fn test_client(server: &MockServer) -> PortalHttpClient {
    PortalHttpClient::new(&test_params(server)).unwrap()
}

pub fn datasets_listing() -> Value {
    json!([
        { "dataset": "ethereum-mainnet", "aliases": ["ethereum", "eth"], "real_time": true },
        { "dataset": "ethereum-sepolia", "aliases": [], "real_time": true },
        { "dataset": "base-mainnet", "aliases": ["base"], "real_time": false },
        { "dataset": "solana-mainnet", "aliases": ["solana"], "real_time": true }
    ])
}

pub async fn mock_datasets(server: &MockServer) -> Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/datasets");
            then.status(200).header("content-type", "application/json").json_body(datasets_listing());
        })
        .await
}

/// Chain state for one dataset: metadata, latest head and (optionally) finalized head
pub struct ChainMocks<'a> {
    pub metadata: Mock<'a>,
    pub head: Mock<'a>,
    pub finalized_head: Mock<'a>,
}

pub async fn mock_chain<'a>(
    server: &'a MockServer,
    dataset: &str,
    start_block: u64,
    head: u64,
    finalized_head: Option<u64>,
) -> ChainMocks<'a> {
    let metadata = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/datasets/{dataset}/metadata"));
            then.status(200).json_body(json!({ "dataset": dataset, "aliases": [], "real_time": true, "start_block": start_block }));
        })
        .await;

    let head_mock = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/datasets/{dataset}/head"));
            then.status(200).json_body(json!({ "number": head, "hash": format!("0x{head:064x}") }));
        })
        .await;

    let finalized_mock = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/datasets/{dataset}/finalized-head"));
            match finalized_head {
                Some(number) => {
                    then.status(200).json_body(json!({ "number": number, "hash": format!("0x{number:064x}") }));
                }
                None => {
                    then.status(204);
                }
            }
        })
        .await;

    ChainMocks { metadata, head: head_mock, finalized_head: finalized_mock }
}
