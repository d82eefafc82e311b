use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum_macros::{Display, EnumString};

use super::ValidatedRange;
use crate::guard::QuerySizeDecision;

/// Filter keys that narrow a query down to a subset of the chain's data
const NARROWING_FILTER_KEYS: &[&str] = &[
    "address",
    "topic0",
    "topic1",
    "topic2",
    "topic3",
    "from",
    "to",
    "sighash",
    "callTo",
    "callFrom",
    "callSighash",
    "key",
];

/// Dataset family, sent as the `type` field of a stream request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChainType {
    #[default]
    Evm,
    Solana,
}

/// Query category, which governs the size thresholds applied to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryCategory {
    Logs,
    Transactions,
    Traces,
    StateDiffs,
}

impl QueryCategory {
    /// Key of the request-item array in the stream request body
    pub fn body_key(&self) -> &'static str {
        match self {
            QueryCategory::Logs => "logs",
            QueryCategory::Transactions => "transactions",
            QueryCategory::Traces => "traces",
            QueryCategory::StateDiffs => "stateDiffs",
        }
    }

    /// Filter fields worth adding when an unfiltered query is too wide
    pub fn suggested_filters(&self) -> &'static [&'static str] {
        match self {
            QueryCategory::Logs => &["addresses", "topic0"],
            QueryCategory::Transactions => &["from", "to", "sighash"],
            QueryCategory::Traces => &["callTo", "callFrom", "callSighash"],
            QueryCategory::StateDiffs => &["address", "key"],
        }
    }
}

/// A streaming data query against one dataset
#[derive(Debug, Clone)]
pub struct StreamQuery {
    pub dataset: String,
    pub chain_type: ChainType,
    pub category: QueryCategory,
    pub from_block: u64,
    /// `None` streams up to the governing head
    pub to_block: Option<u64>,
    /// Field selection, sent verbatim as `fields`
    pub fields: Value,
    /// Request items for the category, e.g. `[{"address": [...], "topic0": [...]}]`
    pub filters: Vec<Value>,
    pub finalized_only: bool,
    pub result_limit: Option<u64>,
}

impl StreamQuery {
    pub fn new(dataset: impl Into<String>, category: QueryCategory, from_block: u64) -> Self {
        Self {
            dataset: dataset.into(),
            chain_type: ChainType::default(),
            category,
            from_block,
            to_block: None,
            fields: Value::Object(Map::new()),
            filters: Vec::new(),
            finalized_only: false,
            result_limit: None,
        }
    }

    pub fn with_chain_type(mut self, chain_type: ChainType) -> Self {
        self.chain_type = chain_type;
        self
    }

    pub fn with_to_block(mut self, to_block: u64) -> Self {
        self.to_block = Some(to_block);
        self
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn finalized_only(mut self, finalized_only: bool) -> Self {
        self.finalized_only = finalized_only;
        self
    }

    pub fn with_result_limit(mut self, limit: u64) -> Self {
        self.result_limit = Some(limit);
        self
    }

    /// Requested width, if the caller bounded the range
    pub fn requested_width(&self) -> Option<u64> {
        self.to_block.map(|to| to.saturating_sub(self.from_block).saturating_add(1))
    }

    /// Whether at least one request item narrows the data with a non-empty filter
    pub fn has_narrowing_filters(&self) -> bool {
        self.filters.iter().filter_map(Value::as_object).any(|item| {
            NARROWING_FILTER_KEYS.iter().any(|key| match item.get(*key) {
                Some(Value::Array(values)) => !values.is_empty(),
                Some(Value::String(value)) => !value.is_empty(),
                _ => false,
            })
        })
    }

    /// JSON body for `POST /datasets/{name}/stream` over the validated range
    pub fn to_body(&self, from_block: u64, to_block: u64) -> Value {
        // The Portal only returns category data when at least one request item is present.
        let items = if self.filters.is_empty() { vec![json!({})] } else { self.filters.clone() };

        let mut body = Map::new();
        body.insert("type".to_string(), Value::String(self.chain_type.to_string()));
        body.insert("fromBlock".to_string(), Value::from(from_block));
        body.insert("toBlock".to_string(), Value::from(to_block));
        body.insert("fields".to_string(), self.fields.clone());
        body.insert(self.category.body_key().to_string(), Value::Array(items));
        Value::Object(body)
    }
}

/// Records returned by a streaming query, with the admission checks that governed it
#[derive(Debug, Clone)]
pub struct StreamResult {
    /// Canonical name of the dataset that was queried
    pub dataset: String,
    pub records: Vec<Value>,
    pub range: ValidatedRange,
    pub decision: QuerySizeDecision,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn category_round_trips_through_strum() {
        assert_eq!(QueryCategory::from_str("state_diffs").unwrap(), QueryCategory::StateDiffs);
        assert_eq!(QueryCategory::Logs.to_string(), "logs");
        assert_eq!(ChainType::Solana.to_string(), "solana");
    }

    #[test]
    fn empty_filter_arrays_do_not_narrow() {
        let query = StreamQuery::new("ethereum-mainnet", QueryCategory::Logs, 0)
            .with_filter(json!({ "address": [], "transaction": true }));
        assert!(!query.has_narrowing_filters());

        let query = query.with_filter(json!({ "topic0": ["0xddf252ad"] }));
        assert!(query.has_narrowing_filters());
    }

    #[test]
    fn body_uses_validated_range_and_category_key() {
        let query = StreamQuery::new("base-mainnet", QueryCategory::StateDiffs, 10)
            .with_to_block(99_999)
            .with_fields(json!({ "stateDiff": { "address": true } }));

        let body = query.to_body(10, 50);
        assert_eq!(body["type"], "evm");
        assert_eq!(body["fromBlock"], 10);
        assert_eq!(body["toBlock"], 50);
        assert_eq!(body["stateDiffs"], json!([{}]));
        assert_eq!(body["fields"]["stateDiff"]["address"], true);
    }

    #[test]
    fn requested_width_is_inclusive() {
        let query = StreamQuery::new("ethereum-mainnet", QueryCategory::Logs, 100).with_to_block(199);
        assert_eq!(query.requested_width(), Some(100));
        assert_eq!(StreamQuery::new("ethereum-mainnet", QueryCategory::Logs, 100).requested_width(), None);

        let everything = StreamQuery::new("ethereum-mainnet", QueryCategory::Logs, 0).with_to_block(u64::MAX);
        assert_eq!(everything.requested_width(), Some(u64::MAX));
    }
}
