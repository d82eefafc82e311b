//! Remediation rules for `400 Bad Request` bodies.
//!
//! The Portal reports client errors as free text only; there is no structured
//! error code to branch on. Each rule recognises one wording and turns it into
//! a [`ClientErrorKind`] plus field-specific suggestions. When the upstream
//! wording changes, matching silently falls back to the generic suggestions,
//! so new wordings are added here without touching transport or retry code.

use regex::Regex;

use super::ClientErrorKind;

/// Placeholder replaced by the captured field name in suggestion templates
const FIELD_PLACEHOLDER: &str = "{field}";

/// One recognised error wording
#[derive(Debug, Clone)]
pub struct RemediationRule {
    pub name: &'static str,
    /// Matched case-insensitively against the body; capture group 1, if any, is the offending field
    pub pattern: Regex,
    pub kind: ClientErrorKind,
    /// Field to report when the pattern has no capture
    pub default_field: Option<&'static str>,
    /// Templates; `{field}` is replaced by the offending field
    pub suggestions: Vec<String>,
}

/// Result of matching a body against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub rule: &'static str,
    pub kind: ClientErrorKind,
    pub field: Option<String>,
    pub suggestions: Vec<String>,
}

impl RemediationRule {
    /// # Panics
    /// If `pattern` is not a valid regex; rules are authored in code.
    pub fn new(name: &'static str, pattern: &str, kind: ClientErrorKind, suggestions: &[&str]) -> Self {
        #[allow(clippy::expect_used)]
        let pattern = Regex::new(&format!("(?i){}", pattern)).expect("remediation pattern must be a valid regex");
        Self {
            name,
            pattern,
            kind,
            default_field: None,
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_default_field(mut self, field: &'static str) -> Self {
        self.default_field = Some(field);
        self
    }

    fn apply(&self, body: &str) -> Option<Remediation> {
        let captures = self.pattern.captures(body)?;
        let field = captures
            .get(1)
            .map(|m| m.as_str().to_string())
            .or_else(|| self.default_field.map(str::to_string));
        let rendered = field.as_deref().unwrap_or("the field");

        Some(Remediation {
            rule: self.name,
            kind: self.kind,
            suggestions: self.suggestions.iter().map(|s| s.replace(FIELD_PLACEHOLDER, rendered)).collect(),
            field,
        })
    }
}

/// Ordered rule table; the first matching rule wins
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<RemediationRule>,
    fallback: Vec<String>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            rules: vec![
                RemediationRule::new(
                    "unknown_field",
                    r#"unknown field\s*[`'"]?([A-Za-z0-9_]+)?"#,
                    ClientErrorKind::UnknownField,
                    &[
                        "Remove or rename the unsupported field `{field}`",
                        "Check the field names supported by this dataset type (evm or solana)",
                    ],
                ),
                RemediationRule::new(
                    "missing_field",
                    r#"missing field\s*[`'"]?([A-Za-z0-9_]+)?"#,
                    ClientErrorKind::MissingField,
                    &["Add the required field `{field}` to the query", "Check the query schema for mandatory fields"],
                ),
                RemediationRule::new(
                    "to_block",
                    r"\btoBlock\b",
                    ClientErrorKind::InvalidBlockRange,
                    &[
                        "Make sure {field} is not before fromBlock",
                        "Make sure {field} does not exceed the current dataset head",
                    ],
                )
                .with_default_field("toBlock"),
                RemediationRule::new(
                    "from_block",
                    r"\bfromBlock\b",
                    ClientErrorKind::InvalidBlockRange,
                    &[
                        "Make sure {field} is a non-negative integer at or after the dataset start block",
                        "Fetch the dataset metadata to find its start block",
                    ],
                )
                .with_default_field("fromBlock"),
                RemediationRule::new(
                    "invalid_address",
                    r"invalid address",
                    ClientErrorKind::InvalidAddress,
                    &[
                        "Addresses must be 0x-prefixed, 40 hex characters long",
                        "Use lowercase hex for addresses",
                    ],
                ),
                RemediationRule::new(
                    "invalid_topic",
                    r"invalid topic",
                    ClientErrorKind::InvalidTopic,
                    &[
                        "Topics must be 0x-prefixed 32-byte hex strings (66 characters)",
                        "Use lowercase hex for topics",
                    ],
                ),
            ],
            fallback: vec![
                "Check the query body against the Portal query schema".to_string(),
                "Verify field names, value types and block numbers".to_string(),
            ],
        }
    }
}

impl RuleTable {
    /// Empty table that only ever yields the fallback suggestions
    pub fn empty() -> Self {
        Self { rules: Vec::new(), fallback: RuleTable::default().fallback }
    }

    /// Append a rule; it is consulted after the existing ones
    pub fn with_rule(mut self, rule: RemediationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[RemediationRule] {
        &self.rules
    }

    /// Match `body` against the table, falling back to generic suggestions
    pub fn remediate(&self, body: &str) -> Remediation {
        self.rules.iter().find_map(|rule| rule.apply(body)).unwrap_or_else(|| Remediation {
            rule: "generic",
            kind: ClientErrorKind::Generic,
            field: None,
            suggestions: self.fallback.clone(),
        })
    }
}
