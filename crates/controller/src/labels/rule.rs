//! Frontend rule expressions
//!
//! Supported forms (one function per rule, no boolean operators):
//! - Host(`example.com`)
//! - PathPrefix(`/api`)
//! - Path(`/exact`)

use derive_more::Display;
use error_stack::Report;

use super::LabelError;

/// HAProxy ACL expression produced by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RuleOperator {
    #[display("host_matches")]
    HostMatches,
    #[display("path_beg")]
    PathPrefix,
    #[display("path")]
    Path,
}

/// A rule reduced to its ACL expression and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub operator: RuleOperator,
    pub value: String,
}

// PathPrefix must be tried before Path.
const RULE_FUNCTIONS: [(&str, RuleOperator); 3] = [
    ("Host", RuleOperator::HostMatches),
    ("PathPrefix", RuleOperator::PathPrefix),
    ("Path", RuleOperator::Path),
];

/// Parse a routing rule into an ACL expression and value.
///
/// # Errors
///
/// - [`LabelError::UnsupportedRule`] for anything but a single supported function
pub fn parse_rule(rule: &str) -> Result<ParsedRule, Report<LabelError>> {
    let trimmed = rule.trim();

    for (function, operator) in RULE_FUNCTIONS {
        let Some(rest) = trimmed.strip_prefix(function) else {
            continue;
        };
        if let Some(value) = extract_argument(rest) {
            return Ok(ParsedRule {
                operator,
                value: value.to_string(),
            });
        }
    }

    Err(Report::new(LabelError::UnsupportedRule {
        rule: rule.to_string(),
    }))
}

/// Extract the backtick literal from `(` ws `value` ws `)`.
fn extract_argument(call: &str) -> Option<&str> {
    let inner = call.strip_prefix('(')?.strip_suffix(')')?.trim();
    let value = inner.strip_prefix('`')?.strip_suffix('`')?;
    if value.is_empty() || value.contains('`') {
        return None;
    }
    Some(value)
}
