//! Report serialization for the downstream narrative generator.

use anyhow::{Context, Result};

use crate::rule::RuleMetric;

/// Renders the ordered metric list as compact JSON, one object per rule.
/// Order is a contract: the downstream reporter ranks and displays rules
/// in the order they arrive.
pub fn render_json(metrics: &[RuleMetric]) -> Result<String> {
    serde_json::to_string(metrics).context("Serializing rule metrics")
}

/// Pretty variant for logs and fixtures.
pub fn render_json_pretty(metrics: &[RuleMetric]) -> Result<String> {
    serde_json::to_string_pretty(metrics).context("Serializing rule metrics")
}
