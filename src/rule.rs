//! Rule records consumed from the external mapping service and the metric
//! records produced for the external report generator.
//!
//! Validation is deliberately loose on the way in: a missing `status` means
//! "not ready", a missing `columns_remapped` list means "no overrides", and
//! an unrecognized severity is preserved verbatim (it scores as the lowest
//! base). The engine never mutates a rule once received.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub type SampleRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Other(raw) => raw,
        }
    }

    /// Base contribution to the 1-10 risk score.
    pub fn base_score(&self) -> u32 {
        match self {
            Severity::Critical => 8,
            Severity::High => 5,
            Severity::Medium => 3,
            Severity::Low | Severity::Other(_) => 1,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::Other(raw),
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum RuleStatus {
    Ready,
    Skipped,
    Error,
    #[default]
    Unknown,
}

impl From<String> for RuleStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "READY" => RuleStatus::Ready,
            "SKIPPED" => RuleStatus::Skipped,
            "ERROR" => RuleStatus::Error,
            _ => RuleStatus::Unknown,
        }
    }
}

impl From<RuleStatus> for String {
    fn from(status: RuleStatus) -> Self {
        match status {
            RuleStatus::Ready => "READY",
            RuleStatus::Skipped => "SKIPPED",
            RuleStatus::Error => "ERROR",
            RuleStatus::Unknown => "UNKNOWN",
        }
        .to_string()
    }
}

/// One `columns_remapped` entry. The upstream mapper emits either an
/// explicit `[generic, actual]` pair or a single `"generic -> actual"`
/// string; both shapes resolve to the same pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemapEntry {
    Pair(String, String),
    Arrow(String),
}

impl RemapEntry {
    pub fn as_pair(&self) -> Option<(String, String)> {
        match self {
            RemapEntry::Pair(generic, actual) => {
                Some((generic.trim().to_string(), actual.trim().to_string()))
            }
            RemapEntry::Arrow(raw) => {
                let (generic, actual) = raw.split_once("->")?;
                Some((generic.trim().to_string(), actual.trim().to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub title: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default)]
    pub predicate: Option<String>,
    #[serde(default)]
    pub columns_remapped: Vec<RemapEntry>,
}

impl Rule {
    /// A rule only executes when the upstream mapper marked it READY and
    /// actually attached a predicate.
    pub fn is_executable(&self) -> bool {
        self.status == RuleStatus::Ready
            && self
                .predicate
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty())
    }

    pub fn remapped_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.columns_remapped.iter().filter_map(RemapEntry::as_pair)
    }

    #[cfg(test)]
    pub(crate) fn stub(rule_id: &str, title: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            title: title.to_string(),
            severity: Severity::default(),
            status: RuleStatus::Ready,
            predicate: None,
            columns_remapped: Vec::new(),
        }
    }
}

/// Parses the mapped-rule list handed over by the external rule service.
pub fn rules_from_json(raw: &str) -> Result<Vec<Rule>> {
    serde_json::from_str(raw).context("Parsing mapped rule records")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricStatus {
    Skipped,
    Error(String),
    Flagged,
    Clean,
}

impl MetricStatus {
    pub fn render(&self) -> String {
        match self {
            MetricStatus::Skipped => "SKIPPED".to_string(),
            MetricStatus::Error(message) => format!("ERROR: {message}"),
            MetricStatus::Flagged => "FLAGGED".to_string(),
            MetricStatus::Clean => "CLEAN".to_string(),
        }
    }
}

impl fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl Serialize for MetricStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.render())
    }
}

impl<'de> Deserialize<'de> for MetricStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Some(message) = raw.strip_prefix("ERROR:") {
            return Ok(MetricStatus::Error(message.trim_start().to_string()));
        }
        match raw.as_str() {
            "SKIPPED" => Ok(MetricStatus::Skipped),
            "FLAGGED" => Ok(MetricStatus::Flagged),
            "CLEAN" => Ok(MetricStatus::Clean),
            other => Err(de::Error::custom(format!("Unknown metric status '{other}'"))),
        }
    }
}

/// Per-rule output record, one per input rule, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMetric {
    pub rule_id: String,
    pub title: String,
    pub severity: Severity,
    pub status: MetricStatus,
    pub risk_score: u32,
    pub violation_count: usize,
    pub unique_accounts: usize,
    pub total_amount_exposure: f64,
    pub avg_amount: f64,
    pub date_range: String,
    pub top_offenders: Vec<String>,
    #[serde(rename = "sample_offending_row")]
    pub sample_offending_rows: Vec<SampleRow>,
}

impl RuleMetric {
    fn zeroed(rule: &Rule, status: MetricStatus) -> Self {
        Self {
            rule_id: rule.rule_id.clone(),
            title: rule.title.clone(),
            severity: rule.severity.clone(),
            status,
            risk_score: 0,
            violation_count: 0,
            unique_accounts: 0,
            total_amount_exposure: 0.0,
            avg_amount: 0.0,
            date_range: "N/A".to_string(),
            top_offenders: Vec::new(),
            sample_offending_rows: Vec::new(),
        }
    }

    pub fn skipped(rule: &Rule) -> Self {
        Self::zeroed(rule, MetricStatus::Skipped)
    }

    pub fn evaluation_error(rule: &Rule, message: &str) -> Self {
        Self::zeroed(rule, MetricStatus::Error(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parsing_preserves_unknown_text() {
        assert_eq!(Severity::from("critical".to_string()), Severity::Critical);
        assert_eq!(
            Severity::from("Informational".to_string()),
            Severity::Other("Informational".to_string())
        );
        assert_eq!(
            Severity::Other("Informational".to_string()).base_score(),
            1
        );
    }

    #[test]
    fn missing_status_means_not_executable() {
        let parsed: Rule = serde_json::from_str(
            r#"{"rule_id":"R1","title":"No status","predicate":"amount > 0"}"#,
        )
        .expect("parse");
        assert_eq!(parsed.status, RuleStatus::Unknown);
        assert!(!parsed.is_executable());
    }

    #[test]
    fn remap_entries_accept_both_shapes() {
        let arrow = RemapEntry::Arrow("amount -> Amount Paid".to_string());
        assert_eq!(
            arrow.as_pair(),
            Some(("amount".to_string(), "Amount Paid".to_string()))
        );

        let pair = RemapEntry::Pair("timestamp".to_string(), "Posted_At".to_string());
        assert_eq!(
            pair.as_pair(),
            Some(("timestamp".to_string(), "Posted_At".to_string()))
        );

        let malformed = RemapEntry::Arrow("no arrow here".to_string());
        assert_eq!(malformed.as_pair(), None);
    }

    #[test]
    fn metric_status_round_trips_through_strings() {
        let error = MetricStatus::Error("Unknown column 'foo'".to_string());
        assert_eq!(error.render(), "ERROR: Unknown column 'foo'");

        let json = serde_json::to_string(&error).expect("serialize");
        let back: MetricStatus = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, error);

        let clean: MetricStatus = serde_json::from_str("\"CLEAN\"").expect("clean");
        assert_eq!(clean, MetricStatus::Clean);
    }
}
