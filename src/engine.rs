//! Rule evaluation and per-rule metrics aggregation.
//!
//! [`Auditor`] owns a normalized dataset plus its fallback role map and
//! evaluates batches of mapped rules against it. The engine-level contract
//! is "never abort the batch for one rule's failure": structural skips and
//! evaluation errors become the metric's status, aggregation problems
//! degrade the affected field to its zero/"N/A" default, and only an
//! unusable dataset stops a run ([`EngineError::EmptyDataset`]).

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use itertools::{Itertools, MinMaxResult};
use log::{info, warn};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use thiserror::Error;

use crate::{
    data::{Value, parse_lenient_datetime},
    dataset::Dataset,
    expr,
    normalize::{self, SchemaSummary},
    roles::{self, Role, RoleMap},
    rule::{MetricStatus, Rule, RuleMetric, SampleRow, Severity},
};

/// Matching rows materialized into the report, at most.
pub const SAMPLE_ROW_LIMIT: usize = 5;
/// Most frequent offending entities listed per rule.
pub const TOP_OFFENDER_LIMIT: usize = 3;
pub const MAX_RISK_SCORE: u32 = 10;

const DATE_RANGE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Fatal conditions that abort a whole run before any rule is attempted.
/// Per-rule failures never surface here; they live in the metric records.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("dataset has no rows or columns to audit")]
    EmptyDataset,
}

/// Bonus-point cutoffs for the risk score. The defaults carry the
/// historical policy values; callers with a different risk appetite
/// override them via [`Auditor::with_thresholds`].
#[derive(Debug, Clone, Copy)]
pub struct RiskThresholds {
    /// Violation share of total rows above which the score gains a point.
    pub volume_share: f64,
    /// Exposure above which the score gains a point, in the dataset's
    /// currency unit.
    pub exposure_cap: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            volume_share: 0.10,
            exposure_cap: 1_000_000.0,
        }
    }
}

/// Outcome of one predicate evaluation: a row-aligned mask plus the small
/// slices of it that survive into the report. Only the sample rows are
/// materialized; the dataset itself is never copied.
#[derive(Debug, Clone)]
pub struct ViolationScan {
    pub mask: Vec<bool>,
    pub violation_count: usize,
    pub violating_indices: Vec<usize>,
    pub sample_rows: Vec<SampleRow>,
}

pub struct Auditor {
    dataset: Dataset,
    roles: RoleMap,
    thresholds: RiskThresholds,
}

impl Auditor {
    /// Normalizes the dataset (one-shot column coercions) and freezes the
    /// fallback role map. Normalization completes before any evaluation.
    pub fn new(dataset: Dataset) -> Self {
        Self::with_thresholds(dataset, RiskThresholds::default())
    }

    pub fn with_thresholds(mut dataset: Dataset, thresholds: RiskThresholds) -> Self {
        normalize::normalize(&mut dataset);
        let roles = normalize::infer_role_map(&dataset);
        Self {
            dataset,
            roles,
            thresholds,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn role_map(&self) -> &RoleMap {
        &self.roles
    }

    pub fn schema_summary(&self) -> SchemaSummary {
        normalize::schema_summary(&self.dataset)
    }

    /// Evaluates one predicate into a boolean mask. Blank input, parse
    /// failures, unknown columns, and per-row runtime errors all come back
    /// as `Err`; callers fold them into the rule's metric.
    pub fn evaluate_predicate(&self, predicate: &str) -> Result<ViolationScan> {
        let trimmed = predicate.trim();
        if trimmed.is_empty() {
            bail!("Empty predicate string");
        }
        let compiled = expr::compile(trimmed, &self.dataset)?;

        let rows = self.dataset.row_count();
        let mut mask = Vec::with_capacity(rows);
        for row in 0..rows {
            let context = expr::row_context(&self.dataset, row)?;
            let hit = compiled
                .matches(&context)
                .with_context(|| format!("Evaluating row {}", row + 1))?;
            mask.push(hit);
        }

        let violating_indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, &hit)| hit.then_some(idx))
            .collect();
        let sample_rows = violating_indices
            .iter()
            .take(SAMPLE_ROW_LIMIT)
            .map(|&row| self.sample_row(row))
            .collect();

        Ok(ViolationScan {
            violation_count: violating_indices.len(),
            mask,
            violating_indices,
            sample_rows,
        })
    }

    /// Runs every rule in input order and returns one metric per rule, in
    /// the same order. Only an unusable dataset aborts the batch.
    pub fn run_all(&self, rules: &[Rule]) -> Result<Vec<RuleMetric>, EngineError> {
        if self.dataset.is_empty() {
            return Err(EngineError::EmptyDataset);
        }
        let mut metrics = Vec::with_capacity(rules.len());
        for rule in rules {
            if !rule.is_executable() {
                info!("Skipping rule '{}' (not ready)", rule.title);
                metrics.push(RuleMetric::skipped(rule));
                continue;
            }
            let predicate = rule.predicate.as_deref().unwrap_or_default();
            info!("Executing predicate for '{}'", rule.title);
            match self.evaluate_predicate(predicate) {
                Ok(scan) => {
                    info!(
                        "Found {} violation(s) for '{}'",
                        scan.violation_count, rule.title
                    );
                    metrics.push(self.collect_metric(rule, &scan));
                }
                Err(err) => {
                    warn!("Rule '{}' failed to evaluate: {err:#}", rule.title);
                    metrics.push(RuleMetric::evaluation_error(rule, &format!("{err:#}")));
                }
            }
        }
        Ok(metrics)
    }

    fn collect_metric(&self, rule: &Rule, scan: &ViolationScan) -> RuleMetric {
        let count = scan.violation_count;
        let mut unique_accounts = 0usize;
        let mut total_exposure = 0.0f64;
        let mut avg_amount = 0.0f64;
        let mut date_range = "N/A".to_string();
        let mut top_offenders = Vec::new();

        if count > 0 {
            if let Some(column) = self.resolve_existing(Role::Amount, rule) {
                (total_exposure, avg_amount) =
                    self.amount_aggregates(column, &scan.violating_indices);
            }
            if let Some(column) = self.resolve_existing(Role::Date, rule)
                && let Some(range) = self.date_range(column, &scan.violating_indices)
            {
                date_range = range;
            }
            if let Some(column) = self.resolve_existing(Role::Account, rule) {
                (unique_accounts, top_offenders) =
                    self.account_aggregates(column, &scan.violating_indices);
            }
        }

        RuleMetric {
            rule_id: rule.rule_id.clone(),
            title: rule.title.clone(),
            severity: rule.severity.clone(),
            status: if count > 0 {
                MetricStatus::Flagged
            } else {
                MetricStatus::Clean
            },
            risk_score: self.risk_score(&rule.severity, count, total_exposure),
            violation_count: count,
            unique_accounts,
            total_amount_exposure: total_exposure,
            avg_amount,
            date_range,
            top_offenders,
            sample_offending_rows: scan.sample_rows.clone(),
        }
    }

    /// Two-tier resolution plus an existence check: a mapping that points at
    /// a column the dataset does not have degrades that aggregation rather
    /// than failing the rule.
    fn resolve_existing(&self, role: Role, rule: &Rule) -> Option<usize> {
        let name = roles::resolve(role, rule, &self.roles)?;
        match self.dataset.column_index(&name) {
            Some(index) => Some(index),
            None => {
                warn!(
                    "Rule '{}': resolved {role:?} column '{name}' is not in the dataset",
                    rule.title
                );
                None
            }
        }
    }

    fn amount_aggregates(&self, column: usize, indices: &[usize]) -> (f64, f64) {
        let total: f64 = indices
            .iter()
            .map(|&row| numeric_or_zero(self.dataset.cell(column, row)))
            .sum();
        let avg = if indices.is_empty() {
            0.0
        } else {
            total / indices.len() as f64
        };
        (total, avg)
    }

    fn date_range(&self, column: usize, indices: &[usize]) -> Option<String> {
        let stamps: Vec<NaiveDateTime> = indices
            .iter()
            .filter_map(|&row| temporal_cell(self.dataset.cell(column, row)))
            .collect();
        match stamps.iter().minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(only) => Some(format!(
                "{} to {}",
                only.format(DATE_RANGE_FORMAT),
                only.format(DATE_RANGE_FORMAT)
            )),
            MinMaxResult::MinMax(min, max) => Some(format!(
                "{} to {}",
                min.format(DATE_RANGE_FORMAT),
                max.format(DATE_RANGE_FORMAT)
            )),
        }
    }

    fn account_aggregates(&self, column: usize, indices: &[usize]) -> (usize, Vec<String>) {
        let counts = indices
            .iter()
            .filter_map(|&row| self.dataset.cell(column, row))
            .map(Value::as_display)
            .counts();
        let unique = counts.len();
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top = ranked
            .into_iter()
            .take(TOP_OFFENDER_LIMIT)
            .map(|(value, count)| format!("{value} ({count} txns)"))
            .collect();
        (unique, top)
    }

    /// Severity base plus volume and exposure bonuses, clamped to
    /// [`MAX_RISK_SCORE`]. Monotonic in both violation count and exposure.
    pub fn risk_score(&self, severity: &Severity, violation_count: usize, exposure: f64) -> u32 {
        let mut score = severity.base_score();
        let volume_cutoff = self.dataset.row_count() as f64 * self.thresholds.volume_share;
        if violation_count as f64 > volume_cutoff {
            score += 1;
        }
        if exposure > self.thresholds.exposure_cap {
            score += 1;
        }
        score.min(MAX_RISK_SCORE)
    }

    fn sample_row(&self, row: usize) -> SampleRow {
        let mut record = JsonMap::new();
        for (idx, column) in self.dataset.columns().iter().enumerate() {
            record.insert(
                column.name().to_string(),
                cell_to_json(self.dataset.cell(idx, row)),
            );
        }
        record
    }
}

/// Amount coercion for exposure sums: numeric values pass through, booleans
/// count as 0/1, numeric-looking text parses, everything else (including
/// missing cells) contributes zero instead of failing the rule.
fn numeric_or_zero(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Integer(i)) => *i as f64,
        Some(Value::Float(f)) => *f,
        Some(Value::Boolean(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn temporal_cell(value: Option<&Value>) -> Option<NaiveDateTime> {
    match value {
        Some(Value::DateTime(dt)) => Some(*dt),
        Some(Value::Date(d)) => d.and_hms_opt(0, 0, 0),
        Some(Value::String(s)) => parse_lenient_datetime(s).ok(),
        _ => None,
    }
}

fn cell_to_json(value: Option<&Value>) -> JsonValue {
    match value {
        None => JsonValue::Null,
        Some(Value::Integer(i)) => JsonValue::from(*i),
        Some(Value::Float(f)) => JsonNumber::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(f.to_string())),
        Some(Value::Boolean(b)) => JsonValue::from(*b),
        Some(other) => JsonValue::String(other.as_display()),
    }
}
