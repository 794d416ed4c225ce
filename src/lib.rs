//! Compliance rule evaluation and risk-metrics engine for tabular datasets.
//!
//! The crate takes an in-memory transaction table and a list of mapped
//! compliance rules (boolean predicates over the table's own columns,
//! produced by an external rule-mapping service) and turns them into an
//! ordered list of per-rule risk metrics:
//!
//! 1. [`normalize`] coerces ambiguous text columns (currency strings,
//!    mixed-format dates) into native types and infers fallback column
//!    roles, so downstream aggregation is correct.
//! 2. [`engine::Auditor`] evaluates each rule's predicate as a boolean
//!    mask, aggregates violation statistics (exposure, unique accounts,
//!    date range, top offenders), and assigns a bounded risk score.
//! 3. [`report`] renders the metric list as compact JSON for the
//!    downstream report generator.
//!
//! One bad rule never aborts a batch: structural skips, evaluation errors,
//! and aggregation degradations are all folded into the output record for
//! that rule, and every other rule still produces its metric.

pub mod data;
pub mod dataset;
pub mod engine;
pub mod expr;
pub mod normalize;
pub mod report;
pub mod roles;
pub mod rule;
pub mod schema;

use std::{env, sync::OnceLock};

use log::LevelFilter;

static LOGGER: OnceLock<()> = OnceLock::new();

pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("rule_audit", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}
