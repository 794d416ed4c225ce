//! Schema normalization: make an externally loaded dataset safe and correct
//! to aggregate over before any rule runs.
//!
//! Three operations, all side-effect free except the one-shot in-place
//! column coercion:
//!
//! - [`normalize`] samples text columns and coerces the ones that look like
//!   dates or currency amounts into native temporal/float columns.
//! - [`infer_role_map`] assigns fallback amount/date/account roles by
//!   column-name heuristic.
//! - [`schema_summary`] extracts the lightweight column/sample digest the
//!   external rule-mapping step needs to rewrite generic rules.
//!
//! Normalization never fails: an unparsable value becomes a missing marker,
//! a pathological column is logged and left unchanged.

use std::{collections::BTreeMap, sync::LazyLock};

use log::{debug, warn};
use regex::Regex;
use serde::Serialize;

use crate::{
    data::{Value, parse_lenient_datetime},
    dataset::Dataset,
    roles::{Role, RoleMap},
    schema::ColumnType,
};

/// Rows sampled per text column when deciding whether to coerce it.
pub const TEXT_SAMPLE_ROWS: usize = 100;
/// Distinct values exposed per column in the schema summary.
pub const SUMMARY_SAMPLE_VALUES: usize = 5;

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4})").expect("valid date pattern")
});
static CURRENCY_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\$,]?\s*\d+(?:,\d{3})*(?:\.\d+)?$").expect("valid currency pattern")
});

pub fn normalize(dataset: &mut Dataset) {
    for idx in 0..dataset.columns().len() {
        let column = &dataset.columns()[idx];
        if column.meta.data_type != ColumnType::String {
            continue;
        }
        let samples: Vec<String> = column
            .values
            .iter()
            .filter_map(|cell| cell.as_ref())
            .take(TEXT_SAMPLE_ROWS)
            .map(Value::as_display)
            .collect();
        if samples.is_empty() {
            continue;
        }

        if samples.iter().all(|s| DATE_SHAPE.is_match(s)) {
            recast_column(dataset, idx, ColumnType::DateTime, datetime_cell);
        } else if samples.iter().all(|s| CURRENCY_SHAPE.is_match(s.trim())) {
            recast_column(dataset, idx, ColumnType::Float, currency_cell);
        }
    }
}

fn datetime_cell(value: &Value) -> Option<Value> {
    match value {
        Value::String(raw) => parse_lenient_datetime(raw).ok().map(Value::DateTime),
        _ => None,
    }
}

fn currency_cell(value: &Value) -> Option<Value> {
    match value {
        Value::String(raw) => raw
            .replace(['$', ','], "")
            .trim()
            .parse::<f64>()
            .ok()
            .map(Value::Float),
        _ => None,
    }
}

fn recast_column(
    dataset: &mut Dataset,
    index: usize,
    target: ColumnType,
    convert: fn(&Value) -> Option<Value>,
) {
    let column = &dataset.columns()[index];
    let name = column.name().to_string();
    let mut non_missing = 0usize;
    let mut converted = 0usize;
    let values: Vec<Option<Value>> = column
        .values
        .iter()
        .map(|cell| match cell {
            Some(value) => {
                non_missing += 1;
                let parsed = convert(value);
                if parsed.is_some() {
                    converted += 1;
                }
                parsed
            }
            None => None,
        })
        .collect();

    if non_missing > 0 && converted == 0 {
        warn!("Failed to coerce column '{name}' to {target:?}; leaving it unchanged");
        return;
    }
    match dataset.replace_column_values(index, target.clone(), values) {
        Ok(()) => debug!(
            "Coerced column '{name}' to {target:?} ({converted}/{non_missing} value(s) parsed)"
        ),
        Err(err) => warn!("Failed to coerce column '{name}': {err:#}"),
    }
}

/// First-match role scan over column names, one independent pass per role.
/// A column may serve several roles; each role takes the first name hit.
pub fn infer_role_map(dataset: &Dataset) -> RoleMap {
    let mut map = RoleMap::default();
    for role in Role::ALL {
        for column in dataset.columns() {
            let lowered = column.name().to_ascii_lowercase();
            if role
                .name_fragments()
                .iter()
                .any(|fragment| lowered.contains(fragment))
            {
                map.set(role, column.name().to_string());
                break;
            }
        }
    }
    debug!(
        "Inferred fallback roles: amount={:?} date={:?} account={:?}",
        map.amount, map.date, map.account
    );
    map
}

/// Column names plus up to [`SUMMARY_SAMPLE_VALUES`] distinct non-missing
/// values per column, for the external rule-mapping step.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub columns: Vec<String>,
    pub samples: BTreeMap<String, Vec<String>>,
}

pub fn schema_summary(dataset: &Dataset) -> SchemaSummary {
    let columns = dataset.headers();
    let mut samples = BTreeMap::new();
    for column in dataset.columns() {
        let mut distinct: Vec<String> = Vec::new();
        for value in column.values.iter().filter_map(|cell| cell.as_ref()) {
            let display = value.as_display();
            if !distinct.contains(&display) {
                distinct.push(display);
                if distinct.len() >= SUMMARY_SAMPLE_VALUES {
                    break;
                }
            }
        }
        samples.insert(column.name().to_string(), distinct);
    }
    SchemaSummary { columns, samples }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn text_dataset(header: &str, cells: &[&str]) -> Dataset {
        let mut csv = format!("{header}\n");
        for cell in cells {
            csv.push('"');
            csv.push_str(cell);
            csv.push_str("\"\n");
        }
        Dataset::from_csv_reader(csv.as_bytes(), b',').expect("build dataset")
    }

    #[test]
    fn currency_strings_coerce_to_float() {
        let mut dataset = text_dataset("Amount Paid", &["$1,200.50", "$900", "15,000"]);
        assert_eq!(
            dataset.columns()[0].meta.data_type,
            ColumnType::String
        );
        normalize(&mut dataset);
        assert_eq!(dataset.columns()[0].meta.data_type, ColumnType::Float);
        assert_eq!(dataset.cell(0, 0), Some(&Value::Float(1200.5)));
        assert_eq!(dataset.cell(0, 2), Some(&Value::Float(15000.0)));
    }

    #[test]
    fn mixed_format_date_columns_coerce_to_datetime() {
        // Built over an all-String schema, as an external loader would hand
        // the table over without type sniffing.
        let schema = crate::schema::Schema::from_headers(&["Posted".to_string()]);
        let rows = vec![
            vec!["2024-01-02 10:30:00".to_string()],
            vec!["03/01/2024".to_string()],
            vec!["2024-01-04".to_string()],
        ];
        let mut dataset = Dataset::from_string_rows(&schema, &rows).expect("build");
        assert_eq!(dataset.columns()[0].meta.data_type, ColumnType::String);
        normalize(&mut dataset);
        assert_eq!(dataset.columns()[0].meta.data_type, ColumnType::DateTime);
        let first = dataset.cell(0, 0).expect("first cell");
        assert_eq!(first.as_display(), "2024-01-02 10:30:00");
        // date-only cells anchor at midnight
        let last = dataset.cell(0, 2).expect("last cell");
        assert_eq!(last.as_display(), "2024-01-04 00:00:00");
    }

    #[test]
    fn non_conforming_text_column_is_left_untouched() {
        let mut dataset = text_dataset("Notes", &["wire transfer", "2024-01-02", "cash"]);
        normalize(&mut dataset);
        assert_eq!(dataset.columns()[0].meta.data_type, ColumnType::String);
        assert_eq!(
            dataset.cell(0, 0),
            Some(&Value::String("wire transfer".to_string()))
        );
    }

    #[test]
    fn role_map_takes_first_matching_column_per_role() {
        let csv = "Transaction_ID,Timestamp,From_Account,To_Account,Amount Paid\n\
                   T1,2024-01-02 10:00:00,A1,B1,100\n";
        let dataset = Dataset::from_csv_reader(csv.as_bytes(), b',').expect("load");
        let roles = infer_role_map(&dataset);
        // "Transaction_ID" contains "id" and wins the account role; the
        // amount and date roles match later columns independently.
        assert_eq!(roles.account.as_deref(), Some("Transaction_ID"));
        assert_eq!(roles.date.as_deref(), Some("Timestamp"));
        assert_eq!(roles.amount.as_deref(), Some("Amount Paid"));
    }

    #[test]
    fn schema_summary_caps_distinct_samples() {
        let csv = "status\nok\nok\nflagged\nheld\nok\nnew\nrare\nlast\n";
        let dataset = Dataset::from_csv_reader(csv.as_bytes(), b',').expect("load");
        let summary = schema_summary(&dataset);
        assert_eq!(summary.columns, vec!["status".to_string()]);
        let samples = summary.samples.get("status").expect("status samples");
        assert_eq!(samples.len(), SUMMARY_SAMPLE_VALUES);
        assert_eq!(samples[0], "ok");
        assert!(!samples.contains(&"last".to_string()));
    }
}
