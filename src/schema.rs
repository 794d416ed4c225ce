//! Column metadata and sample-based type inference.
//!
//! A [`Schema`] is the minimal structural description of a tabular dataset:
//! one [`ColumnMeta`] (name + [`ColumnType`]) per column, in column order.
//! Inference works by candidate elimination: every column starts out as
//! possibly any type, each sampled value knocks out the types it cannot be,
//! and the survivor with the highest specificity wins.

use serde::{Deserialize, Serialize};

use crate::data::{parse_lenient_datetime, parse_naive_date};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: ColumnType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnMeta>,
}

impl Schema {
    pub fn from_headers(headers: &[String]) -> Self {
        let columns = headers
            .iter()
            .map(|name| ColumnMeta {
                name: name.clone(),
                data_type: ColumnType::String,
            })
            .collect();
        Schema { columns }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_date: bool,
    possible_datetime: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_date: true,
            possible_datetime: true,
        }
    }

    fn eliminate(&mut self, value: &str) {
        if self.possible_boolean
            && !matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "false" | "t" | "f" | "yes" | "no" | "y" | "n"
            )
        {
            self.possible_boolean = false;
        }
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && value.parse::<f64>().is_err() {
            self.possible_float = false;
        }
        if self.possible_date && parse_naive_date(value).is_err() {
            self.possible_date = false;
        }
        if self.possible_datetime && parse_lenient_datetime(value).is_err() {
            self.possible_datetime = false;
        }
    }

    fn decide(&self) -> ColumnType {
        if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else {
            ColumnType::String
        }
    }
}

/// Infers column types from raw string rows. `sample_rows == 0` samples
/// every row. Columns with no non-empty samples stay `String`.
pub fn infer_column_types(headers: &[String], rows: &[Vec<String>], sample_rows: usize) -> Schema {
    let mut candidates = vec![TypeCandidate::new(); headers.len()];
    let mut seen = vec![false; headers.len()];

    for (processed, row) in rows.iter().enumerate() {
        if sample_rows > 0 && processed >= sample_rows {
            break;
        }
        for (idx, field) in row.iter().enumerate() {
            if field.is_empty() || idx >= candidates.len() {
                continue;
            }
            seen[idx] = true;
            candidates[idx].eliminate(field);
        }
    }

    let columns = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| ColumnMeta {
            name: header.clone(),
            data_type: if seen[idx] {
                candidates[idx].decide()
            } else {
                ColumnType::String
            },
        })
        .collect();

    Schema { columns }
}
