//! In-memory columnar dataset.
//!
//! A [`Dataset`] holds one [`Column`] per CSV header: the column's metadata
//! plus a `Vec<Option<Value>>` of typed cells, where `None` is the missing
//! value marker. The structure is immutable once built; the only permitted
//! mutation is a one-shot in-place type recast of a column
//! ([`Dataset::replace_column_values`]), used by the normalization pass
//! before any rule evaluation begins.
//!
//! Cells that fail to parse under the inferred type degrade to `None`
//! instead of failing the load; a single bad cell must not block evaluation
//! of unrelated rules.

use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Result, ensure};
use log::debug;

use crate::{
    data::{Value, parse_typed_value},
    schema::{self, ColumnMeta, ColumnType, Schema},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

#[derive(Debug, Clone)]
pub struct Column {
    pub meta: ColumnMeta,
    pub values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: &str, data_type: ColumnType, values: Vec<Option<Value>>) -> Self {
        Self {
            meta: ColumnMeta {
                name: name.to_string(),
                data_type,
            },
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        for column in &columns {
            ensure!(
                column.values.len() == row_count,
                "Column '{}' has {} value(s), expected {}",
                column.meta.name,
                column.values.len(),
                row_count
            );
        }
        Ok(Self { columns, row_count })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let delimiter = resolve_input_delimiter(path);
        let file =
            File::open(path).with_context(|| format!("Opening dataset file {path:?}"))?;
        Self::from_csv_reader(file, delimiter)
            .with_context(|| format!("Loading dataset from {path:?}"))
    }

    pub fn from_csv_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .double_quote(true)
            .flexible(false)
            .from_reader(reader);
        let headers: Vec<String> = reader
            .headers()
            .context("Reading CSV headers")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows: Vec<Vec<String>> = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        let schema = schema::infer_column_types(&headers, &rows, 0);
        Self::from_string_rows(&schema, &rows)
    }

    /// Builds a typed dataset from raw string rows. Unparsable cells become
    /// missing markers rather than errors, matching the tolerance expected
    /// of an externally produced table.
    pub fn from_string_rows(schema: &Schema, rows: &[Vec<String>]) -> Result<Self> {
        let mut columns: Vec<Column> = schema
            .columns
            .iter()
            .map(|meta| Column {
                meta: meta.clone(),
                values: Vec::with_capacity(rows.len()),
            })
            .collect();

        let mut degraded = 0usize;
        for row in rows {
            for (idx, column) in columns.iter_mut().enumerate() {
                let raw = row.get(idx).map(|s| s.as_str()).unwrap_or("");
                let cell = match parse_typed_value(raw, &column.meta.data_type) {
                    Ok(value) => value,
                    Err(_) => {
                        degraded += 1;
                        None
                    }
                };
                column.values.push(cell);
            }
        }
        if degraded > 0 {
            debug!("{degraded} cell(s) failed typed parsing and were marked missing");
        }
        Self::new(columns)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.meta.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.meta.name == name)
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn cell(&self, column_index: usize, row: usize) -> Option<&Value> {
        self.columns
            .get(column_index)
            .and_then(|c| c.values.get(row))
            .and_then(|v| v.as_ref())
    }

    /// Commits a one-shot type recast of a column. The replacement must be
    /// row-aligned; the caller is responsible for deciding whether the
    /// conversion is worth committing at all.
    pub fn replace_column_values(
        &mut self,
        column_index: usize,
        data_type: ColumnType,
        values: Vec<Option<Value>>,
    ) -> Result<()> {
        ensure!(
            column_index < self.columns.len(),
            "Column index {column_index} out of bounds"
        );
        ensure!(
            values.len() == self.row_count,
            "Replacement for column {column_index} has {} value(s), expected {}",
            values.len(),
            self.row_count
        );
        let column = &mut self.columns[column_index];
        column.meta.data_type = data_type;
        column.values = values;
        Ok(())
    }
}

pub fn resolve_input_delimiter(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}
