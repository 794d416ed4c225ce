//! Restricted boolean-expression evaluation over dataset rows.
//!
//! Predicate strings originate from an external, semi-trusted generation
//! pipeline and are never treated as host code. They are compiled once with
//! `evalexpr::build_operator_tree`, every variable identifier is checked
//! against the dataset's columns before any row is touched, and evaluation
//! runs against a per-row [`HashMapContext`] that binds nothing but the
//! row's own cell values (canonical column names plus positional `c{idx}`
//! aliases) and a small registered helper-function set.

use std::collections::HashSet;

use anyhow::{Context, Result, anyhow};
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, Function, HashMapContext, Node,
    Value as EvalValue, build_operator_tree,
};

use crate::{
    data::{normalize_column_name, parse_naive_date, value_to_evalexpr},
    dataset::Dataset,
};

fn register_predicate_functions(context: &mut HashMapContext) -> Result<()> {
    context
        .set_function(
            "one_of".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 2, "one_of")?;
                let needle = args[0].clone();
                let found = match &args[1] {
                    EvalValue::Tuple(values) => values.iter().any(|v| *v == needle),
                    single => *single == needle,
                };
                Ok(EvalValue::Boolean(found))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "lowercase".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 1, "lowercase")?;
                let value = expect_string(&args[0], "value")?;
                Ok(EvalValue::String(value.to_lowercase()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "date_diff_days".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 2, "date_diff_days")?;
                let end = parse_date_arg(&args[0])?;
                let start = parse_date_arg(&args[1])?;
                let diff = (end - start).num_days();
                Ok(EvalValue::Int(diff))
            }),
        )
        .map_err(anyhow::Error::from)?;

    Ok(())
}

fn expect_args(
    arguments: &EvalValue,
    expected: usize,
    name: &str,
) -> Result<Vec<EvalValue>, evalexpr::EvalexprError> {
    match arguments {
        EvalValue::Empty if expected == 0 => Ok(Vec::new()),
        value if expected == 1 && !matches!(value, EvalValue::Tuple(_)) => Ok(vec![value.clone()]),
        EvalValue::Tuple(values) => {
            if values.len() != expected {
                return Err(evalexpr::EvalexprError::wrong_function_argument_amount(
                    values.len(),
                    expected,
                ));
            }
            Ok(values.clone())
        }
        _ => Err(eval_error(&format!(
            "{name} expects {expected} arguments provided as a tuple"
        ))),
    }
}

fn eval_error(message: &str) -> evalexpr::EvalexprError {
    evalexpr::EvalexprError::CustomMessage(message.to_string())
}

fn parse_date_arg(value: &EvalValue) -> Result<chrono::NaiveDate, evalexpr::EvalexprError> {
    let raw = expect_string(value, "date")?;
    parse_naive_date(raw).map_err(|err| eval_error(&err.to_string()))
}

fn expect_string<'a>(value: &'a EvalValue, name: &str) -> Result<&'a str, evalexpr::EvalexprError> {
    if let EvalValue::String(s) = value {
        Ok(s)
    } else {
        Err(eval_error(&format!("Expected string for {name}")))
    }
}

/// A parsed predicate whose column references have been checked against the
/// dataset. Anything outside the restricted grammar is rejected here, before
/// a single row is evaluated.
#[derive(Debug)]
pub struct CompiledPredicate {
    tree: Node,
}

pub fn compile(predicate: &str, dataset: &Dataset) -> Result<CompiledPredicate> {
    let tree: Node = build_operator_tree(predicate)
        .with_context(|| format!("Parsing predicate '{predicate}'"))?;

    let mut known: HashSet<String> = HashSet::new();
    for (idx, column) in dataset.columns().iter().enumerate() {
        known.insert(normalize_column_name(column.name()));
        known.insert(format!("c{idx}"));
    }
    for identifier in tree.iter_variable_identifiers() {
        if !known.contains(identifier) {
            return Err(anyhow!("Unknown column '{identifier}' in predicate"));
        }
    }

    Ok(CompiledPredicate { tree })
}

impl CompiledPredicate {
    pub fn matches(&self, context: &HashMapContext) -> Result<bool> {
        let value = self
            .tree
            .eval_with_context(context)
            .context("Evaluating predicate")?;
        Ok(eval_value_truthy(value))
    }
}

/// Binds one dataset row into an evaluation context. Missing cells bind as
/// empty strings, so a predicate over a sparse column fails loudly on a type
/// mismatch instead of silently matching.
pub fn row_context(dataset: &Dataset, row: usize) -> Result<HashMapContext> {
    let mut context = HashMapContext::new();
    register_predicate_functions(&mut context)?;
    for (idx, column) in dataset.columns().iter().enumerate() {
        let canon = normalize_column_name(column.name());
        let key = format!("c{idx}");
        let eval_value = match column.values.get(row).and_then(|v| v.as_ref()) {
            Some(value) => value_to_evalexpr(value),
            None => EvalValue::String(String::new()),
        };
        context
            .set_value(canon, eval_value.clone())
            .with_context(|| format!("Binding column '{}'", column.name()))?;
        context
            .set_value(key, eval_value)
            .with_context(|| format!("Binding column index {idx}"))?;
    }
    Ok(context)
}

pub fn eval_value_truthy(value: EvalValue) -> bool {
    match value {
        EvalValue::Boolean(b) => b,
        EvalValue::Int(i) => i != 0,
        EvalValue::Float(f) => f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(values) => values.into_iter().any(eval_value_truthy),
        EvalValue::Empty => false,
    }
}
