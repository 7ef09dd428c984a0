// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::frame::column::{Column, ColumnBuilder};
use crate::frame::common::{FrameError, Result};
use crate::frame::dataframe::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Comparison and aggregation vocabulary the plan interpreter accepts.
/// The grammar is deliberately closed: group-by, a handful of aggregate
/// verbs, conjunctive filters, sort and limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    CountDistinct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateOperation {
    pub column: String,
    pub function: AggregateFunction,
    pub alias: Option<String>,
}

impl AggregateOperation {
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupByOperation {
    pub group_columns: Vec<String>,
    pub aggregations: Vec<AggregateOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub by: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Default)]
pub struct TransformationEngine;

impl TransformationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Keep the rows matching every condition (conjunction).
    pub fn filter(&self, dataframe: &DataFrame, conditions: &[FilterCondition]) -> Result<DataFrame> {
        let columns: Result<Vec<(&Column, &FilterCondition)>> = conditions
            .iter()
            .map(|condition| {
                dataframe
                    .get_column(&condition.column)
                    .ok_or_else(|| FrameError::ColumnNotFound(condition.column.clone()))
                    .map(|column| (column, condition))
            })
            .collect();
        let columns = columns?;
        dataframe.filter(|i| {
            columns
                .iter()
                .all(|(column, condition)| evaluate_condition(column, i, condition))
        })
    }

    /// Aggregate per group key. Group keys appear in the order their
    /// first row appears in the source frame, so repeated runs over the
    /// same frame produce identical tables.
    pub fn group_by(&self, dataframe: &DataFrame, operation: &GroupByOperation) -> Result<DataFrame> {
        if operation.group_columns.is_empty() {
            return Err(FrameError::InvalidOperation(
                "group_by requires at least one grouping column".to_string(),
            ));
        }
        let group_columns: Result<Vec<&Column>> = operation
            .group_columns
            .iter()
            .map(|name| {
                dataframe
                    .get_column(name)
                    .ok_or_else(|| FrameError::ColumnNotFound(name.clone()))
            })
            .collect();
        let group_columns = group_columns?;
        for agg in &operation.aggregations {
            if !dataframe.has_column(&agg.column) {
                return Err(FrameError::ColumnNotFound(agg.column.clone()));
            }
        }

        let mut key_positions: HashMap<Vec<String>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        for i in 0..dataframe.row_count() {
            let key: Vec<String> = group_columns
                .iter()
                .map(|column| column.get_string(i).unwrap_or_else(|| "NULL".to_string()))
                .collect();
            match key_positions.get(&key) {
                Some(&pos) => groups[pos].1.push(i),
                None => {
                    key_positions.insert(key.clone(), groups.len());
                    groups.push((key, vec![i]));
                }
            }
        }

        let mut result = DataFrame::named(format!("{}_grouped", dataframe.metadata.name));
        for (col_idx, name) in operation.group_columns.iter().enumerate() {
            let values: Vec<Option<String>> = groups
                .iter()
                .map(|(key, _)| Some(key[col_idx].clone()))
                .collect();
            let mut builder = ColumnBuilder::with_capacity(values.len());
            for value in values {
                builder.push(value);
            }
            result.add_column(name.clone(), builder.build()?)?;
        }
        for agg in &operation.aggregations {
            let mut builder = ColumnBuilder::with_capacity(groups.len());
            for (_, indices) in &groups {
                builder.push(calculate_aggregation(dataframe, agg, indices)?);
            }
            result.add_column(agg.output_name().to_string(), builder.build()?)?;
        }
        Ok(result)
    }
}

fn evaluate_condition(column: &Column, index: usize, condition: &FilterCondition) -> bool {
    match &condition.value {
        FilterValue::String(expected) => {
            let Some(actual) = column.get_string(index) else {
                return false;
            };
            match condition.operator {
                ComparisonOperator::Equal => actual == *expected,
                ComparisonOperator::NotEqual => actual != *expected,
                ComparisonOperator::Contains => {
                    actual.to_lowercase().contains(&expected.to_lowercase())
                }
                ComparisonOperator::GreaterThan => actual > *expected,
                ComparisonOperator::LessThan => actual < *expected,
                ComparisonOperator::GreaterThanOrEqual => actual >= *expected,
                ComparisonOperator::LessThanOrEqual => actual <= *expected,
            }
        }
        FilterValue::Boolean(expected) => {
            let Some(actual) = column.to_f64(index) else {
                return false;
            };
            let actual = actual != 0.0;
            match condition.operator {
                ComparisonOperator::Equal => actual == *expected,
                ComparisonOperator::NotEqual => actual != *expected,
                _ => false,
            }
        }
        FilterValue::Int64(_) | FilterValue::Float64(_) => {
            let expected = match condition.value {
                FilterValue::Int64(v) => v as f64,
                FilterValue::Float64(v) => v,
                _ => unreachable!(),
            };
            let Some(actual) = column.to_f64(index) else {
                return false;
            };
            match condition.operator {
                ComparisonOperator::Equal => actual == expected,
                ComparisonOperator::NotEqual => actual != expected,
                ComparisonOperator::GreaterThan => actual > expected,
                ComparisonOperator::LessThan => actual < expected,
                ComparisonOperator::GreaterThanOrEqual => actual >= expected,
                ComparisonOperator::LessThanOrEqual => actual <= expected,
                ComparisonOperator::Contains => false,
            }
        }
    }
}

fn calculate_aggregation(
    dataframe: &DataFrame,
    agg: &AggregateOperation,
    indices: &[usize],
) -> Result<Option<String>> {
    let column = dataframe
        .get_column(&agg.column)
        .ok_or_else(|| FrameError::ColumnNotFound(agg.column.clone()))?;
    Ok(match agg.function {
        AggregateFunction::Count => Some(indices.len().to_string()),
        AggregateFunction::Sum => {
            let sum: f64 = indices.iter().filter_map(|&i| column.to_f64(i)).sum();
            Some(render_number(sum))
        }
        AggregateFunction::Mean => {
            let values: Vec<f64> = indices.iter().filter_map(|&i| column.to_f64(i)).collect();
            if values.is_empty() {
                None
            } else {
                Some(render_number(values.iter().sum::<f64>() / values.len() as f64))
            }
        }
        AggregateFunction::Min | AggregateFunction::Max => {
            let numeric: Vec<f64> = indices.iter().filter_map(|&i| column.to_f64(i)).collect();
            if numeric.len() == indices.len() && !numeric.is_empty() {
                let picked = numeric
                    .into_iter()
                    .reduce(|a, b| match agg.function {
                        AggregateFunction::Min => a.min(b),
                        _ => a.max(b),
                    })
                    .unwrap_or(f64::NAN);
                Some(render_number(picked))
            } else {
                let mut values: Vec<String> =
                    indices.iter().filter_map(|&i| column.get_string(i)).collect();
                if values.is_empty() {
                    None
                } else {
                    values.sort();
                    match agg.function {
                        AggregateFunction::Min => values.first().cloned(),
                        _ => values.last().cloned(),
                    }
                }
            }
        }
        AggregateFunction::CountDistinct => {
            let mut values: Vec<String> =
                indices.iter().filter_map(|&i| column.get_string(i)).collect();
            values.sort();
            values.dedup();
            Some(values.len().to_string())
        }
    })
}

/// Whole results render as integers so count-like sums stay readable.
fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::common::DataType;

    fn observations() -> DataFrame {
        let mut df = DataFrame::named("observations");
        df.add_column(
            "Division".to_string(),
            Column::from_strings(
                &[
                    Some("Plant A".to_string()),
                    Some("Plant B".to_string()),
                    Some("Plant A".to_string()),
                    Some("Plant C".to_string()),
                ],
                DataType::String,
            )
            .unwrap(),
        )
        .unwrap();
        df.add_column(
            "Severity".to_string(),
            Column::Int64(vec![Some(3), Some(1), Some(5), Some(2)].into()),
        )
        .unwrap();
        df
    }

    #[test]
    fn group_by_count_preserves_first_seen_order() {
        let df = observations();
        let grouped = TransformationEngine::new()
            .group_by(
                &df,
                &GroupByOperation {
                    group_columns: vec!["Division".to_string()],
                    aggregations: vec![AggregateOperation {
                        column: "Division".to_string(),
                        function: AggregateFunction::Count,
                        alias: Some("Total".to_string()),
                    }],
                },
            )
            .unwrap();
        assert_eq!(grouped.row_count(), 3);
        let division = grouped.get_column("Division").unwrap();
        assert_eq!(division.get_string(0).as_deref(), Some("Plant A"));
        assert_eq!(division.get_string(1).as_deref(), Some("Plant B"));
        let total = grouped.get_column("Total").unwrap();
        assert_eq!(total.get_string(0).as_deref(), Some("2"));
        assert_eq!(total.data_type(), DataType::Int64);
    }

    #[test]
    fn group_by_sum_and_mean() {
        let df = observations();
        let grouped = TransformationEngine::new()
            .group_by(
                &df,
                &GroupByOperation {
                    group_columns: vec!["Division".to_string()],
                    aggregations: vec![
                        AggregateOperation {
                            column: "Severity".to_string(),
                            function: AggregateFunction::Sum,
                            alias: Some("TotalSeverity".to_string()),
                        },
                        AggregateOperation {
                            column: "Severity".to_string(),
                            function: AggregateFunction::Mean,
                            alias: Some("MeanSeverity".to_string()),
                        },
                    ],
                },
            )
            .unwrap();
        let sum = grouped.get_column("TotalSeverity").unwrap();
        assert_eq!(sum.get_string(0).as_deref(), Some("8"));
        let mean = grouped.get_column("MeanSeverity").unwrap();
        assert_eq!(mean.get_string(0).as_deref(), Some("4"));
    }

    #[test]
    fn group_by_unknown_column_is_rejected() {
        let df = observations();
        let err = TransformationEngine::new()
            .group_by(
                &df,
                &GroupByOperation {
                    group_columns: vec!["Department".to_string()],
                    aggregations: vec![],
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("Department"));
    }

    #[test]
    fn filter_applies_all_conditions() {
        let df = observations();
        let filtered = TransformationEngine::new()
            .filter(
                &df,
                &[
                    FilterCondition {
                        column: "Division".to_string(),
                        operator: ComparisonOperator::Equal,
                        value: FilterValue::String("Plant A".to_string()),
                    },
                    FilterCondition {
                        column: "Severity".to_string(),
                        operator: ComparisonOperator::GreaterThan,
                        value: FilterValue::Int64(3),
                    },
                ],
            )
            .unwrap();
        assert_eq!(filtered.row_count(), 1);
        assert_eq!(
            filtered.get_column("Severity").unwrap().get_string(0).as_deref(),
            Some("5")
        );
    }

    #[test]
    fn filter_contains_is_case_insensitive() {
        let df = observations();
        let filtered = TransformationEngine::new()
            .filter(
                &df,
                &[FilterCondition {
                    column: "Division".to_string(),
                    operator: ComparisonOperator::Contains,
                    value: FilterValue::String("plant a".to_string()),
                }],
            )
            .unwrap();
        assert_eq!(filtered.row_count(), 2);
    }

    #[test]
    fn filter_value_deserialises_untagged() {
        let condition: FilterCondition =
            serde_json::from_str(r#"{"column":"Severity","operator":"greater_than","value":3}"#)
                .unwrap();
        assert_eq!(condition.value, FilterValue::Int64(3));
        let condition: FilterCondition =
            serde_json::from_str(r#"{"column":"Status","operator":"equal","value":"Open"}"#)
                .unwrap();
        assert_eq!(condition.value, FilterValue::String("Open".to_string()));
    }
}
