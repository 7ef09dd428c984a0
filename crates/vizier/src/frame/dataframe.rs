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

use crate::frame::column::Column;
use crate::frame::common::{ColumnMetadata, DatasetMetadata, FrameError, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered collection of named, typed columns. Every transforming
/// operation returns a new frame; the source is never mutated in place,
/// so a caller can re-run queries against the same frame it handed in.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub columns: HashMap<String, Arc<Column>>,
    pub metadata: DatasetMetadata,
    column_order: Vec<String>,
}

impl DataFrame {
    pub fn new(metadata: DatasetMetadata) -> Self {
        Self {
            columns: HashMap::new(),
            metadata,
            column_order: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(DatasetMetadata::named(name))
    }

    pub fn add_column(&mut self, name: String, column: Column) -> Result<()> {
        if !self.columns.is_empty() {
            let expected = self.metadata.row_count;
            if column.len() != expected {
                return Err(FrameError::InvalidOperation(format!(
                    "Column length mismatch: expected {}, got {}",
                    expected,
                    column.len()
                )));
            }
        } else {
            self.metadata.row_count = column.len();
        }
        if !self.columns.contains_key(&name) {
            self.column_order.push(name.clone());
        }
        self.columns.insert(name, Arc::new(column));
        self.metadata.column_count = self.columns.len();
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }

    pub fn column_count(&self) -> usize {
        self.metadata.column_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name).map(|arc| arc.as_ref())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_metadata(&self) -> Vec<ColumnMetadata> {
        self.column_order
            .par_iter()
            .map(|name| {
                let column = &self.columns[name];
                ColumnMetadata {
                    name: name.clone(),
                    data_type: column.data_type(),
                    null_count: column.null_count(),
                }
            })
            .collect()
    }

    pub fn select(&self, column_names: &[String]) -> Result<DataFrame> {
        let mut new_df = DataFrame::named(format!("{}_selected", self.metadata.name));
        for name in column_names {
            let column = self
                .columns
                .get(name)
                .ok_or_else(|| FrameError::ColumnNotFound(name.clone()))?;
            new_df.add_column(name.clone(), column.as_ref().clone())?;
        }
        Ok(new_df)
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<DataFrame> {
        let mut new_df = DataFrame::named(format!("{}_filtered", self.metadata.name));
        for name in &self.column_order {
            let column = self.columns[name].select_rows(indices)?;
            new_df.add_column(name.clone(), column)?;
        }
        Ok(new_df)
    }

    pub fn filter<P>(&self, predicate: P) -> Result<DataFrame>
    where
        P: Fn(usize) -> bool + Send + Sync,
    {
        let indices: Vec<usize> = (0..self.row_count())
            .into_par_iter()
            .filter(|&i| predicate(i))
            .collect();
        self.select_rows(&indices)
    }

    pub fn head(&self, limit: usize) -> Result<DataFrame> {
        let take = std::cmp::min(limit, self.row_count());
        let indices: Vec<usize> = (0..take).collect();
        self.select_rows(&indices)
    }

    pub fn sort_by(&self, column_name: &str, ascending: bool) -> Result<DataFrame> {
        let column = self
            .get_column(column_name)
            .ok_or_else(|| FrameError::ColumnNotFound(column_name.to_string()))?;
        let mut indices: Vec<usize> = (0..self.row_count()).collect();
        indices.par_sort_by(|&a, &b| {
            let cmp = match (column.to_f64(a), column.to_f64(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                _ => {
                    let val_a = column.get_string(a);
                    let val_b = column.get_string(b);
                    match (val_a, val_b) {
                        (Some(a), Some(b)) => a.cmp(&b),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    }
                }
            };
            if ascending {
                cmp
            } else {
                cmp.reverse()
            }
        });
        self.select_rows(&indices)
    }

    /// All values of one row, in column order.
    pub fn row_values(&self, index: usize) -> Vec<Option<String>> {
        self.column_order
            .iter()
            .map(|name| self.columns[name].get_string(index))
            .collect()
    }

    /// Plain-text table of the first `limit` rows, used verbatim in
    /// model prompts and terminal output.
    pub fn render_sample(&self, limit: usize) -> String {
        let sample_size = std::cmp::min(limit, self.row_count());
        let header = self.column_order.join(" | ");
        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');
        out.push_str(&"-".repeat(header.len()));
        out.push('\n');
        for i in 0..sample_size {
            let row: Vec<String> = self
                .row_values(i)
                .into_iter()
                .map(|v| v.unwrap_or_else(|| "NULL".to_string()))
                .collect();
            out.push_str(&row.join(" | "));
            out.push('\n');
        }
        if self.row_count() > sample_size {
            out.push_str(&format!("... ({} more rows)\n", self.row_count() - sample_size));
        }
        out
    }

    /// "name: type" lines describing the schema, one column per line.
    pub fn render_schema(&self) -> String {
        self.column_order
            .iter()
            .map(|name| format!("{}: {}", name, self.columns[name].data_type()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::common::DataType;

    fn sample_frame() -> DataFrame {
        let mut df = DataFrame::named("sample");
        df.add_column(
            "city".to_string(),
            Column::from_strings(
                &[
                    Some("Turku".to_string()),
                    Some("Espoo".to_string()),
                    Some("Turku".to_string()),
                ],
                DataType::String,
            )
            .unwrap(),
        )
        .unwrap();
        df.add_column(
            "count".to_string(),
            Column::Int64(vec![Some(3), Some(1), Some(2)].into()),
        )
        .unwrap();
        df
    }

    #[test]
    fn add_column_rejects_length_mismatch() {
        let mut df = sample_frame();
        let short = Column::Int64(vec![Some(1)].into());
        assert!(df.add_column("bad".to_string(), short).is_err());
    }

    #[test]
    fn filter_returns_new_frame_and_keeps_source() {
        let df = sample_frame();
        let city = df.get_column("city").unwrap().clone();
        let filtered = df
            .filter(|i| city.get_string(i).as_deref() == Some("Turku"))
            .unwrap();
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(df.row_count(), 3);
        assert_eq!(filtered.column_names(), df.column_names());
    }

    #[test]
    fn sort_by_numeric_descending() {
        let df = sample_frame();
        let sorted = df.sort_by("count", false).unwrap();
        assert_eq!(sorted.get_column("count").unwrap().get_string(0).as_deref(), Some("3"));
        assert_eq!(sorted.get_column("count").unwrap().get_string(2).as_deref(), Some("1"));
    }

    #[test]
    fn head_is_bounded_by_row_count() {
        let df = sample_frame();
        assert_eq!(df.head(2).unwrap().row_count(), 2);
        assert_eq!(df.head(10).unwrap().row_count(), 3);
        assert_eq!(df.head(0).unwrap().row_count(), 0);
    }

    #[test]
    fn render_sample_lists_header_and_rows() {
        let df = sample_frame();
        let text = df.render_sample(2);
        assert!(text.starts_with("city | count"));
        assert!(text.contains("Turku | 3"));
        assert!(text.contains("1 more rows"));
    }

    #[test]
    fn render_schema_lists_types() {
        let df = sample_frame();
        let schema = df.render_schema();
        assert!(schema.contains("city: string"));
        assert!(schema.contains("count: int64"));
    }
}
