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

use crate::frame::common::{DataType, FrameError, Result};
use rayon::prelude::*;
use std::sync::Arc;

/// Immutable typed column storage. Cloning a column only bumps the
/// reference count of the underlying slice.
#[derive(Debug, Clone)]
pub enum Column {
    Int64(Arc<[Option<i64>]>),
    Float64(Arc<[Option<f64>]>),
    String(Arc<[Option<Arc<str>>]>),
    Boolean(Arc<[Option<bool>]>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int64(data) => data.len(),
            Column::Float64(data) => data.len(),
            Column::String(data) => data.len(),
            Column::Boolean(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::String(_) => DataType::String,
            Column::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            Column::Int64(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Float64(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::String(data) => data.par_iter().filter(|v| v.is_none()).count(),
            Column::Boolean(data) => data.par_iter().filter(|v| v.is_none()).count(),
        }
    }

    pub fn get_string(&self, index: usize) -> Option<String> {
        match self {
            Column::Int64(data) => data.get(index)?.as_ref().map(|v| v.to_string()),
            Column::Float64(data) => data.get(index)?.as_ref().map(|v| v.to_string()),
            Column::String(data) => data.get(index)?.as_ref().map(|s| s.to_string()),
            Column::Boolean(data) => data.get(index)?.as_ref().map(|v| v.to_string()),
        }
    }

    pub fn to_f64(&self, index: usize) -> Option<f64> {
        match self {
            Column::Int64(data) => data.get(index).and_then(|opt| opt.map(|v| v as f64)),
            Column::Float64(data) => data.get(index).copied()?,
            Column::String(data) => data
                .get(index)
                .and_then(|opt| opt.as_ref().and_then(|s| s.parse::<f64>().ok())),
            Column::Boolean(data) => data
                .get(index)
                .and_then(|opt| opt.map(|v| if v { 1.0 } else { 0.0 })),
        }
    }

    pub fn from_strings(values: &[Option<String>], data_type: DataType) -> Result<Self> {
        Ok(match data_type {
            DataType::Int64 => {
                let parsed: Result<Vec<Option<i64>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => s.trim().parse::<i64>().map(Some).map_err(|e| e.into()),
                    })
                    .collect();
                Column::Int64(parsed?.into())
            }
            DataType::Float64 => {
                let parsed: Result<Vec<Option<f64>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => s.trim().parse::<f64>().map(Some).map_err(|e| e.into()),
                    })
                    .collect();
                Column::Float64(parsed?.into())
            }
            DataType::Boolean => {
                let parsed: Result<Vec<Option<bool>>> = values
                    .par_iter()
                    .map(|opt_str| match opt_str {
                        None => Ok(None),
                        Some(s) if s.trim().is_empty() => Ok(None),
                        Some(s) => match s.trim().to_lowercase().as_str() {
                            "true" | "t" | "1" | "yes" | "y" => Ok(Some(true)),
                            "false" | "f" | "0" | "no" | "n" => Ok(Some(false)),
                            _ => Err(FrameError::Parse(format!("Cannot parse '{s}' as boolean"))),
                        },
                    })
                    .collect();
                Column::Boolean(parsed?.into())
            }
            DataType::String => {
                let strings: Vec<Option<Arc<str>>> = values
                    .iter()
                    .map(|opt| opt.as_ref().map(|s| Arc::from(s.as_str())))
                    .collect();
                Column::String(strings.into())
            }
        })
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Column> {
        let bound = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= bound) {
            return Err(FrameError::OutOfBounds(bad));
        }
        Ok(match self {
            Column::Int64(data) => Column::Int64(
                indices
                    .par_iter()
                    .map(|&i| data[i])
                    .collect::<Vec<_>>()
                    .into(),
            ),
            Column::Float64(data) => Column::Float64(
                indices
                    .par_iter()
                    .map(|&i| data[i])
                    .collect::<Vec<_>>()
                    .into(),
            ),
            Column::String(data) => Column::String(
                indices
                    .par_iter()
                    .map(|&i| data[i].clone())
                    .collect::<Vec<_>>()
                    .into(),
            ),
            Column::Boolean(data) => Column::Boolean(
                indices
                    .par_iter()
                    .map(|&i| data[i])
                    .collect::<Vec<_>>()
                    .into(),
            ),
        })
    }
}

#[derive(Debug, Default)]
pub struct ColumnBuilder {
    values: Vec<Option<String>>,
    inferred_type: Option<DataType>,
}

impl ColumnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            inferred_type: None,
        }
    }

    pub fn push(&mut self, value: Option<String>) {
        if self.inferred_type.is_none() {
            if let Some(ref sample) = value {
                self.inferred_type = Some(Self::infer_type(sample));
            }
        }
        self.values.push(value);
    }

    pub fn build(self) -> Result<Column> {
        let data_type = self.inferred_type.unwrap_or(DataType::String);
        match Column::from_strings(&self.values, data_type) {
            Ok(column) => Ok(column),
            // A later value broke the inference from the first row; a text
            // column always holds.
            Err(_) => Column::from_strings(&self.values, DataType::String),
        }
    }

    fn infer_type(sample: &str) -> DataType {
        let trimmed = sample.trim();
        if trimmed.parse::<i64>().is_ok() {
            DataType::Int64
        } else if trimmed.parse::<f64>().is_ok() {
            DataType::Float64
        } else if matches!(trimmed.to_lowercase().as_str(), "true" | "false") {
            DataType::Boolean
        } else {
            DataType::String
        }
    }
}
