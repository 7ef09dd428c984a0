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

use crate::frame::{DataFrame, FrameError};
use crate::plan::ChartSpec;
use serde::{Deserialize, Serialize};

/// Renderable chart description. Built only from the aggregated table,
/// never from the raw input, so every plotted value is traceable to an
/// aggregation the interpreter actually ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub kind: String,
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub traces: Vec<Trace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub name: Option<String>,
    pub x: Vec<String>,
    pub y: Vec<f64>,
}

impl Figure {
    /// Build a figure from an aggregated frame. `x` defaults to the
    /// first column, `y` to the first numeric-readable column other
    /// than `x`.
    pub fn from_frame(
        kind: &str,
        spec: &ChartSpec,
        frame: &DataFrame,
    ) -> Result<Self, FrameError> {
        let x_name = match &spec.x {
            Some(name) => name.clone(),
            None => frame
                .column_names()
                .first()
                .cloned()
                .ok_or_else(|| FrameError::InvalidOperation("Frame has no columns".to_string()))?,
        };
        let x_column = frame
            .get_column(&x_name)
            .ok_or_else(|| FrameError::ColumnNotFound(x_name.clone()))?;

        let y_name = match &spec.y {
            Some(name) => name.clone(),
            None => frame
                .column_names()
                .iter()
                .find(|name| {
                    **name != x_name
                        && frame
                            .get_column(name)
                            .is_some_and(|c| (0..c.len()).any(|i| c.to_f64(i).is_some()))
                })
                .cloned()
                .ok_or_else(|| {
                    FrameError::InvalidOperation(
                        "No numeric column available for the value axis".to_string(),
                    )
                })?,
        };
        let y_column = frame
            .get_column(&y_name)
            .ok_or_else(|| FrameError::ColumnNotFound(y_name.clone()))?;

        let mut xs = Vec::with_capacity(frame.row_count());
        let mut ys = Vec::with_capacity(frame.row_count());
        for i in 0..frame.row_count() {
            let Some(y) = y_column.to_f64(i) else {
                continue;
            };
            xs.push(x_column.get_string(i).unwrap_or_else(|| "NULL".to_string()));
            ys.push(y);
        }

        Ok(Self {
            kind: kind.to_string(),
            title: spec.title.clone(),
            x_label: spec.x_label.clone().or(Some(x_name)),
            y_label: spec.y_label.clone().or(Some(y_name)),
            traces: vec![Trace {
                name: None,
                x: xs,
                y: ys,
            }],
        })
    }
}
