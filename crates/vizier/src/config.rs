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

use serde::{Deserialize, Serialize};

/// Tunables for one pipeline instance. Defaults match the behaviour the
/// system was calibrated with; override per instance, not per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Column whose text is embedded and clustered. `None` skips
    /// enrichment entirely.
    pub text_column: Option<String>,
    /// Fixed number of clusters for embedding-based enrichment.
    pub cluster_count: usize,
    /// Sampling temperature for plan generation. Kept at the minimum:
    /// the generator favours contract adherence over variation.
    pub generation_temperature: f32,
    /// Sampling temperature for cluster naming, where a little
    /// variation produces better labels.
    pub naming_temperature: f32,
    /// Rows rendered verbatim into the generation prompt.
    pub sample_rows: usize,
    /// Texts shown to the model per cluster when naming clusters.
    pub cluster_sample_size: usize,
    /// Caller-designated column meanings, rendered into the generation
    /// prompt so the model maps question intent onto real columns.
    pub column_descriptions: Vec<ColumnDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub meaning: String,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, meaning: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meaning: meaning.into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            text_column: None,
            cluster_count: 6,
            generation_temperature: 0.0,
            naming_temperature: 0.5,
            sample_rows: 3,
            cluster_sample_size: 5,
            column_descriptions: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn with_text_column(mut self, column: impl Into<String>) -> Self {
        self.text_column = Some(column.into());
        self
    }

    pub fn with_cluster_count(mut self, cluster_count: usize) -> Self {
        self.cluster_count = cluster_count;
        self
    }

    pub fn with_column_description(
        mut self,
        name: impl Into<String>,
        meaning: impl Into<String>,
    ) -> Self {
        self.column_descriptions
            .push(ColumnDescription::new(name, meaning));
        self
    }
}
