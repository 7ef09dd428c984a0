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

//! Semantic enrichment: derive a category column from a text column,
//! either by clustering embeddings and asking the model to name the
//! clusters, or by asking the model for keyword classification rules
//! and applying them row by row.
//!
//! Enrichment is an optional enhancement. After input validation, a
//! failing model call degrades to the unenriched frame instead of
//! blocking the rest of the pipeline.

pub mod cluster;
pub mod rules;

use crate::error::{Result, VizError};
use crate::frame::{Column, DataFrame};
use crate::llm::scrub::extract_json_object;
use crate::llm::{EmbeddingAdapter, LLMAdapter};
use rules::RuleSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vizier_contracts::{LLMRequest, ResponseFormat};

/// Cluster id column added by embedding-based enrichment.
pub const CLUSTER_ID_COLUMN: &str = "Cluster_ID";
/// Human-readable cluster name column added alongside the ids.
pub const CLUSTER_NAME_COLUMN: &str = "Semantic_Cluster";

pub struct EnrichmentEngine {
    llm: Arc<dyn LLMAdapter>,
    embedder: Arc<dyn EmbeddingAdapter>,
    naming_temperature: f32,
    cluster_sample_size: usize,
}

impl EnrichmentEngine {
    pub fn new(llm: Arc<dyn LLMAdapter>, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self {
            llm,
            embedder,
            naming_temperature: 0.5,
            cluster_sample_size: 5,
        }
    }

    pub fn with_naming_temperature(mut self, temperature: f32) -> Self {
        self.naming_temperature = temperature;
        self
    }

    pub fn with_cluster_sample_size(mut self, sample_size: usize) -> Self {
        self.cluster_sample_size = sample_size;
        self
    }

    /// Embedding-based enrichment: cluster the text column into `k`
    /// groups and append `Cluster_ID` and `Semantic_Cluster` columns.
    /// The named column must exist; there is no silent substitution.
    pub async fn enrich(
        &self,
        frame: &DataFrame,
        text_column: &str,
        k: usize,
    ) -> Result<DataFrame> {
        let texts = self.column_texts(frame, text_column)?;
        info!(
            "Enriching column '{}' ({} rows) into {} clusters",
            text_column,
            texts.len(),
            k
        );

        let vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.embedder.embed(t)).collect();
        let assignments = cluster::kmeans(&vectors, k);

        // A malformed or partial naming response still yields labels
        // (generic ones fill the gaps), but a failed model call means
        // the caller gets its data back unenriched.
        let names = match self.name_clusters(&texts, &assignments, k).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Cluster naming failed, returning unenriched frame: {e}");
                return Ok(frame.clone());
            }
        };

        let mut enriched = frame.clone();
        let ids: Vec<Option<i64>> = assignments.iter().map(|&a| Some(a as i64)).collect();
        enriched.add_column(CLUSTER_ID_COLUMN.to_string(), Column::Int64(ids.into()))?;
        let labels: Vec<Option<std::sync::Arc<str>>> = assignments
            .iter()
            .map(|a| {
                Some(std::sync::Arc::from(
                    names
                        .get(a)
                        .cloned()
                        .unwrap_or_else(|| cluster::generic_name(*a))
                        .as_str(),
                ))
            })
            .collect();
        enriched.add_column(CLUSTER_NAME_COLUMN.to_string(), Column::String(labels.into()))?;
        Ok(enriched)
    }

    /// Rule-based enrichment: ask the model for keyword classification
    /// rules fitted to the question, then apply them row-wise. A model
    /// or parse failure returns a copy of the input unchanged.
    pub async fn enrich_with_rules(
        &self,
        frame: &DataFrame,
        text_column: &str,
        query: &str,
    ) -> Result<DataFrame> {
        let texts = self.column_texts(frame, text_column)?;

        let ruleset = match self.induce_rules(&texts, query).await {
            Ok(ruleset) => ruleset,
            Err(e) => {
                warn!("Rule induction failed, returning unenriched frame: {e}");
                return Ok(frame.clone());
            }
        };
        debug!(
            "Applying {} induced column rule(s)",
            ruleset.columns.len()
        );
        Ok(ruleset.apply(frame, &texts)?)
    }

    async fn name_clusters(
        &self,
        texts: &[String],
        assignments: &[usize],
        k: usize,
    ) -> Result<std::collections::HashMap<usize, String>> {
        let samples =
            cluster::render_cluster_samples(texts, assignments, k, self.cluster_sample_size);
        let request = LLMRequest::new(
            cluster::NAMING_SYSTEM_PROMPT,
            format!("Here are the samples:\n\n{samples}"),
        )
        .with_temperature(self.naming_temperature)
        .with_response_format(ResponseFormat::JsonObject);
        let response = self.llm.generate(request).await?;
        Ok(cluster::parse_cluster_names(&response.content, k))
    }

    async fn induce_rules(&self, texts: &[String], query: &str) -> Result<RuleSet> {
        let user_message = format!(
            "User question: \"{query}\"\n\nText column values:\n{}",
            texts
                .iter()
                .map(|t| format!("- {t}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let request = LLMRequest::new(rules::INDUCTION_SYSTEM_PROMPT, user_message)
            .with_temperature(0.0)
            .with_response_format(ResponseFormat::JsonObject);
        let response = self.llm.generate(request).await?;
        let object_text = extract_json_object(&response.content)
            .ok_or_else(|| VizError::Plan("No JSON object in rule response".to_string()))?;
        serde_json::from_str(&object_text)
            .map_err(|e| VizError::Plan(format!("Malformed rule response: {e}")))
    }

    /// All values of the text column as strings, nulls included as
    /// empty text so row indices stay aligned. Fails when the column
    /// does not exist.
    fn column_texts(&self, frame: &DataFrame, text_column: &str) -> Result<Vec<String>> {
        let column = frame.get_column(text_column).ok_or_else(|| {
            VizError::Config(format!(
                "Text column '{text_column}' not found in dataset '{}'",
                frame.metadata.name
            ))
        })?;
        Ok((0..frame.row_count())
            .map(|i| column.get_string(i).unwrap_or_default())
            .collect())
    }
}
