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

pub mod config;
pub mod enrich;
pub mod error;
pub mod execute;
pub mod figure;
pub mod frame;
pub mod generate;
pub mod llm;
pub mod plan;

pub use config::{ColumnDescription, PipelineConfig};
pub use enrich::EnrichmentEngine;
pub use error::{Result, VizError};
pub use execute::{PlanExecutor, VizOutcome, VizResult};
pub use figure::{Figure, Trace};
pub use frame::DataFrame;
pub use generate::PlanGenerator;
pub use llm::{EmbeddingAdapter, HashEmbedding, LLMAdapter, OpenRouterClient};
pub use plan::VizPlan;

use std::sync::Arc;
use tracing::{info, warn};

/// The pipeline entry point: enrich, generate, execute, in that order,
/// once per query. There is no cache and no retry; every call re-runs
/// the stages against the frame it is handed, so a stale plan can
/// never outlive a schema change.
pub struct Visualizer {
    enrichment: EnrichmentEngine,
    generator: PlanGenerator,
    executor: PlanExecutor,
    config: PipelineConfig,
}

impl Visualizer {
    pub fn new(llm: Arc<dyn LLMAdapter>, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self::with_config(llm, embedder, PipelineConfig::default())
    }

    pub fn with_config(
        llm: Arc<dyn LLMAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        config: PipelineConfig,
    ) -> Self {
        let enrichment = EnrichmentEngine::new(llm.clone(), embedder)
            .with_naming_temperature(config.naming_temperature)
            .with_cluster_sample_size(config.cluster_sample_size);
        let generator = PlanGenerator::new(llm)
            .with_temperature(config.generation_temperature)
            .with_sample_rows(config.sample_rows)
            .with_column_descriptions(config.column_descriptions.clone());
        Self {
            enrichment,
            generator,
            executor: PlanExecutor::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one question about one frame. Enrichment is best-effort;
    /// generation and execution failures stop the pipeline and surface
    /// as a single error carrying the inner description.
    pub async fn visualize(&self, query: &str, frame: &DataFrame) -> Result<VizResult> {
        info!("Visualisation request: {query}");

        let working = match &self.config.text_column {
            Some(text_column) => {
                self.enrichment
                    .enrich(frame, text_column, self.config.cluster_count)
                    .await?
            }
            None => frame.clone(),
        };

        let plan_text = self.generator.generate(query, &working).await?;

        match self.executor.execute(&plan_text, &working) {
            VizOutcome::Success(result) => {
                info!("Visualisation complete: {} chart", result.chart_type);
                Ok(result)
            }
            VizOutcome::Failure { error } => {
                warn!("Visualisation failed: {error}");
                Err(VizError::Execution(error))
            }
        }
    }
}
