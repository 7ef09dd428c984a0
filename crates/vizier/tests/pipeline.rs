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

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use vizier::enrich::{CLUSTER_ID_COLUMN, CLUSTER_NAME_COLUMN};
use vizier::frame::{Column, DataFrame, DataType};
use vizier::{
    EnrichmentEngine, HashEmbedding, LLMAdapter, PipelineConfig, Visualizer, VizError,
};
use vizier_contracts::{LLMError, LLMRequest, LLMResponse, LLMResult, ResponseMetadata, Usage};

/// Replays a scripted sequence of model replies, one per request.
struct ScriptedAdapter {
    replies: Mutex<VecDeque<LLMResult<String>>>,
}

impl ScriptedAdapter {
    fn new(replies: Vec<LLMResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl LLMAdapter for ScriptedAdapter {
    async fn generate(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::Internal("Script exhausted".to_string())));
        reply.map(|content| LLMResponse {
            id: uuid::Uuid::new_v4(),
            request_id: request.id,
            content,
            model_used: "scripted".to_string(),
            usage: Usage::default(),
            metadata: ResponseMetadata::default(),
            created_at: chrono::Utc::now(),
        })
    }
}

fn observations() -> DataFrame {
    let mut df = DataFrame::named("observations");
    df.add_column(
        "Description".to_string(),
        Column::from_strings(
            &[
                Some("Slipped on wet floor".to_string()),
                Some("Tripped over cable".to_string()),
                Some("Fell down stairs".to_string()),
                Some("Cut finger on paper".to_string()),
                Some("Burned hand on stove".to_string()),
            ],
            DataType::String,
        )
        .unwrap(),
    )
    .unwrap();
    df.add_column(
        "Division".to_string(),
        Column::from_strings(
            &[
                Some("Plant A".to_string()),
                Some("Plant A".to_string()),
                Some("Plant B".to_string()),
                Some("Plant B".to_string()),
                Some("Plant B".to_string()),
            ],
            DataType::String,
        )
        .unwrap(),
    )
    .unwrap();
    df
}

fn engine(replies: Vec<LLMResult<String>>) -> EnrichmentEngine {
    EnrichmentEngine::new(ScriptedAdapter::new(replies), Arc::new(HashEmbedding::default()))
}

#[tokio::test]
async fn enrichment_adds_cluster_columns_without_losing_rows() {
    let engine = engine(vec![Ok(
        r#"{"Cluster 0": "Falls", "Cluster 1": "Hand injuries"}"#.to_string(),
    )]);
    let df = observations();
    let enriched = engine.enrich(&df, "Description", 2).await.unwrap();

    assert_eq!(enriched.row_count(), df.row_count());
    assert!(enriched.has_column("Description"));
    assert!(enriched.has_column("Division"));
    let ids = enriched.get_column(CLUSTER_ID_COLUMN).unwrap();
    assert_eq!(ids.null_count(), 0);
    for i in 0..enriched.row_count() {
        let id: i64 = ids.get_string(i).unwrap().parse().unwrap();
        assert!((0..2).contains(&id));
    }
    let names = enriched.get_column(CLUSTER_NAME_COLUMN).unwrap();
    for i in 0..enriched.row_count() {
        assert!(!names.get_string(i).unwrap().is_empty());
    }
    // The caller's frame is untouched.
    assert!(!df.has_column(CLUSTER_ID_COLUMN));
}

#[tokio::test]
async fn enrichment_with_missing_column_is_a_configuration_error() {
    let engine = engine(vec![]);
    let df = observations();
    let err = engine.enrich(&df, "DoesNotExist", 2).await.unwrap_err();
    assert!(matches!(err, VizError::Config(_)));
    assert!(err.to_string().contains("DoesNotExist"));
    assert_eq!(df.column_count(), 2);
}

#[tokio::test]
async fn failed_cluster_naming_returns_unenriched_copy() {
    let engine = engine(vec![Err(LLMError::Network("offline".to_string()))]);
    let df = observations();
    let enriched = engine.enrich(&df, "Description", 2).await.unwrap();
    assert_eq!(enriched.row_count(), df.row_count());
    assert_eq!(enriched.column_names(), df.column_names());
}

#[tokio::test]
async fn garbage_naming_response_degrades_to_generic_names() {
    let engine = engine(vec![Ok("not json at all".to_string())]);
    let enriched = engine.enrich(&observations(), "Description", 2).await.unwrap();
    let names = enriched.get_column(CLUSTER_NAME_COLUMN).unwrap();
    for i in 0..enriched.row_count() {
        assert!(names.get_string(i).unwrap().starts_with("Group "));
    }
}

#[tokio::test]
async fn rule_enrichment_labels_every_row() {
    let reply = r#"{"columns": [{"name": "Injury_Type", "categories": [
        {"label": "Fall", "keywords": ["slip", "trip", "fell"]},
        {"label": "Other", "keywords": []}
    ]}]}"#;
    let engine = engine(vec![Ok(reply.to_string())]);
    let enriched = engine
        .enrich_with_rules(&observations(), "Description", "What injuries happen?")
        .await
        .unwrap();
    let labels = enriched.get_column("Injury_Type").unwrap();
    assert_eq!(labels.null_count(), 0);
    assert_eq!(labels.get_string(0).as_deref(), Some("Fall"));
    assert_eq!(labels.get_string(3).as_deref(), Some("Other"));
}

#[tokio::test]
async fn failed_rule_induction_returns_unenriched_copy() {
    let engine = engine(vec![Err(LLMError::RateLimit)]);
    let df = observations();
    let enriched = engine
        .enrich_with_rules(&df, "Description", "What injuries happen?")
        .await
        .unwrap();
    assert_eq!(enriched.row_count(), df.row_count());
    assert_eq!(enriched.column_names(), df.column_names());
}

fn visualizer(replies: Vec<LLMResult<String>>, config: PipelineConfig) -> Visualizer {
    Visualizer::with_config(
        ScriptedAdapter::new(replies),
        Arc::new(HashEmbedding::default()),
        config,
    )
}

#[tokio::test]
async fn visualize_runs_all_three_stages() {
    let naming = r#"{"Cluster 0": "Falls", "Cluster 1": "Hand injuries"}"#;
    let plan = r#"{
        "chart_type": "bar",
        "aggregation": {"group_by": ["Division"], "aggregations": [
            {"column": "Description", "function": "count", "alias": "Observations"}
        ]},
        "chart": {"x": "Division", "y": "Observations", "title": "Observations by division"}
    }"#;
    let visualizer = visualizer(
        vec![Ok(naming.to_string()), Ok(plan.to_string())],
        PipelineConfig::default()
            .with_text_column("Description")
            .with_cluster_count(2),
    );
    let df = observations();
    let result = visualizer.visualize("Show observations by division", &df).await.unwrap();

    assert_eq!(result.chart_type, "bar");
    assert_eq!(result.plot_data.row_count(), 2);
    let totals = result.plot_data.get_column("Observations").unwrap();
    assert_eq!(totals.get_string(0).as_deref(), Some("2"));
    assert_eq!(totals.get_string(1).as_deref(), Some("3"));
    let figure = result.figure.as_ref().unwrap();
    assert_eq!(figure.kind, "bar");
    assert_eq!(figure.traces[0].y, [2.0, 3.0]);
    assert!(!result.plan_text.is_empty());
    assert!(!df.has_column(CLUSTER_ID_COLUMN));
}

#[tokio::test]
async fn visualize_without_text_column_skips_enrichment() {
    let plan = r#"{"chart_type": "bar"}"#;
    let visualizer = visualizer(vec![Ok(plan.to_string())], PipelineConfig::default());
    let result = visualizer.visualize("anything", &observations()).await.unwrap();
    assert_eq!(result.chart_type, "bar");
    assert_eq!(result.plot_data.row_count(), 0);
    assert!(result.figure.is_none());
}

#[tokio::test]
async fn generation_failure_stops_the_pipeline() {
    let visualizer = visualizer(
        vec![Err(LLMError::Network("connection refused".to_string()))],
        PipelineConfig::default(),
    );
    let err = visualizer.visualize("anything", &observations()).await.unwrap_err();
    assert!(matches!(err, VizError::Llm(_)));
}

#[tokio::test]
async fn bad_plan_surfaces_as_execution_error_with_description() {
    let plan = r#"{"chart_type": "bar", "aggregation": {"group_by": ["Department"], "aggregations": []}}"#;
    let visualizer = visualizer(vec![Ok(plan.to_string())], PipelineConfig::default());
    let err = visualizer.visualize("anything", &observations()).await.unwrap_err();
    let VizError::Execution(description) = err else {
        panic!("expected execution error, got {err}");
    };
    assert!(description.contains("Department"));
}
