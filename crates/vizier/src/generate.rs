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

use crate::config::ColumnDescription;
use crate::error::Result;
use crate::frame::DataFrame;
use crate::llm::scrub::{extract_json_object, strip_code_fences};
use crate::llm::LLMAdapter;
use std::sync::Arc;
use tracing::{debug, info};
use vizier_contracts::{LLMRequest, ResponseFormat};

/// Builds a schema- and sample-aware prompt and asks the model for a
/// visualisation plan. The output contract lives in the instructions;
/// the executor, not this component, deals with plans that break it.
pub struct PlanGenerator {
    llm: Arc<dyn LLMAdapter>,
    temperature: f32,
    sample_rows: usize,
    column_descriptions: Vec<ColumnDescription>,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LLMAdapter>) -> Self {
        Self {
            llm,
            temperature: 0.0,
            sample_rows: 3,
            column_descriptions: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    pub fn with_column_descriptions(mut self, descriptions: Vec<ColumnDescription>) -> Self {
        self.column_descriptions = descriptions;
        self
    }

    /// One round-trip to the model. Upstream failures propagate; this
    /// stage has no retry of its own.
    pub async fn generate(&self, query: &str, frame: &DataFrame) -> Result<String> {
        debug!("Frame columns: {:?}", frame.column_names());
        let system_prompt = self.build_system_prompt();
        let user_message = self.build_user_message(query, frame);

        info!("Requesting visualisation plan for query: {query}");
        let request = LLMRequest::new(system_prompt, user_message)
            .with_temperature(self.temperature)
            .with_response_format(ResponseFormat::JsonObject);
        let response = self.llm.generate(request).await?;

        let plan_text = extract_json_object(&response.content)
            .unwrap_or_else(|| strip_code_fences(&response.content));
        debug!("Generated plan:\n{plan_text}");
        Ok(plan_text)
    }

    fn build_system_prompt(&self) -> String {
        let mut prompt = String::from(
            r#"You are a data visualisation architect. Your task is to produce a JSON visualisation plan for a tabular dataset, answering the user's question.

"#,
        );
        if !self.column_descriptions.is_empty() {
            prompt.push_str("COLUMN DESCRIPTIONS (context):\n");
            for description in &self.column_descriptions {
                prompt.push_str(&format!("- {}: {}\n", description.name, description.meaning));
            }
            prompt.push('\n');
        }
        prompt.push_str(
            r#"INSTRUCTIONS:
1. Analyse the user's question to determine the best chart type.
   - Trends over time -> "line" (group by the timestamp column)
   - Comparisons or counts -> "bar"
   - Proportions -> "pie"
2. STRICTLY NO INVENTED DATA. The plotted values must come from the "aggregation" section, which is executed against the real dataset. Only reference columns that exist in the data structure below.
3. OUTPUT FORMAT: Return ONLY a JSON object with exactly these three keys:
   - "chart_type" (string): e.g. "bar", "line", "pie".
   - "aggregation": {"filter": [{"column", "operator", "value"}, ...] (optional), "group_by": [columns], "aggregations": [{"column", "function", "alias"}], "sort": {"by", "ascending"} (optional), "limit": N (optional)}.
     Allowed operators: equal, not_equal, greater_than, less_than, greater_than_or_equal, less_than_or_equal, contains.
     Allowed functions: count, sum, mean, min, max, count_distinct.
   - "chart": {"x", "y", "title", "x_label", "y_label"} referring to columns of the AGGREGATED table (group columns and aliases).
4. LANGUAGE: the title and axis labels must be in the language of the user's question.
5. Do not use markdown formatting or code fences.

Example:
User asks: "Show observations by division"
{"chart_type": "bar", "aggregation": {"group_by": ["Division"], "aggregations": [{"column": "Id", "function": "count", "alias": "Observations"}]}, "chart": {"x": "Division", "y": "Observations", "title": "Observations by division"}}
"#,
        );
        prompt
    }

    fn build_user_message(&self, query: &str, frame: &DataFrame) -> String {
        format!(
            "User question: \"{query}\"\n\nData structure:\n{}\n\nData sample:\n{}\nProduce the visualisation plan now:",
            frame.render_schema(),
            frame.render_sample(self.sample_rows)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, DataType};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vizier_contracts::{LLMError, LLMResponse, LLMResult, ResponseMetadata, Usage};

    #[derive(Default)]
    struct RecordingAdapter {
        reply: String,
        requests: Mutex<Vec<LLMRequest>>,
    }

    #[async_trait]
    impl LLMAdapter for RecordingAdapter {
        async fn generate(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.reply.is_empty() {
                return Err(LLMError::Network("offline".to_string()));
            }
            Ok(LLMResponse {
                id: uuid::Uuid::new_v4(),
                request_id: request.id,
                content: self.reply.clone(),
                model_used: "mock".to_string(),
                usage: Usage::default(),
                metadata: ResponseMetadata::default(),
                created_at: chrono::Utc::now(),
            })
        }
    }

    fn frame() -> DataFrame {
        let mut df = DataFrame::named("observations");
        df.add_column(
            "Division".to_string(),
            Column::from_strings(
                &[Some("Plant A".to_string()), Some("Plant B".to_string())],
                DataType::String,
            )
            .unwrap(),
        )
        .unwrap();
        df
    }

    #[tokio::test]
    async fn prompt_carries_query_schema_and_sample() {
        let adapter = Arc::new(RecordingAdapter {
            reply: r#"{"chart_type": "bar"}"#.to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let generator = PlanGenerator::new(adapter.clone())
            .with_column_descriptions(vec![ColumnDescription::new("Division", "department")]);
        generator.generate("Näytä havainnot", &frame()).await.unwrap();

        let requests = adapter.requests.lock().unwrap();
        let request = &requests[0];
        assert!(request.prompt.contains("Näytä havainnot"));
        assert!(request.prompt.contains("Division: string"));
        assert!(request.prompt.contains("Plant A"));
        assert_eq!(request.generation_config.temperature, Some(0.0));
        assert_eq!(request.response_format, ResponseFormat::JsonObject);
        let system = request.system_prompt.as_deref().unwrap();
        assert!(system.contains("Division: department"));
        assert!(system.contains("chart_type"));
    }

    #[tokio::test]
    async fn fenced_reply_is_stripped_to_bare_json() {
        let adapter = Arc::new(RecordingAdapter {
            reply: "```json\n{\"chart_type\": \"pie\"}\n```".to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let generator = PlanGenerator::new(adapter);
        let plan_text = generator.generate("q", &frame()).await.unwrap();
        assert_eq!(plan_text, "{\"chart_type\": \"pie\"}");
    }

    #[tokio::test]
    async fn upstream_failure_propagates() {
        let adapter = Arc::new(RecordingAdapter::default());
        let generator = PlanGenerator::new(adapter);
        let err = generator.generate("q", &frame()).await.unwrap_err();
        assert!(matches!(err, crate::error::VizError::Llm(_)));
    }
}
