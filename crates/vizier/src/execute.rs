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

//! Constrained execution of generated plans. The interpreter sees the
//! input frame and the aggregation/figure code, nothing else, and it
//! never lets a failure escape as anything but a structured outcome.

use crate::figure::Figure;
use crate::frame::{DataFrame, GroupByOperation, TransformationEngine};
use crate::plan::VizPlan;
use tracing::{debug, error};

/// Chart kind reported when the plan omits one.
pub const UNKNOWN_CHART_KIND: &str = "Unknown";

/// What one execution produced: either the three contracted bindings
/// (defaults filled where the plan left gaps) or an error description.
#[derive(Debug)]
pub enum VizOutcome {
    Success(VizResult),
    Failure { error: String },
}

#[derive(Debug)]
pub struct VizResult {
    pub chart_type: String,
    pub plot_data: DataFrame,
    pub figure: Option<Figure>,
    pub plan_text: String,
}

impl VizOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VizOutcome::Success(_))
    }
}

#[derive(Debug, Default)]
pub struct PlanExecutor {
    engine: TransformationEngine,
}

impl PlanExecutor {
    pub fn new() -> Self {
        Self {
            engine: TransformationEngine::new(),
        }
    }

    /// Run plan text against a frame. Always returns an outcome record;
    /// the error branch carries the failure description and the full
    /// diagnostic goes to the log.
    pub fn execute(&self, plan_text: &str, frame: &DataFrame) -> VizOutcome {
        match self.try_execute(plan_text, frame) {
            Ok(result) => VizOutcome::Success(result),
            Err(description) => {
                error!("Plan execution failed: {description}\nPlan:\n{plan_text}");
                VizOutcome::Failure { error: description }
            }
        }
    }

    fn try_execute(&self, plan_text: &str, frame: &DataFrame) -> Result<VizResult, String> {
        let plan = VizPlan::from_json(plan_text)
            .map_err(|e| format!("Malformed plan: {e}"))?;

        let chart_type = plan
            .chart_type
            .clone()
            .filter(|kind| !kind.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_CHART_KIND.to_string());

        let plot_data = match &plan.aggregation {
            Some(aggregation) => {
                let mut working = match &aggregation.filter {
                    Some(conditions) if !conditions.is_empty() => self
                        .engine
                        .filter(frame, conditions)
                        .map_err(|e| e.to_string())?,
                    _ => frame.clone(),
                };
                if !aggregation.group_by.is_empty() {
                    working = self
                        .engine
                        .group_by(
                            &working,
                            &GroupByOperation {
                                group_columns: aggregation.group_by.clone(),
                                aggregations: aggregation.aggregations.clone(),
                            },
                        )
                        .map_err(|e| e.to_string())?;
                }
                if let Some(sort) = &aggregation.sort {
                    working = working
                        .sort_by(&sort.by, sort.ascending)
                        .map_err(|e| e.to_string())?;
                }
                if let Some(limit) = aggregation.limit {
                    working = working.head(limit).map_err(|e| e.to_string())?;
                }
                working
            }
            None => {
                debug!("Plan has no aggregation step, returning an empty table");
                DataFrame::named(format!("{}_empty", frame.metadata.name))
            }
        };

        let figure = match &plan.chart {
            Some(spec) => {
                Some(Figure::from_frame(&chart_type, spec, &plot_data).map_err(|e| e.to_string())?)
            }
            None => None,
        };

        Ok(VizResult {
            chart_type,
            plot_data,
            figure,
            plan_text: plan_text.to_string(),
        })
    }
}
