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

//! The visualisation plan the model is asked to emit: a small data
//! document instead of executable source. Trusted code interprets it,
//! so every charted value is forced through a real aggregation over
//! the frame.

use crate::frame::{AggregateOperation, FilterCondition, SortSpec};
use serde::{Deserialize, Serialize};

/// The three contracted bindings. Each is optional at the parse level:
/// the executor fills benign defaults rather than rejecting a plan
/// that omits one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VizPlan {
    #[serde(default)]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub aggregation: Option<AggregationPlan>,
    #[serde(default)]
    pub chart: Option<ChartSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationPlan {
    #[serde(default)]
    pub filter: Option<Vec<FilterCondition>>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregations: Vec<AggregateOperation>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
}

impl VizPlan {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AggregateFunction;

    #[test]
    fn full_plan_deserialises() {
        let text = r#"{
            "chart_type": "bar",
            "aggregation": {
                "filter": [{"column": "Status", "operator": "equal", "value": "Open"}],
                "group_by": ["Division"],
                "aggregations": [{"column": "Id", "function": "count", "alias": "Total"}],
                "sort": {"by": "Total", "ascending": false},
                "limit": 10
            },
            "chart": {"x": "Division", "y": "Total", "title": "Open observations"}
        }"#;
        let plan = VizPlan::from_json(text).unwrap();
        assert_eq!(plan.chart_type.as_deref(), Some("bar"));
        let aggregation = plan.aggregation.unwrap();
        assert_eq!(aggregation.group_by, ["Division"]);
        assert_eq!(aggregation.aggregations[0].function, AggregateFunction::Count);
        assert_eq!(aggregation.limit, Some(10));
        assert!(!aggregation.sort.unwrap().ascending);
        assert_eq!(plan.chart.unwrap().x.as_deref(), Some("Division"));
    }

    #[test]
    fn minimal_plan_deserialises_with_defaults() {
        let plan = VizPlan::from_json(r#"{"chart_type": "bar"}"#).unwrap();
        assert_eq!(plan.chart_type.as_deref(), Some("bar"));
        assert!(plan.aggregation.is_none());
        assert!(plan.chart.is_none());
    }

    #[test]
    fn sort_defaults_to_ascending() {
        let plan = VizPlan::from_json(
            r#"{"aggregation": {"group_by": ["A"], "aggregations": [], "sort": {"by": "A"}}}"#,
        )
        .unwrap();
        assert!(plan.aggregation.unwrap().sort.unwrap().ascending);
    }
}
