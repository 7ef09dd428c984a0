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

//! Keyword classification rules the model proposes for a question, and
//! their row-wise application. Category order is meaningful: the first
//! matching category wins.

use crate::frame::{Column, DataFrame, DataType};
use crate::frame::common::Result as FrameResult;
use serde::{Deserialize, Serialize};

/// Label applied when no keyword set matches and no catch-all is
/// declared.
pub const UNCLASSIFIED: &str = "unclassified";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub columns: Vec<DerivedColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    /// Case-insensitive substrings. An empty list marks this category
    /// as the declared catch-all.
    pub keywords: Vec<String>,
}

impl DerivedColumn {
    /// Classify one text. Total: always yields exactly one label.
    pub fn classify(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        for category in &self.categories {
            if category.keywords.is_empty() {
                continue;
            }
            if category
                .keywords
                .iter()
                .any(|keyword| lowered.contains(&keyword.to_lowercase()))
            {
                return category.label.clone();
            }
        }
        self.categories
            .iter()
            .find(|category| category.keywords.is_empty())
            .map(|category| category.label.clone())
            .unwrap_or_else(|| UNCLASSIFIED.to_string())
    }
}

impl RuleSet {
    /// Append every derived column to a copy of the frame.
    pub fn apply(&self, frame: &DataFrame, texts: &[String]) -> FrameResult<DataFrame> {
        let mut enriched = frame.clone();
        for derived in &self.columns {
            let labels: Vec<Option<String>> = texts
                .iter()
                .map(|text| Some(derived.classify(text)))
                .collect();
            let column = Column::from_strings(&labels, DataType::String)?;
            enriched.add_column(derived.name.clone(), column)?;
        }
        Ok(enriched)
    }
}

pub const INDUCTION_SYSTEM_PROMPT: &str = r#"You are a data analyst. Given a user question and the values of a text column, propose keyword classification rules that split the texts into categories useful for answering the question.

Output format MUST be a JSON object:
{
    "columns": [
        {
            "name": "<derived column name>",
            "categories": [
                {"label": "<category>", "keywords": ["<substring>", "..."]},
                {"label": "<fallback category>", "keywords": []}
            ]
        }
    ]
}

Rules:
- Keywords are matched as case-insensitive substrings, in the order the categories are listed; the first match wins.
- A category with an empty keyword list is the default for texts matching nothing else. It is optional.
- Category labels must be in the language of the user question."#;
