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

use crate::frame::FrameError;
use thiserror::Error;
use vizier_contracts::LLMError;

/// Pipeline error taxonomy. Configuration errors are fatal and raised
/// immediately; upstream model errors propagate from generation but are
/// absorbed inside enrichment; execution errors are contained at the
/// executor boundary and only reach here through the orchestrator's
/// own re-raise.
#[derive(Debug, Error)]
pub enum VizError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Language model error: {0}")]
    Llm(#[from] LLMError),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, VizError>;
