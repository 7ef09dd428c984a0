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
use std::fmt::Debug;
use vizier_contracts::{LLMRequest, LLMResponse, LLMResult};

/// Capability handle for one language-model backend. Constructed once,
/// shared by reference across the pipeline, and stateless between calls.
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn generate(&self, request: LLMRequest) -> LLMResult<LLMResponse>;
}

pub trait EmbeddingAdapter: Send + Sync + Debug {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic local embedding: folds bytes into a fixed-width vector
/// and L2-normalises. A stand-in for a real sentence encoder with the
/// same call shape.
#[derive(Debug)]
pub struct HashEmbedding {
    dim: usize,
}

impl HashEmbedding {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingAdapter for HashEmbedding {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            let idx = i % self.dim;
            vec[idx] += (byte as f32) / 255.0;
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}
