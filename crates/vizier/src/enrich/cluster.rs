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

use crate::llm::scrub::extract_json_object;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::debug;

pub(crate) const KMEANS_SEED: u64 = 42;
const KMEANS_MAX_ITERATIONS: usize = 50;

/// Centroid-based partition of the embedding set into at most `k`
/// groups. Returns one cluster id in `0..k` per input vector. The seed
/// is fixed so repeated enrichment of the same frame assigns the same
/// ids.
pub fn kmeans(vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
    if vectors.is_empty() || k == 0 {
        return vec![0; vectors.len()];
    }
    let dim = vectors[0].len();
    let k = k.min(vectors.len());
    let mut rng = StdRng::seed_from_u64(KMEANS_SEED);

    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    let mut chosen = std::collections::HashSet::new();
    while centroids.len() < k {
        let idx = rng.gen_range(0..vectors.len());
        if chosen.insert(idx) {
            centroids.push(vectors[idx].clone());
        }
    }

    let mut assignments = vec![0usize; vectors.len()];
    for iteration in 0..KMEANS_MAX_ITERATIONS {
        let mut changed = false;
        for (i, vector) in vectors.iter().enumerate() {
            let nearest = nearest_centroid(vector, &centroids);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }
        if !changed && iteration > 0 {
            debug!("k-means converged after {iteration} iterations");
            break;
        }

        let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (vector, &cluster) in vectors.iter().zip(&assignments) {
            counts[cluster] += 1;
            for (acc, v) in sums[cluster].iter_mut().zip(vector) {
                *acc += v;
            }
        }
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            if counts[cluster] == 0 {
                // Reseed an empty cluster from a random member.
                *centroid = vectors[rng.gen_range(0..vectors.len())].clone();
                continue;
            }
            for (c, acc) in centroid.iter_mut().zip(&sums[cluster]) {
                *c = acc / counts[cluster] as f32;
            }
        }
    }
    assignments
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0usize;
    let mut best_distance = f32::MAX;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance: f32 = vector
            .iter()
            .zip(centroid)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best
}

/// Sample block rendered into the cluster-naming prompt: up to
/// `sample_size` texts per cluster, in row order.
pub fn render_cluster_samples(
    texts: &[String],
    assignments: &[usize],
    k: usize,
    sample_size: usize,
) -> String {
    let mut out = String::new();
    for cluster in 0..k {
        let samples: Vec<&String> = texts
            .iter()
            .zip(assignments)
            .filter(|(_, &assigned)| assigned == cluster)
            .map(|(text, _)| text)
            .take(sample_size)
            .collect();
        out.push_str(&format!("Cluster {cluster}:\n"));
        for sample in samples {
            out.push_str(&format!("- {sample}\n"));
        }
        out.push('\n');
    }
    out
}

pub fn generic_name(cluster: usize) -> String {
    format!("Group {}", cluster + 1)
}

/// Parse the model's naming response: a JSON object keyed by
/// "Cluster N". Malformed keys are skipped; clusters the model left out
/// get a generic name.
pub fn parse_cluster_names(response: &str, k: usize) -> HashMap<usize, String> {
    let mut names: HashMap<usize, String> = HashMap::new();
    if let Some(object_text) = extract_json_object(response) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&object_text) {
            if let Some(object) = value.as_object() {
                for (key, name) in object {
                    let Some(id_text) = key.trim().strip_prefix("Cluster ") else {
                        continue;
                    };
                    let Ok(cluster_id) = id_text.trim().parse::<usize>() else {
                        continue;
                    };
                    if cluster_id >= k {
                        continue;
                    }
                    if let Some(name) = name.as_str() {
                        names.insert(cluster_id, name.to_string());
                    }
                }
            }
        }
    }
    for cluster in 0..k {
        names
            .entry(cluster)
            .or_insert_with(|| generic_name(cluster));
    }
    names
}

pub const NAMING_SYSTEM_PROMPT: &str = r#"You are a data analyst. Your task is to name clusters of short texts.

I will provide samples of text from different clusters.
For each cluster, generate a VERY SHORT (2-4 words) descriptive name in the language of the samples.
The name should summarise the common theme.

Output format MUST be a JSON object where keys are "Cluster 0", "Cluster 1", etc., and values are the names.
Example:
{
    "Cluster 0": "Slips and falls",
    "Cluster 1": "Missing protective equipment"
}"#;
