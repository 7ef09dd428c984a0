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

use anyhow::{bail, Context};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use vizier::frame::CsvReader;
use vizier::{HashEmbedding, OpenRouterClient, PipelineConfig, Visualizer};

/// Ask a question about a CSV file and get back a chart, the
/// aggregated table it was built from, and the generating plan.
#[derive(Debug, Parser)]
#[command(name = "vizier-demo")]
struct Args {
    /// CSV file to analyse
    data: PathBuf,

    /// Analytic question. Falls back to the prompts file entry for
    /// this dataset.
    #[arg(long)]
    question: Option<String>,

    /// JSON file mapping dataset name to its default question
    #[arg(long, default_value = "data/prompts.json")]
    prompts: PathBuf,

    /// Text column to enrich with a semantic category before analysis
    #[arg(long)]
    text_column: Option<String>,

    /// Number of semantic clusters
    #[arg(long, default_value_t = 6)]
    clusters: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    let dataset_name = args
        .data
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    let frame = CsvReader::new()
        .read_file(&args.data, dataset_name.clone())
        .with_context(|| format!("Failed to read {}", args.data.display()))?;
    println!("Loaded '{}': {} rows.", dataset_name, frame.row_count());

    let question = match args.question {
        Some(question) => question,
        None => {
            let prompts = load_prompts(&args.prompts);
            match prompts.get(&dataset_name) {
                Some(question) => question.clone(),
                None => bail!(
                    "No question given and no entry for '{}' in {}",
                    dataset_name,
                    args.prompts.display()
                ),
            }
        }
    };
    println!("Question: {question}\n");

    let client = Arc::new(OpenRouterClient::from_env()?);
    let embedder = Arc::new(HashEmbedding::default());
    let mut config = PipelineConfig::default().with_cluster_count(args.clusters);
    config.text_column = args.text_column;
    let visualizer = Visualizer::with_config(client, embedder, config);

    match visualizer.visualize(&question, &frame).await {
        Ok(result) => {
            println!("Chart type: {}", result.chart_type.to_uppercase());
            if let Some(figure) = &result.figure {
                println!("\nFigure:\n{}", serde_json::to_string_pretty(figure)?);
            }
            println!("\nVerification data (computed from the dataset):");
            println!("{}", result.plot_data.render_sample(20));
            println!("Generating plan:\n{}", result.plan_text);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn load_prompts(path: &PathBuf) -> HashMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(map) => map,
            Err(e) => {
                warn!("Ignoring malformed prompts file {}: {e}", path.display());
                HashMap::new()
            }
        },
        Err(_) => {
            warn!("Prompts file {} not found", path.display());
            HashMap::new()
        }
    }
}
