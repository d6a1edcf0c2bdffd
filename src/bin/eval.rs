use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use endoscopy_bot::chain::QueryChain;
use endoscopy_bot::config::AppConfig;
use endoscopy_bot::pipeline::IndexingPipeline;

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Run a JSONL set of endoscopy questions through the answer chain")]
struct Cli {
    #[arg(long, default_value = "eval/prompts.jsonl")]
    file: String,
    /// Rebuild the index from the document folder before answering
    #[arg(long, default_value_t = false)]
    rebuild: bool,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct EvalPrompt {
    id: String,
    question: String,
    #[serde(default)]
    expect_contains: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let prompts = load_prompts(&cli.file)?;
    if prompts.is_empty() {
        anyhow::bail!("no prompts found in {}", cli.file);
    }

    let pipeline = IndexingPipeline::new(config);
    let chain = if cli.rebuild {
        pipeline.build_chain().await?
    } else {
        pipeline.load_chain().await?
    };

    let mut total = 0usize;
    let mut passed = 0usize;
    let mut failed_ids = Vec::new();

    for prompt in prompts {
        total += 1;
        let answer = chain
            .run(&prompt.question)
            .await
            .with_context(|| format!("failed eval prompt {}", prompt.id))?;

        if contains_all(&answer, &prompt.expect_contains) {
            passed += 1;
        } else {
            failed_ids.push(prompt.id.clone());
        }

        if cli.verbose {
            println!("--- {} ---", prompt.id);
            println!("Q: {}", prompt.question);
            println!("A: {}", answer.replace('\n', " "));
            println!();
        }
    }

    println!("Eval prompts: {}", total);
    println!("Contains accuracy: {:.1}%", ratio(passed, total) * 100.0);
    if !failed_ids.is_empty() {
        println!("Missed: {}", failed_ids.join(", "));
    }

    Ok(())
}

fn load_prompts(path: &str) -> Result<Vec<EvalPrompt>> {
    let file = File::open(path).with_context(|| format!("failed opening {}", path))?;
    let reader = BufReader::new(file);
    let mut prompts = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: EvalPrompt = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", path, idx + 1))?;
        prompts.push(parsed);
    }

    Ok(prompts)
}

fn contains_all(answer: &str, needles: &[String]) -> bool {
    let lower = answer.to_ascii_lowercase();
    needles
        .iter()
        .all(|needle| lower.contains(&needle.to_ascii_lowercase()))
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
