use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use endoscopy_bot::config::AppConfig;
use endoscopy_bot::pipeline::IndexingPipeline;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Build the endoscopy vector database without starting the server")]
struct Cli {
    /// Folder of .txt/.md/.docx/.pdf sources (defaults to ENDOSCOPY_BOT_DOCS_DIR)
    #[arg(long)]
    docs: Option<PathBuf>,
    /// Persist directory for the index (defaults to ENDOSCOPY_BOT_DB_DIR)
    #[arg(long)]
    db_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(docs) = cli.docs {
        config.docs_dir = docs;
    }
    if let Some(db_dir) = cli.db_dir {
        config.db_dir = db_dir;
    }

    let (_, manifest) = IndexingPipeline::new(config.clone()).build_index().await?;

    println!(
        "Ingest complete. documents={} chunks={} model={} dim={} corpus={}",
        manifest.document_count,
        manifest.chunk_count,
        manifest.embedding_model,
        manifest.vector_size,
        &manifest.corpus_hash[..12.min(manifest.corpus_hash.len())]
    );
    println!("Index written to {}", config.db_dir.display());

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
