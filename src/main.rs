use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use endoscopy_bot::pipeline::{IndexingPipeline, PipelineState};
use endoscopy_bot::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    let pipeline = Arc::new(PipelineState::new(Arc::new(IndexingPipeline::new(
        config.clone(),
    ))));

    run_server(config, pipeline).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
