use anyhow::Result;
use std::fs;
use tollflow::{config::PipelineConfig, graph::StageStatus, stage};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) load config ──────────────────────────────────────────────
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(config = %path, "loading config");
            PipelineConfig::from_yaml_file(&path)?
        }
        None => PipelineConfig::default(),
    };

    for dir in [&config.staging_dir, &config.output_dir] {
        fs::create_dir_all(dir)?;
    }

    // ─── 3) run the pipeline ─────────────────────────────────────────
    let graph = stage::build(config.retry_policy());
    let report = graph.run(&config).await?;

    // ─── 4) report per-stage outcomes ────────────────────────────────
    for (id, status) in &report.statuses {
        match status {
            StageStatus::Success => info!(stage = %id, "success"),
            StageStatus::Failed(err) => error!(stage = %id, %err, "failed"),
            StageStatus::Skipped => warn!(stage = %id, "skipped"),
        }
    }
    if !report.succeeded() {
        anyhow::bail!("pipeline run failed");
    }

    info!(output = %config.final_table().display(), "all done");
    Ok(())
}
