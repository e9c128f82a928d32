//! Tribute render worker binary.
//!
//! Renders the tribute described by a JSON manifest and reports status until
//! the job finishes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use tribute_models::{JobStatus, TributeInput};
use tribute_worker::{logging, metrics, JobOrchestrator, WorkerConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid METRICS_ADDR {}", addr))?;
        metrics::init_metrics(addr)?;
        info!("Metrics listening on {}", addr);
    }

    let manifest = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: tribute-worker <manifest.json>")?;
    let raw = tokio::fs::read_to_string(&manifest)
        .await
        .with_context(|| format!("reading {}", manifest.display()))?;
    let input: TributeInput = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", manifest.display()))?;

    info!("Starting tribute-worker");
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let orchestrator = JobOrchestrator::from_config(config)?;
    let job_id = orchestrator.submit(input).await?;

    let mut last = None;
    let job = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Received shutdown signal, cancelling job {}", job_id);
                orchestrator.cancel(&job_id).await?;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let job = orchestrator
            .get_status(&job_id)
            .await?
            .with_context(|| format!("job {} disappeared", job_id))?;

        let snapshot = (job.status(), job.stage(), job.progress());
        if last != Some(snapshot) {
            match job.stage() {
                Some(stage) => println!("{} {} {}%", job.status(), stage, job.progress()),
                None => println!("{} {}%", job.status(), job.progress()),
            }
            last = Some(snapshot);
        }

        if job.is_terminal() {
            break job;
        }
    };

    println!("{}", serde_json::to_string_pretty(&job)?);
    orchestrator.shutdown().await;

    if job.status() == JobStatus::Failed {
        error!(
            "Job {} failed: {}",
            job_id,
            job.error_message().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
    Ok(())
}
