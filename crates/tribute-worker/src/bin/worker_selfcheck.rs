//! Checks the render environment and prints the health report as JSON.

use tribute_worker::{health, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    eprintln!(
        "worker-selfcheck: temp_dir={} output_dir={}",
        config.temp_dir.display(),
        config.output_dir.display()
    );
    config.validate()?;

    let report = health::check(&config, None).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_ok() {
        anyhow::bail!("worker-selfcheck: degraded");
    }
    eprintln!("worker-selfcheck: ok");
    Ok(())
}
