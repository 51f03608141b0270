use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use backhouse::scheduler::AnalysisScheduler;
use backhouse::suggest::Suggester;
use backhouse::{analysis, config, db};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Run a single analysis pass and exit instead of scheduling
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/backhouse.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let suggester = Arc::new(Suggester::from_config(&cfg)?);

    if args.once {
        let outcome = analysis::run_analysis(
            &pool,
            suggester.as_ref(),
            cfg.alerts.default_low_stock_threshold,
        )
        .await?;
        info!(?outcome, "analysis finished");
        return Ok(());
    }

    let scheduler = AnalysisScheduler::start(
        pool.clone(),
        suggester,
        Duration::from_secs(cfg.app.check_interval_secs),
        cfg.alerts.default_low_stock_threshold,
    );
    info!("analysis scheduler started");

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down");
    scheduler.stop().await;

    Ok(())
}
