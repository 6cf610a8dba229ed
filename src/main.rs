use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod batch_store;
mod cli;
mod config;
mod error;
mod extract;
mod fetch;
mod limits;
mod model;
mod sink;
mod stats;
mod url_source;

use cli::{Cli, Command};
use config::{AnalyseConfig, CrawlConfig};
use extract::coordinator::ExtractionCoordinator;
use fetch::coordinator::FetchCoordinator;
use sink::ResultSink;
use url_source::UrlSource;

const RESULT_CHANNEL_DEPTH: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    limits::raise_nofile_limit();
    limits::lower_priority();

    let outcome = match cli.command {
        Command::Run(args) => run_fetch(args).await,
        Command::Analyse(args) => run_extract(args).await,
    };

    if let Err(err) = &outcome {
        tracing::error!("{err}");
        if matches!(err.downcast_ref::<error::CrawlError>(), Some(error::CrawlError::Config(_))) {
            std::process::exit(2);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

async fn run_fetch(args: cli::RunArgs) -> Result<()> {
    let config = CrawlConfig::from_args(args)?;
    let config = std::sync::Arc::new(config);

    let url_source = UrlSource::open(&config.urlfile).await?;

    let mut sink = ResultSink::create(
        &config.logfile,
        config.datafile.clone(),
        config.output_batchsize,
        true,
    )
    .await?;

    let (tx, mut rx) = mpsc::channel(RESULT_CHANNEL_DEPTH);

    let sink_task = tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            sink.accept(result).await?;
        }
        sink.finish().await
    });

    let coordinator = FetchCoordinator::new(config);
    coordinator.run(url_source, tx).await?;

    sink_task.await??;
    Ok(())
}

async fn run_extract(args: cli::AnalyseArgs) -> Result<()> {
    let config = AnalyseConfig::from_args(args)?;
    let coordinator = ExtractionCoordinator::new(config);
    coordinator.run().await?;
    Ok(())
}
