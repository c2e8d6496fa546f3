use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use txconf_correlator::{shutdown_signal, CorrelatorConfig, CorrelatorService, ShutdownReport};
use txconf_sink::FileSink;
use txconf_source::{Checkpointer, FileCheckpointer, InMemoryCheckpointer, NdjsonEventSource};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args, &cli.format),
        Command::CheckConfig(args) => cmd_check_config(args, &cli.format),
    }
}

/// The config file, if any, with command-line overrides applied.
fn effective_config(args: &RunArgs) -> anyhow::Result<CorrelatorConfig> {
    let mut config = match &args.config {
        Some(path) => CorrelatorConfig::load(path)?,
        None => CorrelatorConfig::default(),
    };
    if let Some(name) = &args.chaincode {
        config.chaincode_name = name.clone();
    }
    if let Some(capacity) = args.cache_capacity {
        config.cache_capacity = capacity;
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    if args.rotate {
        config.rotate_on_shutdown = true;
    }
    if let Some(secs) = args.status_interval {
        config.status_interval_secs = secs;
    }
    if let Some(path) = &args.checkpoint {
        config.checkpoint_path = Some(path.clone());
    }
    config.validate()?;
    Ok(config)
}

fn cmd_run(args: RunArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = effective_config(&args)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let report = runtime.block_on(serve(config, args))?;
    print_report(&report, format)
}

async fn serve(config: CorrelatorConfig, args: RunArgs) -> anyhow::Result<ShutdownReport> {
    let sink = Arc::new(FileSink::open(&config.output_path)?);
    let checkpointer: Arc<dyn Checkpointer> = match &config.checkpoint_path {
        Some(path) => Arc::new(FileCheckpointer::open(path)?),
        None => Arc::new(InMemoryCheckpointer::new()),
    };
    let source = Arc::new(NdjsonEventSource::new(args.blocks, args.events).follow(true));
    let service = CorrelatorService::new(config, source, sink)?.with_checkpointer(checkpointer);

    let cancel = CancellationToken::new();
    let signals = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let result = shutdown_signal().await;
            cancel.cancel();
            result
        }
    });

    info!(output = %service.config().output_path.display(), "txconf running; interrupt to stop");
    let outcome = service.run(cancel).await;
    if signals.is_finished() {
        signals.await.context("signal handler task failed")??;
    } else {
        signals.abort();
    }
    Ok(outcome?)
}

fn print_report(report: &ShutdownReport, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let s = &report.stats;
            println!("{} Correlator stopped", "✓".green().bold());
            println!("  Confirmed: {}", s.confirmed.to_string().green());
            println!(
                "  Rejected: {} bad tx id, {} bad header",
                s.error_txid.to_string().red(),
                s.error_header.to_string().red()
            );
            println!(
                "  Flushed pending on shutdown: {}",
                report.flushed_on_shutdown.to_string().yellow()
            );
            println!(
                "  Dropped events: {} block, {} chaincode",
                s.block_errors, s.event_errors
            );
            if s.stalled > 0 {
                println!("  Stalled: {}", s.stalled.to_string().yellow());
            }
            if let Some(path) = &report.rotated_to {
                println!("  Output rotated to {}", path.display().to_string().bold());
            }
        }
    }
    Ok(())
}

fn cmd_check_config(args: CheckConfigArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = CorrelatorConfig::load(&args.config)?;
    config.validate()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            println!(
                "{} {} is valid",
                "✓".green().bold(),
                args.config.display().to_string().bold()
            );
            println!("  Chaincode: {}", config.chaincode_name.cyan());
            println!("  Cache capacity: {}", config.cache_capacity);
            println!("  Output: {}", config.output_path.display());
            println!("  Rotate on shutdown: {}", config.rotate_on_shutdown);
            match config.status_interval() {
                Some(interval) => println!("  Status interval: {}s", interval.as_secs()),
                None => println!("  Status interval: {}", "disabled".dimmed()),
            }
            println!("  Tick interval: {}ms", config.tick_interval_ms);
            match &config.checkpoint_path {
                Some(path) => println!("  Checkpoint: {}", path.display()),
                None => println!("  Checkpoint: {}", "in-memory".dimmed()),
            }
        }
    }
    Ok(())
}
