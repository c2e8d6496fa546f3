use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "txconf",
    about = "txconf: confirms submitted ledger transactions against committed blocks",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at DEBUG level
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Correlate block and chaincode event streams until interrupted
    Run(RunArgs),
    /// Validate a config file and print the effective configuration
    CheckConfig(CheckConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// TOML config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Chaincode whose events are correlated
    #[arg(long)]
    pub chaincode: Option<String>,
    /// Maximum number of cached block headers
    #[arg(long)]
    pub cache_capacity: Option<usize>,
    /// Confirmation output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Rename the output with a capture-time prefix on shutdown
    #[arg(long)]
    pub rotate: bool,
    /// Seconds between status reports; 0 disables them
    #[arg(long)]
    pub status_interval: Option<u64>,
    /// Persist stream checkpoints to this file
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    /// Newline-delimited JSON block events, read as the file grows
    #[arg(long)]
    pub blocks: PathBuf,
    /// Newline-delimited JSON chaincode events, read as the file grows
    #[arg(long)]
    pub events: PathBuf,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    #[arg(short, long)]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_minimal() {
        let cli = Cli::try_parse_from([
            "txconf", "run", "--chaincode", "assets", "--blocks", "b.ndjson", "--events",
            "e.ndjson",
        ])
        .unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.chaincode.as_deref(), Some("assets"));
            assert_eq!(args.blocks, PathBuf::from("b.ndjson"));
            assert!(args.config.is_none());
            assert!(!args.rotate);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "txconf",
            "run",
            "--config",
            "txconf.toml",
            "--cache-capacity",
            "50",
            "--output",
            "out.log",
            "--rotate",
            "--status-interval",
            "0",
            "--checkpoint",
            "cp.json",
            "--blocks",
            "b",
            "--events",
            "e",
        ])
        .unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("txconf.toml")));
            assert_eq!(args.cache_capacity, Some(50));
            assert_eq!(args.output, Some(PathBuf::from("out.log")));
            assert!(args.rotate);
            assert_eq!(args.status_interval, Some(0));
            assert_eq!(args.checkpoint, Some(PathBuf::from("cp.json")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn run_requires_event_files() {
        assert!(Cli::try_parse_from(["txconf", "run", "--chaincode", "assets"]).is_err());
    }

    #[test]
    fn parse_check_config() {
        let cli = Cli::try_parse_from(["txconf", "check-config", "--config", "c.toml"]).unwrap();
        assert!(matches!(cli.command, Command::CheckConfig(_)));
    }

    #[test]
    fn log_levels() {
        let cli = Cli::try_parse_from(["txconf", "-v", "check-config", "-c", "c.toml"]).unwrap();
        assert_eq!(cli.log_level(), Level::DEBUG);
        let cli = Cli::try_parse_from(["txconf", "check-config", "-c", "c.toml", "--quiet"]).unwrap();
        assert_eq!(cli.log_level(), Level::WARN);
        let cli = Cli::try_parse_from(["txconf", "check-config", "-c", "c.toml"]).unwrap();
        assert_eq!(cli.log_level(), Level::INFO);
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["txconf", "-v", "-q", "check-config", "-c", "x"]).is_err());
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["txconf", "--format", "json", "check-config", "-c", "x"])
            .unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
