//! Maple Monitor CLI - drive the pattern engine from the terminal
//!
//! Provides:
//! - `analyze`: replay a JSON-lines recording of samples
//! - `demo`: run a seeded synthetic workload
//! - `config`: print the effective configuration

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod commands;
pub mod config;
pub mod error;
pub mod output;

use commands::PrintOptions;
use config::MonitorConfig;
use error::CliResult;
use output::OutputFormat;

/// Maple Monitor CLI application
#[derive(Debug, Parser)]
#[command(name = "maple-monitor")]
#[command(about = "Maple Monitor - resource pattern and anomaly engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MAPLE_MONITOR_CONFIG")]
    pub config: Option<String>,

    /// Output format (json, text)
    #[arg(short, long, value_enum, default_value = "json")]
    pub output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay recorded samples (one JSON record per line)
    Analyze {
        /// Input file, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,

        /// Print every analysis, not only those with insights
        #[arg(long)]
        all: bool,

        /// Entities listed in the final report
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Run a synthetic workload
    Demo {
        /// Samples per entity
        #[arg(long, default_value_t = 60)]
        steps: usize,

        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Print every analysis, not only those with insights
        #[arg(long)]
        all: bool,

        /// Entities listed in the final report
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Show configuration
    Config,
}

/// Parse process arguments and run.
pub fn run() -> CliResult<()> {
    run_with_args(Cli::parse())
}

pub fn run_with_args(cli: Cli) -> CliResult<()> {
    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(io::stderr),
        )
        .try_init();

    let config = MonitorConfig::load(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Analyze { input, all, top } => {
            let engine = config.build_engine()?;
            let options = PrintOptions {
                all,
                top,
                format: cli.output,
            };
            commands::analyze::execute(&engine, &input, &mut out, &options)?;
            Ok(())
        }
        Commands::Demo {
            steps,
            seed,
            all,
            top,
        } => {
            let engine = config.build_engine()?;
            let options = PrintOptions {
                all,
                top,
                format: cli.output,
            };
            commands::demo::execute(&engine, steps, seed, &mut out, &options)?;
            Ok(())
        }
        Commands::Config => {
            write!(out, "{}", config.to_toml()?)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_defaults_to_stdin() {
        let cli = Cli::parse_from(["maple-monitor", "analyze"]);
        match cli.command {
            Commands::Analyze { input, all, top } => {
                assert_eq!(input, "-");
                assert!(!all);
                assert_eq!(top, 10);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_demo_flags() {
        let cli = Cli::parse_from([
            "maple-monitor",
            "--output",
            "text",
            "demo",
            "--steps",
            "12",
            "--seed",
            "9",
        ]);
        assert_eq!(cli.output, OutputFormat::Text);
        assert!(matches!(
            cli.command,
            Commands::Demo {
                steps: 12,
                seed: 9,
                ..
            }
        ));
    }
}
