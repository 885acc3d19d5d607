//! CLI for the tether profiler protocol.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod inspect;
mod remote;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tether::WireConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "tether", version, about = "Talk to a profiler agent over the tether protocol")]
struct Cli {
    /// Wire settings file (JSON). Missing fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a captured byte stream of back-to-back messages.
    Inspect(inspect::InspectArgs),

    /// Check that an agent answers, optionally printing its VM properties.
    Ping {
        #[command(flatten)]
        target: remote::Target,
        /// Also fetch the target VM properties.
        #[arg(long)]
        vm: bool,
    },

    /// Print the agent's monitored numbers.
    Numbers {
        #[command(flatten)]
        target: remote::Target,
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the classes holding the most live bytes.
    Histogram {
        #[command(flatten)]
        target: remote::Target,
        /// Number of classes to show.
        #[arg(short = 'n', long, default_value_t = 20)]
        top: usize,
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the effective wire settings, or write them to a file.
    Config {
        /// Write the settings here instead of printing them.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Output format for query commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = cli.dispatch() {
        eprintln!("tether: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

impl Cli {
    fn wire_config(&self) -> Result<WireConfig> {
        match &self.config {
            Some(path) => Ok(tether::load_config(path)?),
            None => Ok(WireConfig::default()),
        }
    }

    fn dispatch(self) -> Result<()> {
        let config = self.wire_config()?;
        match self.command {
            Command::Inspect(args) => inspect::inspect(&args, config),
            Command::Ping { target, vm } => remote::run(&target, config, remote::Query::Ping { vm }),
            Command::Numbers { target, format } => {
                remote::run(&target, config, remote::Query::Numbers { format })
            }
            Command::Histogram { target, top, format } => {
                remote::run(&target, config, remote::Query::Histogram { top, format })
            }
            Command::Config { output } => show_config(config, output),
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "tether", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}

fn show_config(config: WireConfig, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            config
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}
