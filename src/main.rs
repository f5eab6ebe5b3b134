//! typioca - a cozy typing speed tester for the terminal
//!
//! Runs locally, or as an SSH server where every connection gets its own
//! independent typing test.
//!
//! # Quick Start
//!
//! ```text
//! typioca                 # Run in the local terminal
//! typioca timer-run       # Straight into a timer test, prints the wpm
//! typioca serve -p 2229   # Host over SSH: ssh -p 2229 localhost
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | ↑/↓ | Select menu entry |
//! | ←/→ | Change duration / word count |
//! | Enter | Start test |
//! | Esc | Back to menu |
//! | Ctrl+C | Quit |

mod config;
mod core;
mod local;
mod program;
mod server;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ServerConfig, ServerOverrides, Settings};
use crate::program::Start;

#[derive(Parser, Debug)]
#[command(name = "typioca", about = "Cozy typing speed tester", disable_version_flag = true)]
struct Cli {
    /// Print version information
    #[arg(short = 'v', long = "version")]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host typioca over SSH
    Serve {
        /// Address to listen on (all interfaces when empty)
        #[arg(short, long)]
        bind: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Host key path, generated if missing
        #[arg(short = 'k', long = "key")]
        key: Option<PathBuf>,
        /// Seconds sessions get to finish on shutdown
        #[arg(long = "grace-period", value_name = "SECS")]
        grace_period: Option<u64>,
    },
    /// Start a timer test right away and print the result
    TimerRun,
}

/// What this invocation does
#[derive(Debug)]
enum RunMode {
    Local,
    Serve(ServerConfig),
    TimerRun,
}

impl RunMode {
    fn from_cli(command: Option<Command>, settings: &Settings) -> Self {
        match command {
            None => RunMode::Local,
            Some(Command::TimerRun) => RunMode::TimerRun,
            Some(Command::Serve {
                bind,
                port,
                key,
                grace_period,
            }) => RunMode::Serve(ServerConfig::resolve(
                &settings.server,
                ServerOverrides {
                    bind,
                    port,
                    key,
                    grace_period_secs: grace_period,
                },
            )),
        }
    }
}

/// Serve mode logs to stderr; local runs log to `~/.typioca/typioca.log` so
/// the TUI stays clean.
fn init_logging(to_file: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if !to_file {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    }

    let log_path = config::data_dir()
        .map(|dir| dir.join("typioca.log"))
        .unwrap_or_else(|| PathBuf::from("typioca.log"));
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();
    if let Some(file) = log_file {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .try_init();
    }
}

/// Line printed by `timer-run`; scripts read it, so an unfinished test reports 0
fn wpm_report(wpm: Option<f64>) -> String {
    format!("Wpm: {:.0}", wpm.unwrap_or(0.0))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("typioca {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let serving = matches!(cli.command, Some(Command::Serve { .. }));
    init_logging(!serving);

    let settings = Settings::load();
    let mode = RunMode::from_cli(cli.command, &settings);
    info!(?mode, "typioca starting");

    match mode {
        RunMode::Serve(config) => server::serve(config).await?,
        RunMode::Local => {
            local::run(Start::Menu).await?;
            println!("bye!");
        }
        RunMode::TimerRun => {
            let wpm = local::run(Start::Timer).await?;
            println!("{}", wpm_report(wpm));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "typioca",
            "serve",
            "-b",
            "127.0.0.1",
            "-p",
            "2300",
            "-k",
            "/tmp/hostkey",
            "--grace-period",
            "10",
        ])
        .unwrap();

        match RunMode::from_cli(cli.command, &Settings::default()) {
            RunMode::Serve(config) => {
                assert_eq!(config.address(), "127.0.0.1:2300");
                assert_eq!(config.host_key_path, PathBuf::from("/tmp/hostkey"));
                assert_eq!(config.grace_period, Duration::from_secs(10));
            }
            other => panic!("expected serve mode, got {:?}", other),
        }
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["typioca", "serve"]).unwrap();
        match RunMode::from_cli(cli.command, &Settings::default()) {
            RunMode::Serve(config) => assert_eq!(config, ServerConfig::default()),
            other => panic!("expected serve mode, got {:?}", other),
        }
    }

    #[test]
    fn test_local_modes() {
        let cli = Cli::try_parse_from(["typioca"]).unwrap();
        assert!(!cli.version);
        assert!(matches!(RunMode::from_cli(cli.command, &Settings::default()), RunMode::Local));

        let cli = Cli::try_parse_from(["typioca", "timer-run"]).unwrap();
        assert!(matches!(
            RunMode::from_cli(cli.command, &Settings::default()),
            RunMode::TimerRun
        ));

        let cli = Cli::try_parse_from(["typioca", "-v"]).unwrap();
        assert!(cli.version);
    }

    #[test]
    fn test_wpm_report() {
        assert_eq!(wpm_report(Some(61.6)), "Wpm: 62");
        assert_eq!(wpm_report(Some(0.2)), "Wpm: 0");

        // Leaving the test early still prints a number
        assert_eq!(wpm_report(None), "Wpm: 0");
    }
}
