//! CLI command definitions for the `linkbot` binary.

pub mod sessions;
pub mod status;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use linkbot_observe::tracing_setup::LogFormat;

/// Keep chatbots attached to a persistent-session messaging network.
#[derive(Parser)]
#[command(name = "linkbot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format (text or json).
    #[arg(long, global = true, env = "LINKBOT_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server and keep sessions connected.
    Serve {
        /// Port to listen on.
        #[arg(short, long, env = "LINKBOT_PORT", default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, env = "LINKBOT_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Export tracing spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,

        /// Keep credentials in memory only; every session pairs from scratch.
        #[arg(long)]
        ephemeral: bool,

        /// Do not reconnect sessions with stored credentials on startup.
        #[arg(long)]
        no_resume: bool,
    },

    /// List sessions with stored credentials.
    #[command(alias = "ls")]
    Sessions,

    /// Delete the stored credentials of a session.
    Forget {
        /// Session id.
        id: String,
    },

    /// Show configuration and storage status.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    ///
    /// The server logs session lifecycle at info; one-shot commands stay
    /// quiet unless asked.
    pub fn default_log_filter(&self) -> &'static str {
        let serving = matches!(self.command, Commands::Serve { .. });
        match self.verbose {
            0 if self.quiet => "error",
            0 if serving => "info",
            0 => "warn",
            1 => "info,linkbot=debug",
            _ => "trace",
        }
    }

    pub fn otel_enabled(&self) -> bool {
        matches!(self.command, Commands::Serve { otel: true, .. })
    }
}
