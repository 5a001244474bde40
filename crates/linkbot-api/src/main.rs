//! Linkbot CLI and REST API entry point.
//!
//! Binary name: `linkbot`
//!
//! Parses CLI arguments, initializes storage and the session registry, then
//! dispatches to the appropriate command handler or starts the REST API
//! server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use linkbot_observe::tracing_setup::{init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.default_log_filter(), cli.log_format, cli.otel_enabled())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Shell completions don't need app state
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "linkbot", &mut std::io::stdout());
        }

        Commands::Sessions => {
            let state = AppState::init(false).await?;
            cli::sessions::list_sessions(&state, cli.json).await?;
        }

        Commands::Forget { id } => {
            let state = AppState::init(false).await?;
            cli::sessions::forget_session(&state, &id, cli.json).await?;
        }

        Commands::Status => {
            let state = AppState::init(false).await?;
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Serve {
            port,
            host,
            otel: _,
            ephemeral,
            no_resume,
        } => {
            let state = AppState::init(ephemeral).await?;

            if state.config.gateway.is_none() {
                tracing::warn!(
                    "no [gateway] section in config.toml; connect attempts will fail until one is added"
                );
            }

            if state.config.resume_on_start && !no_resume {
                let registry = state.registry.clone();
                tokio::spawn(async move {
                    match registry.resume_stored().await {
                        Ok(count) => tracing::info!(count, "stored sessions resumed"),
                        Err(e) => tracing::error!(error = %e, "failed to list stored sessions"),
                    }
                });
            }

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} Linkbot API listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let router = http::router::build_router(state.clone());

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            // Close sockets but keep devices paired so the next start resumes.
            state.registry.shutdown().await;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
