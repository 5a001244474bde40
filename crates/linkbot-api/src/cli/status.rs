//! Configuration and storage status command.

use anyhow::Result;
use console::style;

use linkbot_core::repository::CredentialStore;

use crate::state::AppState;

/// Display where Linkbot keeps its data and which adapters are configured.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let stored = state.store.list_ids().await?.len();
    let gateway = state.config.gateway.as_ref().map(|g| g.url.as_str());
    let processor = state.config.processor.as_ref().map(|p| p.url.as_str());

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "stored_sessions": stored,
            "gateway_url": gateway,
            "processor_url": processor,
            "reconnect_delay_secs": state.config.reconnect_delay_secs,
            "resume_on_start": state.config.resume_on_start,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let not_set = || style("not configured").yellow().to_string();

    println!();
    println!("  {} Linkbot v{}", style("⚡").bold(), env!("CARGO_PKG_VERSION"));
    println!();
    println!("  {}", style("── Storage ──").dim());
    println!("  Data dir:   {}", state.data_dir.display());
    println!("  Sessions:   {}", style(stored).bold());
    println!();
    println!("  {}", style("── Adapters ──").dim());
    println!(
        "  Gateway:    {}",
        gateway.map(|u| style(u).cyan().to_string()).unwrap_or_else(not_set)
    );
    println!(
        "  Processor:  {}",
        processor.map(|u| style(u).cyan().to_string()).unwrap_or_else(not_set)
    );
    println!();
    println!("  {}", style("── Reconnect ──").dim());
    println!("  Delay:      {}s", state.config.reconnect_delay_secs);
    println!(
        "  On start:   {}",
        if state.config.resume_on_start { "resume stored sessions" } else { "wait for connect" }
    );
    println!();
    Ok(())
}
