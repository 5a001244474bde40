//! Stored-session CLI commands: list, forget.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use linkbot_core::repository::CredentialStore;
use linkbot_types::session::SessionId;

use crate::state::AppState;

/// List sessions with stored credentials.
///
/// These are the sessions `linkbot serve` reconnects on startup.
pub async fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    let ids = state.store.list_ids().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    if ids.is_empty() {
        println!();
        println!("  {} No paired sessions yet.", style("ℹ").blue());
        println!(
            "  Start the server with {} and POST /api/v1/sessions/{{id}}/connect.",
            style("linkbot serve").cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Session").fg(Color::White),
        Cell::new("Credentials").fg(Color::White),
    ]);
    for id in &ids {
        table.add_row(vec![Cell::new(id), Cell::new("stored").fg(Color::Green)]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} session(s)", style(ids.len()).bold());
    println!();
    Ok(())
}

/// Delete the stored credentials of a session.
///
/// The device stays linked on the network side; the next connect starts a
/// fresh pairing.
pub async fn forget_session(state: &AppState, raw_id: &str, json: bool) -> Result<()> {
    let id = SessionId::parse(raw_id)?;
    let existed = state.store.load(&id).await?.is_some();
    state.store.delete(&id).await?;

    if json {
        let out = serde_json::json!({ "id": id, "deleted": existed });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if existed {
        println!(
            "  {} Forgot credentials for {}",
            style("✓").green(),
            style(&id).cyan()
        );
    } else {
        println!(
            "  {} No stored credentials for {}",
            style("ℹ").blue(),
            style(&id).cyan()
        );
    }
    Ok(())
}
