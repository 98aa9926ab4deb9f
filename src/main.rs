// Codex app-server bridge demo
//
// Runs one prompt (taken from the command line) on a fresh thread and logs
// every turn event. Configuration comes from CODEX_BRIDGE_* variables.

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use kodegen_codex_bridge::{AppServerClient, ClientOptions, ThreadOptions, TurnEvent};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        bail!("usage: kodegen-codex-bridge <prompt>");
    }

    let options = ClientOptions::builder()
        .surface_builtin_tools(true)
        .build()
        .apply_env_overrides()
        .context("invalid CODEX_BRIDGE_* configuration")?;

    let client = AppServerClient::new(options);
    let thread_id = client
        .start_or_resume_thread(ThreadOptions::default())
        .await
        .context("failed to start the agent")?;
    log::info!("thread {thread_id}");

    let outcome = run_prompt(&client, &prompt).await;
    if let Err(e) = client.shutdown().await {
        log::warn!("shutdown failed: {e}");
    }
    outcome
}

async fn run_prompt(client: &AppServerClient, prompt: &str) -> Result<()> {
    let mut events = client.run_streaming(prompt)?;
    while let Some(event) = events.next().await {
        match event? {
            TurnEvent::Notification { method, params } => {
                log::debug!("{method}: {params}");
            }
            TurnEvent::ToolCallStarted(call) => {
                log::info!("tool {} ({}) started", call.tool_name, call.call_id);
            }
            TurnEvent::ToolCallCompleted(call) => {
                let outcome = if call.is_error { "failed" } else { "succeeded" };
                log::info!("tool {} ({}) {outcome}", call.tool_name, call.call_id);
            }
            TurnEvent::TurnCompleted(summary) => {
                log::info!(
                    "turn {} finished: {}",
                    summary.turn_id.as_deref().unwrap_or("?"),
                    summary.status
                );
            }
        }
    }
    Ok(())
}
