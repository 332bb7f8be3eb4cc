//! `sopilot run`: one task through the browser bridge.

use std::path::PathBuf;
use std::sync::Arc;

use sopilot_agent::TaskRunner;
use sopilot_browser::RemoteBrowserEnv;
use sopilot_core::event::{DomainEvent, EventBus};
use tracing::debug;

pub async fn run(config_path: Option<PathBuf>, task_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(&super::config_path(config_path))?;
    if !config.has_api_key() {
        return Err("No API key configured. Set GEMINI_API_KEY or add api_key to the config.".into());
    }

    let router = sopilot_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not available", router.default_name()))?;
    let env = Arc::new(RemoteBrowserEnv::from_config(&config));
    let events = Arc::new(EventBus::default());

    let mut rx = events.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            debug!(event = ?event, "domain event");
            if matches!(event.as_ref(), DomainEvent::TaskFinished { .. }) {
                break;
            }
        }
    });

    let runner = TaskRunner::from_config(&config, env, provider, events);
    let summary = runner.run(task_id).await?;
    let _ = watcher.await;

    println!("\n{summary}");
    Ok(())
}
