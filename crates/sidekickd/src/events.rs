//! Reading events from files and stdin

use anyhow::{Context, Result};
use sidekick_core::FalcoPayload;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read the whole input, `-` or `None` meaning stdin
pub async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read events from {}", path.display())),
        _ => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read events from stdin")?;
            Ok(input)
        }
    }
}

/// Parse a JSON array, one document, or a stream of documents (JSON lines)
pub fn parse_events(input: &str) -> Result<Vec<FalcoPayload>> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid JSON array of events");
    }

    serde_json::Deserializer::from_str(input)
        .into_iter::<FalcoPayload>()
        .enumerate()
        .map(|(i, event)| event.with_context(|| format!("Invalid event #{}", i + 1)))
        .collect()
}
