//! `loreweave build`: Build a prompt from a JSON request file.

use loreweave_config::AppConfig;
use loreweave_prompt::{PromptEngine, PromptRequest, PromptRequestRecord, PromptResult};
use std::path::Path;

pub async fn run(
    request_path: &Path,
    model: Option<String>,
    seed: Option<u64>,
    compact: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let raw = std::fs::read_to_string(request_path)
        .map_err(|e| format!("Failed to read {}: {e}", request_path.display()))?;

    let result = build_from_str(&raw, &config, model.as_deref(), seed)?;

    for warning in &result.warnings {
        tracing::warn!(entry = %warning.entry_id, "{}", warning.reason);
    }

    let json = if compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{json}");
    Ok(())
}

/// Parse a request, fill in missing model limits and build it.
pub fn build_from_str(
    raw: &str,
    config: &AppConfig,
    model: Option<&str>,
    seed: Option<u64>,
) -> Result<PromptResult, Box<dyn std::error::Error>> {
    let record: PromptRequestRecord =
        serde_json::from_str(raw).map_err(|e| format!("Invalid request JSON: {e}"))?;
    let mut request = PromptRequest::from(record);

    if request.model_limits.is_none() {
        let model = model.unwrap_or(&config.default_model);
        request.model_limits = Some(config.model_limits(model));
        tracing::debug!(model, "Using registry limits");
    }
    if seed.is_some() {
        request.seed = seed;
    }

    let engine = PromptEngine::from_config(config);
    engine.build_seeded(&request).map_err(|e| {
        eprintln!("❌ {}", e.user_hint());
        e.into()
    })
}
