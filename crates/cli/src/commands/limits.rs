//! `loreweave limits`: Show resolved model limits.

use loreweave_config::AppConfig;
use loreweave_core::ModelLimits;

pub async fn run(model: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    match model {
        Some(model) => {
            let limits = config.model_limits(&model);
            println!("📐 {model}");
            println!("─────────────────────────────────────");
            println!("  Context window:  {}", limits.context_window);
            println!("  Max output:      {}", limits.max_output_tokens);
            println!("  Safety buffer:   {}", limits.safety_buffer_tokens);
            println!("  Prompt budget:   {}", limits.total_budget());
            if !config.models.contains_key(&model) {
                println!();
                println!("  (not registered; resolved by partial match or fallback)");
            }
        }
        None => {
            println!("{}", table(&config));
        }
    }

    Ok(())
}

fn row(name: &str, limits: &ModelLimits) -> String {
    format!(
        "{:<40} {:>9} {:>9} {:>9} {:>9}",
        name,
        limits.context_window,
        limits.max_output_tokens,
        limits.safety_buffer_tokens,
        limits.total_budget()
    )
}

fn table(config: &AppConfig) -> String {
    let mut lines = vec![format!(
        "{:<40} {:>9} {:>9} {:>9} {:>9}",
        "Model", "Context", "Output", "Safety", "Budget"
    )];
    lines.extend(config.models.iter().map(|(name, limits)| row(name, limits)));
    lines.push(row("(fallback)", &config.fallback_limits));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_model_and_fallback() {
        let config = AppConfig::default();
        let out = table(&config);
        assert_eq!(out.lines().count(), config.models.len() + 2);
        assert!(out.contains("gpt-4o"));
        assert!(out.contains("(fallback)"));
    }

    #[test]
    fn row_shows_total_budget() {
        let out = row("tiny", &ModelLimits::new(1000, 200, 50));
        assert!(out.trim_end().ends_with("750"));
    }
}
