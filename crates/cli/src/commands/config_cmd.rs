//! `loreweave config`: Configuration management commands.

use loreweave_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = checks(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:       {}", config.default_model);
            println!("   User name:   {}", config.user_name);
            println!("   Lore budget: {}", config.lore.token_budget);
            println!("   Scan depth:  {}", config.lore.scan_depth);
            println!("   Models:      {}", config.models.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Non-fatal configuration smells.
fn checks(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let default_limits = config.model_limits(&config.default_model);
    if default_limits.total_budget() <= 0 {
        warnings.push(format!(
            "Default model '{}' leaves no prompt budget",
            config.default_model
        ));
    }

    for (name, limits) in &config.models {
        if limits.total_budget() <= 0 {
            warnings.push(format!("Model '{name}' leaves no prompt budget"));
        }
    }

    if config.lore.token_budget == 0 {
        warnings.push("lore.token_budget is 0; lore will never be injected".into());
    }

    if config.lore.max_entries == 0 {
        warnings.push("lore.max_entries is 0; lore will never be injected".into());
    }

    if config.history.max_history_tokens == 0 {
        warnings.push("history.max_history_tokens is 0; history will never be sent".into());
    }

    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
