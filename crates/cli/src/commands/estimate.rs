//! `loreweave estimate`: Token estimate for arbitrary text.

use loreweave_prompt::context::token::ESTIMATION_METHOD;
use loreweave_prompt::estimate_tokens;
use std::io::Read;
use std::path::PathBuf;

pub async fn run(text: Option<String>, file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    println!("{}", report(&text));
    Ok(())
}

fn report(text: &str) -> String {
    format!(
        "Characters: {}\nTokens:     {}\nMethod:     {}",
        text.chars().count(),
        estimate_tokens(text),
        ESTIMATION_METHOD.as_str()
    )
}
