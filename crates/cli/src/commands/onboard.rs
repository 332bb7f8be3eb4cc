//! `sopilot onboard`: first-time setup.

use std::path::{Path, PathBuf};

use sopilot_config::AppConfig;
use sopilot_planner::PromptTemplates;

/// Starter hints per mission intent, merged into the manifest as
/// `runtime_hints`.
const STARTER_RULES: &str = r#"{
  "CREATE": {
    "submit": "Fill every requested field, then press the form's Submit button once."
  },
  "SEARCH_ANSWER": {
    "report": "Read the answer with extractLLM, then report it with send_msg_to_user using extractValue."
  },
  "FILTER": {
    "apply": "Build the condition in the filter panel and press Run."
  }
}
"#;

/// Write the starter rules file unless one is already there.
pub fn write_starter_rules(dir: &Path, lang: &str) -> std::io::Result<Option<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("intent_rules_{lang}.json"));
    if path.exists() {
        return Ok(None);
    }
    std::fs::write(&path, STARTER_RULES)?;
    Ok(Some(path))
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_path(config_path);

    println!("sopilot: first-time setup");
    println!("=========================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let config = if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.\n");
        super::load_config(&config_path)?
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config at: {}", config_path.display());
        AppConfig::default()
    };

    let templates = PromptTemplates::write_defaults(Path::new(&config.prompts.template_dir), &config.language)?;
    for path in &templates {
        println!("✅ Wrote prompt template {}", path.display());
    }
    if templates.is_empty() {
        println!("  Prompt templates already present in {}", config.prompts.template_dir);
    }

    match write_starter_rules(Path::new(&config.prompts.rules_dir), &config.language)? {
        Some(path) => println!("✅ Wrote intent rules {}", path.display()),
        None => println!("  Intent rules already present in {}", config.prompts.rules_dir),
    }

    std::fs::create_dir_all(&config.agent.output_dir)?;

    println!("\nNext steps:");
    println!("  1. Set GEMINI_API_KEY (or api_key in the config)");
    println!("  2. Start the BrowserGym bridge at {}", config.browser.bridge_url);
    println!("  3. sopilot doctor");
    println!("  4. sopilot run --task workarena.servicenow.create-change-request");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_rules_are_valid_json_and_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_starter_rules(dir.path(), "en").unwrap().unwrap();
        let rules: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(rules["CREATE"]["submit"].is_string());

        std::fs::write(&path, "{}").unwrap();
        assert!(write_starter_rules(dir.path(), "en").unwrap().is_none());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
