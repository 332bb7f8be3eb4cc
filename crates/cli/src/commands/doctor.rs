//! `sopilot doctor`: diagnose system health.

use std::path::{Path, PathBuf};

use sopilot_browser::RemoteBrowserEnv;
use sopilot_config::AppConfig;
use sopilot_planner::SopLibrary;

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    println!("sopilot doctor: system diagnostics");
    println!("==================================\n");

    let mut issues = 0;
    let config_path = super::config_path(config_path);

    let config = if config_path.exists() {
        match AppConfig::load_with_env(&config_path) {
            Ok(config) => {
                println!("  ✅ Config file valid ({})", config_path.display());
                config
            }
            Err(e) => {
                println!("  ❌ Config file invalid: {e}");
                return Ok(());
            }
        }
    } else {
        println!("  ⚠️  No config file, using defaults. Run `sopilot onboard`.");
        issues += 1;
        AppConfig::default()
    };

    if config.has_api_key() {
        println!("  ✅ API key configured for {}", config.default_provider);
    } else {
        println!("  ❌ No API key. Set GEMINI_API_KEY or api_key in the config.");
        issues += 1;
    }

    let router = sopilot_providers::build_from_config(&config);
    match router.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider {} reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider {} reports unhealthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider {}: {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  ❌ Provider '{}' not available", router.default_name());
            issues += 1;
        }
    }

    let bridge = RemoteBrowserEnv::from_config(&config);
    match bridge.health_check().await {
        Ok(true) => println!("  ✅ Browser bridge up at {}", bridge.base_url()),
        Ok(false) => {
            println!("  ⚠️  Browser bridge at {} answered but is not healthy", bridge.base_url());
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Browser bridge: {e}");
            issues += 1;
        }
    }

    for (what, dir) in [
        ("Prompt templates", &config.prompts.template_dir),
        ("Intent rules", &config.prompts.rules_dir),
    ] {
        if Path::new(dir).is_dir() {
            println!("  ✅ {what} directory {dir}");
        } else {
            println!("  ⚠️  {what} directory {dir} missing, built-ins will be used");
        }
    }

    if config.sop.enabled {
        match SopLibrary::new(&config.sop.library_path, true).open() {
            Ok(n) => println!("  ✅ SOP library loaded ({n} entries)"),
            Err(e) => {
                println!("  ❌ {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ·  SOPs disabled");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
