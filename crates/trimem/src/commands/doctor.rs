//! Diagnostics command.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use trimem_sdk::core::Database;
use trimem_sdk::engine::{EPISODES_DB, FACTS_DB, GRAPH_DB};

use crate::config::Config;
use crate::engine::build_engine;

pub async fn execute(config: &Config) -> Result<()> {
    println!("{}", "trimem Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    // Check config file
    print!("  Config file: ");
    let config_path = Config::config_path();
    if config_path.exists() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    // Check data directory
    print!("  Data directory: ");
    let data_dir = &config.storage.data_dir;
    if data_dir.exists() {
        println!("{}", format!("✓ {}", data_dir.display()).green());
    } else {
        println!("{}", format!("○ {} will be created", data_dir.display()).yellow());
    }

    // Check each store on its own so one bad file doesn't hide the others
    println!();
    println!("  {}", "Stores:".cyan());
    for name in [FACTS_DB, EPISODES_DB, GRAPH_DB] {
        print!("    {}: ", name);
        match check_store(&data_dir.join(name)) {
            Ok(true) => println!("{}", "✓ connected".green()),
            Ok(false) => println!("{}", "○ not created yet".yellow()),
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push(format!("{} is not accessible", name));
            }
        }
    }

    // Check gateway
    println!();
    print!("  API key: ");
    if config.gateway.api_key.is_some() {
        println!("{}", "✓ configured".green());
    } else {
        println!("{}", "○ not set (TRIMEM_API_KEY)".yellow());
    }
    print!("  Gateway ({}): ", config.gateway.base_url);
    match build_engine(config) {
        Ok(engine) => match engine.health_check().await {
            Ok(dimensions) => println!(
                "{}",
                format!("✓ reachable ({} dimensions)", dimensions).green()
            ),
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push("Gateway health check failed".to_string());
            }
        },
        Err(e) => {
            println!("{}", format!("✗ {:#}", e).red());
            issues.push("Memory engine could not be initialized".to_string());
        }
    }

    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}

/// Open and ping a store file. `Ok(false)` when the file doesn't exist yet.
fn check_store(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let db = Database::open_path(path)?;
    db.ping()?;
    Ok(true)
}
