//! Graph commands: explain and subgraph.

use anyhow::{Context, Result};
use colored::Colorize;

use trimem_sdk::core::types::GraphNode;

use crate::cli::{ExplainArgs, GraphArgs};
use crate::config::Config;
use crate::engine::build_engine;

/// Show the owner's paths to an entity, shortest first.
pub async fn explain(args: ExplainArgs, config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let paths = engine
        .explain(&args.owner.owner, &args.entity, args.k)
        .await
        .context("Explain failed")?;

    if args.owner.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    if paths.is_empty() {
        println!(
            "{} No path from {} to {}",
            "⚠".yellow(),
            args.owner.owner,
            args.entity.bold()
        );
        return Ok(());
    }

    println!("{} {} paths to {}:", "✓".green(), paths.len(), args.entity.cyan());
    println!();
    for (i, path) in paths.iter().enumerate() {
        println!(
            "  {}. {} {}",
            i + 1,
            path.describe(),
            format!("({} hops)", path.len()).dimmed()
        );
    }
    Ok(())
}

/// List the nodes around the owner, nearest first.
pub async fn subgraph(args: GraphArgs, config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let nodes = engine
        .subgraph(&args.owner.owner, args.since_days)
        .await
        .context("Failed to read graph")?;

    if args.owner.json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }

    if nodes.is_empty() {
        println!("{} No graph nodes for {}", "⚠".yellow(), args.owner.owner);
        return Ok(());
    }

    let window = match args.since_days {
        Some(days) => format!("last {days} days"),
        None => "all time".to_string(),
    };
    println!(
        "{} {} nodes for {} {}",
        "✓".green(),
        nodes.len(),
        args.owner.owner.cyan(),
        format!("({window})").dimmed()
    );
    println!();
    for node in &nodes {
        println!("  {}", describe_node(node));
    }
    Ok(())
}

fn describe_node(node: &GraphNode) -> String {
    let kind = match node.entity_type {
        Some(entity_type) => format!("{}:{}", node.kind.as_str(), entity_type.as_str()),
        None => node.kind.as_str().to_string(),
    };
    format!("{} {}", format!("[{kind}]").dimmed(), node.label.bold())
}
