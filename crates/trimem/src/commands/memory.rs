//! Memory commands: write, search, forget, facts, summarize and stats.
//!
//! Each command opens the local stores, runs one engine operation and prints
//! either colored text or, with `--json`, the operation's result.

use std::io::Read;

use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use serde::Serialize;
use trimem_sdk::core::Removal;
use trimem_sdk::utils::parse_datetime;
use trimem_sdk::{ForgetReport, ForgetRequest, RankedResult, RetrieveRequest, WriteOutcome, WriteRequest};

use crate::cli::{FactsArgs, ForgetArgs, OwnerArgs, SearchArgs, SummarizeArgs, WriteArgs};
use crate::config::Config;
use crate::engine::build_engine;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve the text argument, reading stdin for "-".
fn read_text(text: &str) -> Result<String> {
    if text != "-" {
        return Ok(text.to_string());
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read text from stdin")?;
    Ok(buffer)
}

/// Build a write request from CLI arguments.
fn write_request(args: &WriteArgs, text: String) -> Result<WriteRequest> {
    let mut request = WriteRequest::new(&args.owner.owner, text, &args.channel);
    if let Some(observed_at) = &args.observed_at {
        let parsed = parse_datetime(observed_at)
            .ok_or_else(|| anyhow!("Invalid --observed-at: {} (expected RFC 3339)", observed_at))?;
        request = request.with_observed_at(parsed);
    }
    if let Some(thread) = &args.thread {
        request = request.with_thread_id(thread);
    }
    Ok(request)
}

/// Extract memory from text and store it.
pub async fn write(args: WriteArgs, config: &Config) -> Result<()> {
    let text = read_text(&args.text)?;
    let request = write_request(&args, text)?;
    let engine = build_engine(config)?;

    let outcome = engine.write(request).await.context("Write failed")?;

    if args.owner.json {
        return print_json(&outcome);
    }
    print_write_outcome(&outcome);
    Ok(())
}

fn print_write_outcome(outcome: &WriteOutcome) {
    let report = &outcome.report;
    let marker = if report.is_complete() {
        "✓".green()
    } else if report.is_partial() {
        "⚠".yellow()
    } else {
        "✗".red()
    };

    println!("{} Stored {} items", marker, report.total_written());
    println!("  Facts:    {}", report.facts_written);
    println!("  Episodes: {}", report.episodes_written);
    println!("  Entities: {}", report.entities_written);
    println!("  Triples:  {}", report.triples_written);

    for failure in &report.failures {
        println!(
            "  {} {} store: {} ({})",
            "✗".red(),
            failure.store,
            failure.item,
            failure.error.dimmed()
        );
    }

    let diagnostics = &outcome.diagnostics;
    if diagnostics.gateway_failures > 0 || diagnostics.malformed_payloads > 0 {
        println!(
            "  {} extraction incomplete: {} gateway failures, {} malformed payloads",
            "⚠".yellow(),
            diagnostics.gateway_failures,
            diagnostics.malformed_payloads
        );
    }
    if diagnostics.dropped() > 0 {
        println!(
            "  {}",
            format!("{} extracted items dropped by validation", diagnostics.dropped()).dimmed()
        );
    }
}

/// Retrieve ranked memory for a query.
pub async fn search(args: SearchArgs, config: &Config) -> Result<()> {
    let mut request = RetrieveRequest::new(&args.owner.owner, &args.query);
    if let Some(k) = args.k {
        request = request.with_k(k);
    }
    if let Some(days) = args.since_days {
        request = request.with_since_days(days);
    }
    if args.no_graph {
        request = request.without_graph();
    }

    let engine = build_engine(config)?;
    let result = engine.retrieve(&request).await.context("Search failed")?;

    if args.owner.json {
        return print_json(&result);
    }
    if args.card {
        println!("{}", result.context_card);
        return Ok(());
    }
    print_ranked(&result);
    Ok(())
}

fn print_ranked(result: &RankedResult) {
    println!("{}", "Context".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("{}", result.context_card);
    println!();

    if !result.facts.is_empty() {
        println!("{} ({})", "Facts".cyan(), result.facts.len());
        for fact in &result.facts {
            println!(
                "  {} = {} {}",
                fact.key.bold(),
                fact.value,
                format!("[{:.2}]", fact.confidence).dimmed()
            );
        }
        println!();
    }

    if !result.episodes.is_empty() {
        println!("{} ({})", "Episodes".cyan(), result.episodes.len());
        for (i, scored) in result.episodes.iter().enumerate() {
            let s = &scored.score;
            println!(
                "  {}. {} {}",
                i + 1,
                format!("[{:.3}]", s.total).green(),
                scored.episode.text
            );
            println!(
                "     {}",
                format!(
                    "sim {:.2} · rec {:.2} · imp {:.2} · graph {:.2} · {}",
                    s.similarity,
                    s.recency,
                    s.importance,
                    s.graph_proximity,
                    scored.episode.observed_at.format("%Y-%m-%d")
                )
                .dimmed()
            );
        }
        println!();
    }

    if !result.graph_hits.is_empty() {
        println!("{} ({})", "Graph".cyan(), result.graph_hits.len());
        for path in &result.graph_hits {
            println!("  {}", path.describe());
        }
        println!();
    }

    println!("{}", result.rationale.dimmed());
}

fn forget_request(args: &ForgetArgs) -> ForgetRequest {
    let mut request = ForgetRequest::keys(args.keys.iter().cloned());
    for entity in &args.entities {
        request = request.with_entity(entity.clone());
    }
    for predicate in &args.predicates {
        request = request.with_predicate(predicate.clone());
    }
    request
}

/// Forget facts, entities or predicate edges.
pub async fn forget(args: ForgetArgs, config: &Config) -> Result<()> {
    let request = forget_request(&args);
    if request.is_empty() {
        bail!("Nothing to forget: pass --key, --entity or --predicate");
    }

    let engine = build_engine(config)?;
    let report = engine
        .forget(&args.owner.owner, &request, args.hard)
        .await
        .context("Forget failed")?;

    if args.owner.json {
        return print_json(&report);
    }
    print_forget_report(&report);
    Ok(())
}

fn print_forget_report(report: &ForgetReport) {
    let verb = match report.mode {
        Removal::Redact => "Redacted",
        Removal::Delete => "Deleted",
    };
    let marker = if report.success { "✓".green() } else { "⚠".yellow() };

    println!("{} {} {} items", marker, verb, report.total_removed());
    println!("  Facts:       {}", report.facts_removed);
    println!("  Episodes:    {}", report.episodes_removed);
    println!("  Graph nodes: {}", report.graph_nodes_removed);
    println!("  Graph edges: {}", report.graph_edges_removed);

    for failure in &report.failures {
        println!(
            "  {} {} store: {} ({})",
            "✗".red(),
            failure.store,
            failure.item,
            failure.error.dimmed()
        );
    }
}

/// List an owner's facts.
pub async fn facts(args: FactsArgs, config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let facts = engine
        .facts(&args.owner.owner, args.min_confidence)
        .await
        .context("Failed to list facts")?;

    if args.owner.json {
        return print_json(&facts);
    }

    if facts.is_empty() {
        println!("{} No facts found for {}", "⚠".yellow(), args.owner.owner);
        return Ok(());
    }

    println!("{} {} facts for {}:", "✓".green(), facts.len(), args.owner.owner.cyan());
    println!();
    for fact in &facts {
        println!(
            "  {} = {} {}",
            fact.key.bold(),
            fact.value,
            format!(
                "[{:.2}, {}, {}]",
                fact.confidence,
                fact.source,
                fact.observed_at.format("%Y-%m-%d %H:%M")
            )
            .dimmed()
        );
    }
    Ok(())
}

/// Summarize recent episodes.
pub async fn summarize(args: SummarizeArgs, config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let summary = engine
        .summarize_recent(&args.owner.owner, args.since_days)
        .await
        .context("Summarize failed")?;

    if args.owner.json {
        return print_json(&summary);
    }

    println!(
        "{} {}",
        format!("Last {} days", summary.since_days).cyan().bold(),
        format!("({} episodes)", summary.episode_count).dimmed()
    );
    println!("{}", "─".repeat(50));
    println!("{}", summary.summary);
    Ok(())
}

/// Show how much memory an owner holds in each store.
pub async fn stats(args: OwnerArgs, config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let stats = engine.stats(&args.owner).await.context("Failed to count memory")?;

    if args.json {
        return print_json(&stats);
    }

    println!("{} Memory for {}", "✓".green(), stats.owner_id.cyan());
    println!("  Facts:       {}", stats.facts);
    println!(
        "  Episodes:    {} {}",
        stats.episodes,
        format!("({} distinct)", stats.distinct_episode_texts).dimmed()
    );
    println!("  Graph nodes: {}", stats.graph_nodes);
    println!("  Graph edges: {}", stats.graph_edges);
    Ok(())
}
