//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};

/// Memory orchestration CLI
///
/// Turns text into owner-scoped facts, episodes and graph triples, and
/// answers queries with a ranked context card.
#[derive(Parser, Debug)]
#[command(name = "trimem")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract memory from text and store it
    Write(WriteArgs),

    /// Retrieve ranked memory and a context card for a query
    Search(SearchArgs),

    /// Forget facts, entities or predicates (redact by default)
    Forget(ForgetArgs),

    /// List an owner's facts
    Facts(FactsArgs),

    /// Summarize recent episodes
    Summarize(SummarizeArgs),

    /// Show graph paths from the owner to an entity
    Explain(ExplainArgs),

    /// List graph nodes around the owner
    Graph(GraphArgs),

    /// Count an owner's facts, episodes and graph elements
    Stats(OwnerArgs),

    /// Run diagnostics
    Doctor,

    /// Show version
    Version,
}

/// Owner scope shared by every memory command
#[derive(Args, Debug)]
pub struct OwnerArgs {
    /// Owner the memory belongs to
    #[arg(short, long, env = "TRIMEM_OWNER")]
    pub owner: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub owner: OwnerArgs,

    /// Text to remember ("-" reads stdin)
    pub text: String,

    /// Channel the text came from
    #[arg(short, long, default_value = "cli")]
    pub channel: String,

    /// Conversation thread id
    #[arg(short, long)]
    pub thread: Option<String>,

    /// When the text was observed (RFC 3339, default: now)
    #[arg(long)]
    pub observed_at: Option<String>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub owner: OwnerArgs,

    /// Query text
    pub query: String,

    /// Maximum episodes to return
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Only consider episodes from the last N days
    #[arg(short, long)]
    pub since_days: Option<u32>,

    /// Skip graph paths and proximity
    #[arg(long)]
    pub no_graph: bool,

    /// Print only the context card
    #[arg(long, conflicts_with = "json")]
    pub card: bool,
}

#[derive(Args, Debug)]
pub struct ForgetArgs {
    #[command(flatten)]
    pub owner: OwnerArgs,

    /// Fact key to forget (repeatable)
    #[arg(short, long = "key", action = clap::ArgAction::Append)]
    pub keys: Vec<String>,

    /// Entity name to forget (repeatable, affects every owner)
    #[arg(short, long = "entity", action = clap::ArgAction::Append)]
    pub entities: Vec<String>,

    /// Predicate whose edges to forget (repeatable)
    #[arg(short, long = "predicate", action = clap::ArgAction::Append)]
    pub predicates: Vec<String>,

    /// Delete rows instead of redacting them
    #[arg(long)]
    pub hard: bool,
}

#[derive(Args, Debug)]
pub struct FactsArgs {
    #[command(flatten)]
    pub owner: OwnerArgs,

    /// Minimum confidence (default: configured threshold)
    #[arg(short, long)]
    pub min_confidence: Option<f64>,
}

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    #[command(flatten)]
    pub owner: OwnerArgs,

    /// Window in days (default: configured summary window)
    #[arg(short, long)]
    pub since_days: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ExplainArgs {
    #[command(flatten)]
    pub owner: OwnerArgs,

    /// Entity name
    pub entity: String,

    /// Maximum paths
    #[arg(short, long, default_value_t = 3)]
    pub k: usize,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    #[command(flatten)]
    pub owner: OwnerArgs,

    /// Only follow edges observed in the last N days
    #[arg(short, long)]
    pub since_days: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_forget() {
        let cli = Cli::try_parse_from([
            "trimem", "forget", "--owner", "acme", "--key", "match_formula", "--key", "office",
            "--predicate", "HAS_FORMULA", "--hard",
        ])
        .unwrap();

        let Commands::Forget(args) = cli.command else {
            panic!("expected forget");
        };
        assert_eq!(args.owner.owner, "acme");
        assert_eq!(args.keys, vec!["match_formula", "office"]);
        assert_eq!(args.predicates, vec!["HAS_FORMULA"]);
        assert!(args.entities.is_empty());
        assert!(args.hard);
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "trimem", "search", "-o", "acme", "401k match", "-k", "5", "--since-days", "60",
            "--no-graph",
        ])
        .unwrap();

        let Commands::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.query, "401k match");
        assert_eq!(args.k, Some(5));
        assert_eq!(args.since_days, Some(60));
        assert!(args.no_graph);
        assert!(!args.owner.json);
    }

    #[test]
    fn test_parse_graph_and_stats() {
        let cli = Cli::try_parse_from(["trimem", "graph", "-o", "acme", "--since-days", "30"]).unwrap();
        let Commands::Graph(args) = cli.command else {
            panic!("expected graph");
        };
        assert_eq!(args.owner.owner, "acme");
        assert_eq!(args.since_days, Some(30));

        let cli = Cli::try_parse_from(["trimem", "stats", "--owner", "acme", "--json"]).unwrap();
        let Commands::Stats(args) = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(args.owner, "acme");
        assert!(args.json);
    }

    #[test]
    fn test_card_conflicts_with_json() {
        let result = Cli::try_parse_from([
            "trimem", "search", "-o", "acme", "q", "--card", "--json",
        ]);
        assert!(result.is_err());
    }
}
