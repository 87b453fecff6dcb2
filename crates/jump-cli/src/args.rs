//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Rule-driven UI automation over captured window trees.
///
/// Check selectors, query them against snapshots, and replay timed event
/// scripts through the same scheduler that drives live automation.
#[derive(Debug, Parser)]
#[command(name = "jump", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse selectors and print their canonical form
    #[command(after_help = "\
Examples:
  jump check 'Button[text=\"OK\"]'            # Prints the canonical form
  jump check '@A > B' 'A <(1,3) B'            # Several at once
  jump check 'A[text~=\"[\"]'                  # Caret diagnostic, exit 1")]
    Check(CheckArgs),

    /// Run a selector against a snapshot file
    #[command(after_help = "\
Examples:
  jump query snap.json 'TextView[text^=\"Skip\"]'
  jump query snap.json '[vid=\"close\"]' --quick-find
  jump query snap.json 'ImageView' --all --format text")]
    Query(QueryArgs),

    /// Replay a timed event script through the rule engine
    #[command(after_help = "\
Script lines (JSON, one per line, at_ms never decreasing):
  {\"at_ms\": 0, \"event\": \"context\", \"app_id\": \"com.example\", \"activity_id\": \"com.example.Splash\"}
  {\"at_ms\": 50, \"event\": \"snapshot\", \"file\": \"splash.json\"}
  {\"at_ms\": 80, \"event\": \"content\", \"node\": 3}
  {\"at_ms\": 90, \"event\": \"stale\", \"node\": 3}

Examples:
  jump replay rules.json script.jsonl
  jump replay rules.json script.jsonl --fail-actions --settle 5000")]
    Replay(ReplayArgs),

    /// Show an end-to-end usage example
    Examples,
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON document (query) or JSON line (replay) per result.
    #[default]
    Json,
    /// Human-readable lines.
    Text,
}

#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    /// Selectors to check
    #[arg(required = true)]
    pub selectors: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct QueryArgs {
    /// Snapshot JSON file
    pub snapshot: PathBuf,

    /// Selector to run
    pub selector: String,

    /// Use the snapshot's id/vid/text index for literal equality predicates
    #[arg(long)]
    pub quick_find: bool,

    /// Search breadth-first so the shallowest match wins
    #[arg(long)]
    pub fast_query: bool,

    /// Print every match instead of the first
    #[arg(long)]
    pub all: bool,

    /// Let the root node itself match
    #[arg(long)]
    pub root: bool,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Debug, clap::Args)]
pub struct ReplayArgs {
    /// Rule set JSON file
    pub rules: PathBuf,

    /// Event script, JSON lines
    pub script: PathBuf,

    /// Scheduler timing overrides, JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Make every action fail
    #[arg(long)]
    pub fail_actions: bool,

    /// Milliseconds to keep running after the last event
    #[arg(long, default_value_t = 1000)]
    pub settle: u64,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

/// End-to-end example text for the `examples` command.
pub const EXAMPLES_TEXT: &str = r#"End-to-end example: skip a splash screen ad

# 1. Check the selector
jump check 'TextView[text^="Skip" && clickable=true]'

# 2. Try it on a captured window (snapshot JSON: nodes with id, pid, attr)
jump query splash.json 'TextView[text^="Skip" && clickable=true]'

# 3. Write a rule set (rules.json)
{"rules": [{
  "key": "skip-splash",
  "scope": {"type": "app", "app_id": "com.example", "activity_ids": ["com.example.Splash"]},
  "matches": ["TextView[text^=\"Skip\" && clickable=true]"],
  "action": "click",
  "action_delay_ms": 300,
  "action_maximum": 1
}]}

# 4. Script what the device does (script.jsonl)
{"at_ms": 0, "event": "context", "app_id": "com.example", "activity_id": "com.example.SplashActivity"}
{"at_ms": 100, "event": "snapshot", "file": "splash.json"}

# 5. Replay; each trigger and diagnostic is printed as a JSON line
jump replay rules.json script.jsonl

# The rule fires once, 300ms after the splash snapshot arrives.
# Set RUST_LOG=debug to watch the scheduler's decisions on stderr.
"#;

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, OutputFormat};
    use clap::Parser;

    #[test]
    fn test_check_requires_selector() {
        assert!(Cli::try_parse_from(["jump", "check"]).is_err());
        let cli = Cli::parse_from(["jump", "check", "A B", "@C"]);
        match cli.command {
            Commands::Check(args) => assert_eq!(args.selectors, vec!["A B", "@C"]),
            _ => panic!("Expected check command"),
        }
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::parse_from(["jump", "query", "snap.json", "[text='OK']", "--quick-find", "--all", "-f", "text"]);
        match cli.command {
            Commands::Query(args) => {
                assert!(args.quick_find);
                assert!(!args.fast_query);
                assert!(args.all);
                assert_eq!(args.format, OutputFormat::Text);
                assert_eq!(args.selector, "[text='OK']");
            }
            _ => panic!("Expected query command"),
        }
    }

    #[test]
    fn test_replay_defaults() {
        let cli = Cli::parse_from(["jump", "replay", "rules.json", "script.jsonl"]);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.settle, 1000);
                assert!(!args.fail_actions);
                assert!(args.config.is_none());
                assert_eq!(args.format, OutputFormat::Json);
            }
            _ => panic!("Expected replay command"),
        }
    }
}
