//! jump CLI entry point.

mod args;
mod engine;

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use jump_core::protocol::{NodeSummary, ReportLine};
use jump_core::{MatchOption, Selector};
use tracing::{error, info};

use crate::args::{CheckArgs, Cli, Commands, OutputFormat, QueryArgs, ReplayArgs};
use crate::engine::replay::{self, ReplayOptions, StampedLine};

fn main() {
    // Logs go to stderr; stdout carries results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Run a command. `Ok(false)` means it ran but found a problem worth a
/// non-zero exit (invalid selector, no match).
fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Check(args) => Ok(check(&args)),
        Commands::Query(args) => query(&args),
        Commands::Replay(args) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
            runtime.block_on(run_replay(&args))?;
            Ok(true)
        }
        Commands::Examples => {
            println!("{}", crate::args::EXAMPLES_TEXT);
            Ok(true)
        }
    }
}

fn check(args: &CheckArgs) -> bool {
    let mut valid = true;
    for source in &args.selectors {
        match Selector::parse(source) {
            Ok(selector) => println!("{}", selector),
            Err(e) => {
                eprintln!("{}", e.render(source));
                valid = false;
            }
        }
    }
    valid
}

fn query(args: &QueryArgs) -> anyhow::Result<bool> {
    let selector = match Selector::parse(&args.selector) {
        Ok(selector) => selector,
        Err(e) => bail!("Invalid selector\n{}", e.render(&args.selector)),
    };
    let root = replay::load_snapshot(&args.snapshot)?;
    let option = MatchOption {
        quick_find: args.quick_find,
        fast_query: args.fast_query,
    };

    let matches = if args.all {
        selector.query_all(&root, option, args.root)
    } else {
        selector.query(&root, option, args.root).into_iter().collect()
    };
    info!("{} match(es) for {}", matches.len(), selector);

    let summaries: Vec<NodeSummary> = matches.iter().map(NodeSummary::from).collect();
    match args.format {
        OutputFormat::Json if args.all => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Json => {
            if let Some(first) = summaries.first() {
                println!("{}", serde_json::to_string_pretty(first)?);
            }
        }
        OutputFormat::Text => {
            for summary in &summaries {
                println!("{}", describe(summary));
            }
        }
    }
    Ok(!summaries.is_empty())
}

async fn run_replay(args: &ReplayArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => replay::load_config(path)?,
        None => Default::default(),
    };
    let options = ReplayOptions {
        rules: args.rules.clone(),
        script: args.script.clone(),
        config,
        fail_actions: args.fail_actions,
        settle: Duration::from_millis(args.settle),
    };
    let lines = replay::replay(&options).await?;
    for line in &lines {
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string(line)?),
            OutputFormat::Text => println!("{}", describe_line(line)),
        }
    }
    Ok(())
}

fn describe(node: &NodeSummary) -> String {
    let mut out = format!("#{} {}", node.node_id, node.name.as_deref().unwrap_or("?"));
    if let Some(id) = &node.id {
        out.push_str(&format!(" id={}", id));
    }
    if let Some(text) = &node.text {
        out.push_str(&format!(" text={:?}", text));
    }
    let [left, top, right, bottom] = node.bounds;
    out.push_str(&format!(" [{},{}][{},{}]", left, top, right, bottom));
    out
}

fn describe_line(line: &StampedLine) -> String {
    match &line.line {
        ReportLine::Trigger(t) => format!(
            "{:>6}ms {} {} #{} -> {}",
            t.at_ms,
            t.rule,
            t.action,
            t.count,
            describe(&t.target)
        ),
        ReportLine::Diagnostic { at_ms, diagnostic } => format!("{:>6}ms {:?}", at_ms, diagnostic),
    }
}
