use clap::Parser;
use colored::*;
use concord_core::{
    detect_conflicts, generate_change_set, Change, ChangeSet, DiffConfig, ResolutionSuggestion,
    Severity, StrategyKind,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "merge-walkthrough")]
#[command(about = "Diff two edits of a JSON document and merge them", long_about = None)]
struct Cli {
    /// Common ancestor document (a built-in sample is used when omitted)
    #[arg(short, long, requires_all = ["ours", "theirs"])]
    base: Option<PathBuf>,

    /// First edited document
    #[arg(short, long)]
    ours: Option<PathBuf>,

    /// Second edited document
    #[arg(short, long)]
    theirs: Option<PathBuf>,

    /// Merge strategy: ours, theirs, automatic or manual
    #[arg(short, long, default_value = "automatic")]
    strategy: StrategyKind,

    /// Compare arrays index by index instead of detecting moves
    #[arg(long)]
    no_moves: bool,

    /// Log filter passed to tracing-subscriber
    #[arg(long, default_value = "warn")]
    log: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(cli.log.as_str()).init();

    let (base, ours, theirs) = match (&cli.base, &cli.ours, &cli.theirs) {
        (Some(base), Some(ours), Some(theirs)) => (read_json(base)?, read_json(ours)?, read_json(theirs)?),
        _ => sample_documents(),
    };

    let config = DiffConfig::from_env()?.with_array_moves(!cli.no_moves);

    println!("{}", "Concord merge walkthrough".bold().cyan());
    println!("{}", "=========================".cyan());
    println!("Base: {}", serde_json::to_string_pretty(&base)?);

    let ours = generate_change_set("ours", &base, &ours, BTreeMap::new(), &config)?;
    let theirs = generate_change_set("theirs", &base, &theirs, BTreeMap::new(), &config)?;
    print_change_set(&ours);
    print_change_set(&theirs);

    let report = detect_conflicts(Some(&base), &ours, &theirs)?;
    println!("\n{}", "Conflicts".bold());
    if report.is_empty() {
        println!("  {}", "none".green());
    }
    for conflict in &report.conflicts {
        let severity = match conflict.severity {
            Severity::High => conflict.severity.to_string().red(),
            Severity::Medium => conflict.severity.to_string().yellow(),
            Severity::Low => conflict.severity.to_string().green(),
        };
        println!(
            "  [{}] {} at '{}': {}",
            severity, conflict.conflict_type, conflict.path, conflict.description
        );
        match &conflict.resolution {
            Some(ResolutionSuggestion::Automatic { strategy, description }) => {
                println!("      suggestion: {} ({})", description, strategy)
            }
            Some(ResolutionSuggestion::Manual { suggestion }) => {
                println!("      suggestion: {}", suggestion)
            }
            None => {}
        }
    }

    let strategy = cli.strategy.build();
    println!(
        "\n{} {} - {}",
        "Merging with".bold(),
        strategy.name().bold(),
        strategy.description()
    );

    match strategy.merge(&base, &ours, &theirs, &report.conflicts) {
        Ok(result) => {
            println!("Merged: {}", serde_json::to_string_pretty(&result.merged_document)?);
            println!(
                "Resolved: {}, unresolved: {}",
                result.resolved_conflicts.len().to_string().green(),
                result.unresolved_conflicts.len().to_string().red()
            );
            for conflict in &result.unresolved_conflicts {
                println!("  left unresolved: {}", conflict.path.to_string().yellow());
            }
        }
        Err(e) => println!("{} {}", "Merge refused:".red().bold(), e),
    }

    Ok(())
}

fn read_json(path: &PathBuf) -> Result<Value, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn sample_documents() -> (Value, Value, Value) {
    let base = json!({
        "title": "Launch checklist",
        "status": "open",
        "tags": ["release", "q3"],
        "steps": ["write notes", "tag build", "announce"]
    });
    let ours = json!({
        "title": "Launch checklist",
        "status": "closed",
        "tags": ["release", "q3"],
        "steps": ["tag build", "write notes", "announce"]
    });
    let theirs = json!({
        "title": "Launch checklist v2",
        "status": "archived",
        "tags": ["release", "q3", "urgent"],
        "steps": ["write notes", "tag build", "announce"]
    });
    (base, ours, theirs)
}

fn print_change_set(change_set: &ChangeSet) {
    println!(
        "\n{} ({} changes)",
        change_set.name().bold(),
        change_set.changes().len()
    );
    for change in change_set.changes() {
        let line = match change {
            Change::Add { path, value } => format!("+ {} = {}", path, value).green(),
            Change::Remove { path, old_value } => format!("- {} (was {})", path, old_value).red(),
            Change::Replace {
                path,
                old_value,
                new_value,
            } => format!("~ {}: {} -> {}", path, old_value, new_value).yellow(),
            Change::Move { from, to, value } => format!("> {} -> {} ({})", from, to, value).blue(),
        };
        println!("  {}", line);
    }
}
