use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use node_rewriter::config::{
    load_config_from_path, load_rules_from_path, register_rules, Configuration, DirectoryLoader,
    RuleDefinition, RuleFile,
};
use node_rewriter::mutation::{splice, ActionKind, MutationResult};
use node_rewriter::{Rule, Warning, Workspace};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "node-rewriter")]
#[command(about = "Rule-driven structural source rewriting", long_about = None)]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG also applies
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run rules against a source tree
    Run {
        /// TOML file of [[rules]]
        #[arg(short, long)]
        rules: PathBuf,

        /// Run configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root directory, overriding the configuration
        #[arg(long)]
        root: Option<PathBuf>,

        /// Only run these rules (group/name); repeatable
        #[arg(long = "rule", value_name = "GROUP/NAME")]
        selected: Vec<String>,

        /// Number of worker threads, overriding the configuration
        #[arg(short, long)]
        workers: Option<usize>,

        /// Dry run - show what would change without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the rules in a rules file
    List {
        /// TOML file of [[rules]]
        #[arg(short, long)]
        rules: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            rules,
            config,
            root,
            selected,
            workers,
            dry_run,
            diff,
            json,
        } => cmd_run(RunArgs {
            rules,
            config,
            root,
            selected,
            workers,
            dry_run,
            diff,
            json,
        }),
        Commands::List { rules, json } => cmd_list(&rules, json),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct RunArgs {
    rules: PathBuf,
    config: Option<PathBuf>,
    root: Option<PathBuf>,
    selected: Vec<String>,
    workers: Option<usize>,
    dry_run: bool,
    diff: bool,
    json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Status {
    Changed,
    Unchanged,
    Skipped,
    Failed,
}

#[derive(Debug, Serialize)]
struct RuleReport {
    rule: String,
    status: Status,
    files: Vec<PathBuf>,
    warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    results: Vec<MutationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn load_configuration(args: &RunArgs) -> Result<Configuration> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(root) = &args.root {
        config.root_path = root.clone();
    }
    if let Some(workers) = args.workers {
        config.number_of_workers = workers;
    }
    Ok(config)
}

/// Resolve `--rule` selections, or every rule in file order.
fn select_rules(
    workspace: &Workspace,
    file_rules: Vec<Arc<Rule>>,
    selected: &[String],
) -> Result<Vec<Arc<Rule>>> {
    if selected.is_empty() {
        return Ok(file_rules);
    }
    let known: Vec<String> = workspace
        .registry()
        .list()
        .into_iter()
        .map(|(group, name)| format!("{group}/{name}"))
        .collect();

    selected
        .iter()
        .map(|id| {
            let found = id
                .split_once('/')
                .and_then(|(group, name)| workspace.registry().fetch(group, name));
            match found {
                Some(rule) => Ok(rule),
                None => match suggest(id, &known) {
                    Some(suggestion) => {
                        anyhow::bail!("unknown rule '{id}'. Did you mean '{suggestion}'?")
                    }
                    None => anyhow::bail!("unknown rule '{id}'"),
                },
            }
        })
        .collect()
}

fn suggest<'a>(id: &str, known: &'a [String]) -> Option<&'a str> {
    known
        .iter()
        .map(|candidate| (strsim::jaro_winkler(id, candidate), candidate))
        .filter(|(score, _)| *score > 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.as_str())
}

/// Contents of every file the loaded rules may touch, for diffs after a
/// committed run.
fn snapshot(workspace: &Workspace, definitions: &[RuleDefinition]) -> BTreeMap<PathBuf, String> {
    let mut snapshot = BTreeMap::new();
    for definition in definitions {
        let Ok(files) = workspace.glob(definition.files.as_slice()) else {
            continue;
        };
        for relative in files {
            if let Ok(content) = fs::read_to_string(workspace.root().join(&relative)) {
                snapshot.insert(relative, content);
            }
        }
    }
    snapshot
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (rewritten)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

/// Before/after text of a simulated result.
fn simulated_texts(root: &Path, result: &MutationResult) -> Result<Option<(String, String)>> {
    let (Some(relative), Some(actions)) = (&result.file_path, &result.actions) else {
        return Ok(None);
    };
    let path = root.join(relative);
    match actions.first().map(|action| action.kind) {
        Some(ActionKind::AddFile) => Ok(Some((
            String::new(),
            actions[0].new_code.clone().unwrap_or_default(),
        ))),
        Some(ActionKind::RemoveFile) => Ok(Some((
            fs::read_to_string(&path).unwrap_or_default(),
            String::new(),
        ))),
        _ => {
            let before = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let after = splice(&before, actions)
                .with_context(|| format!("rendering changes for {}", path.display()))?;
            Ok(Some((before, after)))
        }
    }
}

/// Warnings of `rule` and of every sub-rule it ran.
fn collect_warnings(workspace: &Workspace, rule: &Rule) -> Vec<Warning> {
    let mut warnings = rule.warnings();
    let mut seen = BTreeSet::from([rule.id()]);
    let mut pending = rule.sub_rules();
    while let Some(id) = pending.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(sub) = id
            .split_once('/')
            .and_then(|(group, name)| workspace.registry().fetch(group, name))
        else {
            continue;
        };
        warnings.extend(sub.warnings());
        pending.extend(sub.sub_rules());
    }
    warnings
}

fn run_rule(workspace: &Workspace, rule: &Rule, dry_run: bool) -> RuleReport {
    let mut report = RuleReport {
        rule: rule.id(),
        status: Status::Unchanged,
        files: Vec::new(),
        warnings: Vec::new(),
        results: Vec::new(),
        error: None,
    };

    match rule.guards_met(workspace.root()) {
        Ok(true) => {}
        Ok(false) => {
            report.status = Status::Skipped;
            return report;
        }
        Err(e) => {
            report.status = Status::Failed;
            report.error = Some(e.to_string());
            return report;
        }
    }

    let outcome = if dry_run {
        rule.test(workspace).map(|results| {
            report.files = results.iter().filter_map(|r| r.file_path.clone()).collect();
            report.results = results;
        })
    } else {
        rule.process(workspace)
            .map(|()| report.files = rule.affected_files().into_iter().collect())
    };
    report.warnings = collect_warnings(workspace, rule);

    match outcome {
        Ok(()) if report.files.is_empty() => report.status = Status::Unchanged,
        Ok(()) => report.status = Status::Changed,
        Err(e) => {
            report.status = Status::Failed;
            report.error = Some(e.to_string());
        }
    }
    report
}

fn cmd_run(args: RunArgs) -> Result<()> {
    // 1. Configuration and workspace
    let config = load_configuration(&args)?;
    let rule_file = load_rules_from_path(&args.rules)
        .with_context(|| format!("loading rules {}", args.rules.display()))?;
    let rules_dir = args
        .rules
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let workspace = Workspace::new(config)
        .context("preparing workspace")?
        .with_loader(Arc::new(DirectoryLoader::new(rules_dir)));

    // 2. Rules to run
    let file_rules = register_rules(&rule_file, workspace.registry());
    let rules = select_rules(&workspace, file_rules, &args.selected)?;

    let before = if args.diff && !args.dry_run && !args.json {
        snapshot(&workspace, &rule_file.rules)
    } else {
        BTreeMap::new()
    };

    if !args.json {
        println!("Root: {}", workspace.root().display());
        if args.dry_run {
            println!("{}", "[DRY RUN - showing what would change]".cyan());
        }
        println!();
    }

    // 3. Run and report
    let mut reports = Vec::new();
    for rule in &rules {
        let report = run_rule(&workspace, rule, args.dry_run);
        if !args.json {
            print_report(&report, args.dry_run);
            if args.diff {
                print_diffs(&workspace, &report, &before, args.dry_run)?;
            }
        }
        reports.push(report);
    }

    let failed = reports
        .iter()
        .filter(|r| matches!(r.status, Status::Failed))
        .count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_report(report: &RuleReport, dry_run: bool) {
    let verb = if dry_run { "Would rewrite" } else { "Rewrote" };
    match report.status {
        Status::Changed => {
            println!(
                "{} {}: {} {} file(s)",
                "✓".green(),
                report.rule,
                verb,
                report.files.len()
            );
            for file in &report.files {
                println!("  - {}", file.display());
            }
        }
        Status::Unchanged => println!("{} {}: No changes", "⊙".yellow(), report.rule),
        Status::Skipped => println!("{} {}: Skipped (guard not met)", "⊘".cyan(), report.rule),
        Status::Failed => {
            eprintln!(
                "{} {}: Failed - {}",
                "✗".red(),
                report.rule,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn print_diffs(
    workspace: &Workspace,
    report: &RuleReport,
    before: &BTreeMap<PathBuf, String>,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        for result in &report.results {
            if let (Some(file), Some((original, modified))) =
                (&result.file_path, simulated_texts(workspace.root(), result)?)
            {
                display_diff(file, &original, &modified);
            }
        }
        return Ok(());
    }
    for file in &report.files {
        let Some(original) = before.get(file) else {
            continue;
        };
        if let Ok(modified) = fs::read_to_string(workspace.root().join(file)) {
            if original != &modified {
                display_diff(file, original, &modified);
            }
        }
    }
    Ok(())
}

fn print_summary(reports: &[RuleReport]) {
    let count = |wanted: fn(&Status) -> bool| reports.iter().filter(|r| wanted(&r.status)).count();
    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} changed",
        format!("{}", count(|s| matches!(s, Status::Changed))).green()
    );
    println!(
        "  {} unchanged",
        format!("{}", count(|s| matches!(s, Status::Unchanged))).yellow()
    );
    println!(
        "  {} skipped",
        format!("{}", count(|s| matches!(s, Status::Skipped))).cyan()
    );
    println!(
        "  {} failed",
        format!("{}", count(|s| matches!(s, Status::Failed))).red()
    );
}

#[derive(Debug, Serialize)]
struct RuleListing<'a> {
    id: String,
    description: Option<&'a str>,
    files: &'a [String],
    sub_rules: &'a [String],
}

fn cmd_list(rules: &Path, json: bool) -> Result<()> {
    let file: RuleFile = load_rules_from_path(rules)
        .with_context(|| format!("loading rules {}", rules.display()))?;

    let listings: Vec<RuleListing<'_>> = file
        .rules
        .iter()
        .map(|definition| RuleListing {
            id: definition.id(),
            description: definition.description.as_deref(),
            files: &definition.files,
            sub_rules: &definition.sub_rules,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    println!("{} ({} rules)", "Rules".bold(), listings.len());
    for listing in &listings {
        match listing.description {
            Some(description) => println!("  {} - {}", listing.id.green(), description),
            None => println!("  {}", listing.id.green()),
        }
        println!("    files: {}", listing.files.join(", ").dimmed());
        if !listing.sub_rules.is_empty() {
            println!("    sub-rules: {}", listing.sub_rules.join(", ").dimmed());
        }
    }
    Ok(())
}
