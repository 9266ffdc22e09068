use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use semguard_core::{Config, Report, Severity, TableKind};
use semguard_engine::{discover_projects, load_project, Auditor, MemorySink, ProjectResult};

/// Default config file name
const CONFIG_FILE: &str = "semguard.toml";

/// Environment variable naming a config file
const CONFIG_ENV: &str = "SEMGUARD_CONFIG";

/// SemGuard - governance checks for TMDL semantic models
#[derive(Parser)]
#[command(name = "semguard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: semguard.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit semantic-model projects and write report.json
    Check {
        /// Project directory, or a directory holding *.SemanticModel projects
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Append one JSON audit record per project to this file
        #[arg(long)]
        audit_log: Option<PathBuf>,

        /// Fail when a project scores below this (overrides config)
        #[arg(long)]
        pass_mark: Option<u32>,
    },

    /// Show the model parsed from one project
    Inspect {
        /// Project directory
        path: PathBuf,

        /// Print the model as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a semguard.toml with the default settings
    InitConfig {
        /// Where to write the config
        #[arg(default_value = CONFIG_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(explicit: Option<&Path>, verbose: bool) -> Result<Config> {
    let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let path = explicit
        .map(Path::to_path_buf)
        .or(from_env)
        .or_else(|| Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.exists()));

    match path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            if verbose {
                eprintln!("{}", "No config file found, using defaults".yellow());
            }
            Ok(Config::default())
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check {
            path,
            output,
            audit_log,
            pass_mark,
        } => {
            let mut config = load_config(cli.config.as_deref(), cli.verbose)?;
            if let Some(pass_mark) = pass_mark {
                config.scoring.pass_mark = pass_mark;
            }
            let passed = check_command(config, &path, &output, audit_log.as_deref(), cli.verbose)?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Inspect { path, json } => {
            let config = load_config(cli.config.as_deref(), cli.verbose)?;
            inspect_command(config, &path, json)
        }
        Commands::InitConfig { output, force } => init_config_command(&output, force),
    }
}

/// Check command - audit every project, returns whether all passed
fn check_command(
    config: Config,
    path: &Path,
    output: &Path,
    audit_log: Option<&Path>,
    verbose: bool,
) -> Result<bool> {
    let projects = discover_projects(path);
    tracing::debug!(root = %path.display(), projects = projects.len(), "Discovered projects");
    if verbose {
        eprintln!(
            "{} {} project(s) under {}",
            "Auditing".cyan(),
            projects.len(),
            path.display()
        );
    }

    let pass_mark = config.scoring.pass_mark;
    let auditor = Auditor::new(config);
    let sink = MemorySink::new();
    let results = auditor.audit_batch(&projects, &sink);

    let mut report = Report::from_projects(results.iter().map(ProjectResult::to_report).collect());
    report.metadata = Some(serde_json::json!({
        "root": path.display().to_string(),
        "pass_mark": pass_mark,
    }));
    report
        .save_to_file(output)
        .with_context(|| format!("Failed to write report to {}", output.display()))?;

    if let Some(audit_log) = audit_log {
        append_audit_log(audit_log, sink)?;
    }

    print_report_summary(&report, pass_mark);
    println!("Report written to {}", output.display().to_string().bold());

    Ok(results.iter().all(|r| r.passed(pass_mark)))
}

fn append_audit_log(path: &Path, sink: MemorySink) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open audit log {}", path.display()))?;

    for record in sink.into_records() {
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

fn print_report_summary(report: &Report, pass_mark: u32) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Semantic Model Governance Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Projects:   {}", report.projects.len());
    println!("  Total diagnostics: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:     {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:     {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings:   {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings:   {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:       {}", report.summary.info);
    println!("  Suppressed: {}", report.summary.suppressed);
    println!();

    for project in &report.projects {
        let score = format!("{}/100", project.score);
        let score = if project.score >= pass_mark {
            score.green().bold()
        } else {
            score.red().bold()
        };
        println!("{} {}", project.name.bold(), score);

        let active: Vec<_> = project
            .diagnostics
            .iter()
            .filter(|entry| !entry.diagnostic.suppressed)
            .collect();

        if active.is_empty() {
            println!("  {}", "✓ No issues found!".green());
        }

        for entry in active {
            let diag = &entry.diagnostic;
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);
            if let Some(loc) = &diag.location {
                println!("    at {}", loc);
            }
        }

        if project.summary.suppressed > 0 {
            println!(
                "  {}",
                format!("{} finding(s) allowed by overrides", project.summary.suppressed).dimmed()
            );
        }
        println!();
    }

    println!("{}", "=".repeat(60).bright_blue());
}

/// Inspect command - print the parsed model
fn inspect_command(config: Config, path: &Path, json: bool) -> Result<()> {
    let input = load_project(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let result = Auditor::new(config).audit_project(&input);
    let model = result.model();

    if json {
        println!("{}", serde_json::to_string_pretty(model)?);
        return Ok(());
    }

    println!("{} {}", "Project:".bold(), result.name);
    if let Some(culture) = &model.culture {
        println!("Culture: {}", culture);
    }
    println!();

    println!("{}", "Tables:".bold());
    for table in &model.tables {
        let kind = match table.kind {
            TableKind::Fact => "fact".cyan(),
            TableKind::Dimension => "dimension".green(),
            TableKind::Unknown => "unknown".dimmed(),
        };
        let hidden = if table.is_hidden { " (hidden)" } else { "" };
        println!(
            "  {} [{}]{} - {} columns, {} measures",
            table.name, kind, hidden,
            table.columns.len(),
            table.measures.len()
        );

        for measure in &table.measures {
            println!("    - {} ({} references)", measure.name, measure.reference_count);
        }
    }

    if !model.relationships.is_empty() {
        println!();
        println!("{}", "Relationships:".bold());
        for relationship in &model.relationships {
            let marker = if relationship.resolved { "" } else { " (unresolved)" };
            println!(
                "  {}[{}] -> {}[{}]{}",
                relationship.from_table,
                relationship.from_column,
                relationship.to_table,
                relationship.to_column,
                marker
            );
        }
    }

    if !model.roles.is_empty() {
        println!();
        println!("{}", "Roles:".bold());
        for role in &model.roles {
            println!("  {} ({} table permissions)", role.name, role.table_permissions.len());
        }
    }

    if !model.visuals.is_empty() {
        println!();
        println!("{} {}", "Visuals:".bold(), model.visuals.len());
    }

    Ok(())
}

/// Init-config command - write the default configuration
fn init_config_command(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    Config::default()
        .save_to_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("{} {}", "Wrote".green(), output.display());
    Ok(())
}
