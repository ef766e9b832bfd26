//! Command line interface
//!
//! Release-pipeline entry points. Every command except `serve` is synchronous
//! and maps its outcome to a process exit code.

use crate::config::{PolicyConfig, Settings};
use crate::drift::{DriftDetector, SchemaModel};
use crate::history::RevisionStore;
use crate::pipeline::{GovernancePipeline, GovernanceRun, RunContext};
use crate::report::{render_dashboard, render_summary, StabilityScorer};
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "schema-governance", version, about = "Schema change governance: drift, gating and compliance reports")]
pub struct Cli {
    /// Directory holding one JSON document per revision
    #[arg(long, env = "REVISIONS_DIR", global = true)]
    pub revisions_dir: Option<PathBuf>,

    /// Governance policy file (TOML, YAML or JSON)
    #[arg(long, env = "POLICY_FILE", global = true)]
    pub policy: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load and linearize the revision chain
    CheckChain,
    /// Pre-flight drift gate; exits non-zero on any difference
    Drift(DriftArgs),
    /// Classify and gate pending revisions
    Run(RunArgs),
    /// Render a stored governance run
    Report(ReportArgs),
    /// Start the HTTP server
    Serve,
}

#[derive(Debug, Args)]
pub struct DriftArgs {
    /// Declared data model (JSON)
    #[arg(long, env = "DECLARED_MODEL")]
    pub declared: PathBuf,

    /// Applied revision; defaults to the chain tip
    #[arg(long)]
    pub current: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub branch: String,

    /// Policy environment, e.g. staging or production
    #[arg(long = "env")]
    pub policy_env: String,

    /// Report violations without failing the run
    #[arg(long)]
    pub advisory: bool,

    /// Operator override for a breaking revision (repeatable)
    #[arg(long = "allow-breaking", value_name = "REVISION")]
    pub allow_breaking: Vec<String>,

    /// Exclusive start of the pending range
    #[arg(long)]
    pub from: Option<String>,

    /// Inclusive end of the pending range
    #[arg(long)]
    pub to: Option<String>,

    /// Applied marker for `current` references
    #[arg(long)]
    pub current: Option<String>,

    /// Write the run document here
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl RunArgs {
    pub fn context(&self) -> RunContext {
        RunContext {
            branch: self.branch.clone(),
            policy_env: self.policy_env.clone(),
            enforce: !self.advisory,
            overrides: self.allow_breaking.iter().cloned().collect(),
            from: self.from.clone(),
            to: self.to.clone(),
            current: self.current.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Dashboard,
    Score,
    Summary,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Run document written by `run --out`
    #[arg(long)]
    pub run: PathBuf,

    #[arg(long, value_enum, default_value_t = ReportFormat::Summary)]
    pub format: ReportFormat,
}

impl Cli {
    /// Fold global flags into the environment-derived settings
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(dir) = &self.revisions_dir {
            settings.paths.revisions_dir = dir.clone();
        }
        if let Some(policy) = &self.policy {
            settings.paths.policy_file = policy.clone();
        }
    }
}

/// Run one synchronous command
pub fn execute(command: &Command, settings: &Settings) -> anyhow::Result<ExitCode> {
    match command {
        Command::CheckChain => check_chain(settings),
        Command::Drift(args) => drift(args, settings),
        Command::Run(args) => run(args, settings),
        Command::Report(args) => report(args, settings),
        Command::Serve => anyhow::bail!("serve is handled by the async entry point"),
    }
}

fn check_chain(settings: &Settings) -> anyhow::Result<ExitCode> {
    let history = RevisionStore::new(settings.paths.revisions_dir.clone()).load()?;
    let chain = history.linearize()?;

    for (position, revision) in chain.iter().enumerate() {
        println!(
            "{:>4}  {:<24} parent={:<24} ops={}{}",
            position,
            revision.id,
            revision.parent_id.as_deref().unwrap_or("-"),
            revision.upgrade.len(),
            if revision.is_irreversible() { "  irreversible" } else { "" }
        );
    }
    println!("{} revision(s), head={}", chain.len(), history.tip().unwrap_or("-"));
    Ok(ExitCode::SUCCESS)
}

fn drift(args: &DriftArgs, settings: &Settings) -> anyhow::Result<ExitCode> {
    let history = RevisionStore::new(settings.paths.revisions_dir.clone()).load()?;
    let declared = SchemaModel::load(&args.declared)
        .with_context(|| format!("reading declared model {}", args.declared.display()))?;

    let chain = match &args.current {
        Some(reference) => history.chain_until(&history.resolve(reference)?)?,
        None => history.linearize()?,
    };
    let report = DriftDetector::report(&declared, &chain)?;
    print!("{}", report.render());

    Ok(if report.has_drift() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run(args: &RunArgs, settings: &Settings) -> anyhow::Result<ExitCode> {
    let policy = PolicyConfig::load(&settings.paths.policy_file)?;
    let history = RevisionStore::new(settings.paths.revisions_dir.clone()).load()?;
    let run = GovernancePipeline::new(&policy).run(&history, &args.context())?;

    if let Some(out) = &args.out {
        std::fs::write(out, serde_json::to_string_pretty(&run)?)
            .with_context(|| format!("writing run document {}", out.display()))?;
        info!("💾 Run document written to {}", out.display());
    }
    print!("{}", render_summary(&run)?);

    Ok(if run.fails() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn report(args: &ReportArgs, settings: &Settings) -> anyhow::Result<ExitCode> {
    let raw = std::fs::read_to_string(&args.run)
        .with_context(|| format!("reading run document {}", args.run.display()))?;
    let run: GovernanceRun = serde_json::from_str(&raw)?;

    match args.format {
        ReportFormat::Dashboard => print!("{}", render_dashboard(&run)?),
        ReportFormat::Summary => print!("{}", render_summary(&run)?),
        ReportFormat::Score => {
            let policy = PolicyConfig::load(&settings.paths.policy_file)?;
            println!("{}", StabilityScorer::new(&policy).score(&run)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovernancePaths;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_revisions(dir: &TempDir) {
        let revisions = [
            json!({"id": "a1", "parent_id": null, "upgrade": [
                {"op": "create_table", "table": "cohorts", "columns": [{"name": "id", "type": "integer", "nullable": false}]}
            ], "downgrade": [{"op": "drop_table", "table": "cohorts"}]}),
            json!({"id": "b2", "parent_id": "a1", "upgrade": [
                {"op": "create_enum", "name": "cohort_status", "values": ["open"]}
            ], "downgrade": [{"op": "drop_enum", "name": "cohort_status"}]}),
            json!({"id": "c3", "parent_id": "b2", "upgrade": [
                {"op": "drop_enum", "name": "cohort_status"}
            ]}),
        ];
        for revision in revisions {
            let path = dir.path().join(format!("{}.json", revision["id"].as_str().unwrap()));
            fs::write(path, revision.to_string()).unwrap();
        }
    }

    fn settings_for(dir: &TempDir) -> Settings {
        Settings {
            server: Default::default(),
            cors: Default::default(),
            audit: Default::default(),
            paths: GovernancePaths {
                revisions_dir: dir.path().to_path_buf(),
                declared_model: None,
                policy_file: dir.path().join("governance.toml"),
            },
        }
    }

    #[test]
    fn test_run_flags_parse_into_context() {
        let cli = Cli::try_parse_from([
            "schema-governance",
            "run",
            "--branch",
            "main",
            "--env",
            "production",
            "--advisory",
            "--allow-breaking",
            "c3",
            "--from",
            "a1",
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                let context = args.context();
                assert!(!context.enforce);
                assert!(context.overrides.contains("c3"));
                assert_eq!(context.from.as_deref(), Some("a1"));
                assert_eq!(context.to, None);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_report_format_defaults_to_summary() {
        let cli = Cli::try_parse_from(["schema-governance", "report", "--run", "run.json"]).unwrap();
        match cli.command {
            Command::Report(args) => assert_eq!(args.format, ReportFormat::Summary),
            other => panic!("expected report, got {:?}", other),
        }
    }

    #[test]
    fn test_enforced_run_exit_code_and_document() {
        let dir = TempDir::new().unwrap();
        write_revisions(&dir);
        let settings = settings_for(&dir);
        let out = dir.path().join("run.out");

        let args = RunArgs {
            branch: "main".to_string(),
            policy_env: "production".to_string(),
            advisory: false,
            allow_breaking: vec![],
            from: None,
            to: None,
            current: None,
            out: Some(out.clone()),
        };
        assert_eq!(run(&args, &settings).unwrap(), ExitCode::FAILURE);

        let stored: GovernanceRun = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(stored.decisions.len(), 3);
        assert_eq!(stored.blocked_count(), 1);

        let advisory = RunArgs {
            advisory: true,
            out: None,
            ..args
        };
        assert_eq!(run(&advisory, &settings).unwrap(), ExitCode::SUCCESS);
    }

    #[test]
    fn test_drift_exit_code_follows_report() {
        let dir = TempDir::new().unwrap();
        write_revisions(&dir);
        let settings = settings_for(&dir);
        let declared = dir.path().join("declared.model");
        fs::write(
            &declared,
            json!({"tables": {"cohorts": {"columns": {"id": {"type": "INTEGER", "nullable": false}}}}}).to_string(),
        )
        .unwrap();

        let clean = DriftArgs {
            declared: declared.clone(),
            current: None,
        };
        assert_eq!(drift(&clean, &settings).unwrap(), ExitCode::SUCCESS);

        fs::write(
            &declared,
            json!({"tables": {"cohorts": {"columns": {"id": {"type": "text", "nullable": false}}}}}).to_string(),
        )
        .unwrap();
        assert_eq!(drift(&clean, &settings).unwrap(), ExitCode::FAILURE);
    }
}
