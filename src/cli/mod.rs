//! SSG-017: CLI subcommands.

use crate::core::inputs::{DeploymentInputs, DEFAULT_ENVIRONMENT};
use crate::core::settings::Settings;
use crate::core::{codegen, parser, planner, resolver, state, types};
use crate::stacks::root;
use crate::tripwire::{drift, eventlog, hasher};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "ssg-infra",
    version,
    about = "CloudFormation synthesizer for the ScanSafeGuard platform"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter ssg.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate ssg.yaml and the deployment inputs, build the stack graph, write nothing
    Validate {
        /// Path to ssg.yaml
        #[arg(short, long, default_value = "ssg.yaml")]
        file: PathBuf,

        /// List every stack with its resource types
        #[arg(short, long)]
        verbose: bool,
    },

    /// Render every stack to a CloudFormation template
    Synth {
        /// Path to ssg.yaml
        #[arg(short, long, default_value = "ssg.yaml")]
        file: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,

        /// Only this stack and the stacks it depends on
        #[arg(short, long)]
        stack: Option<String>,
    },

    /// Show what changed since the last synthesis
    Plan {
        /// Path to ssg.yaml
        #[arg(short, long, default_value = "ssg.yaml")]
        file: PathBuf,

        /// Output directory holding the previous manifest
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Detect edited or missing templates (tripwire)
    Drift {
        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,

        /// Exit non-zero on any drift (for CI)
        #[arg(long)]
        tripwire: bool,
    },

    /// Show the last synthesis from the manifest
    Status {
        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Print every resolved tunable with its source
    Settings {
        /// Path to ssg.yaml
        #[arg(short, long, default_value = "ssg.yaml")]
        file: PathBuf,

        /// Environment block to resolve (default: $ENVIRONMENT or dev)
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Print the JSON Schema of ssg.yaml
    Schema,

    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file, verbose } => {
            cmd_validate(&file, &DeploymentInputs::from_env()?, verbose)
        }
        Commands::Synth { file, out, stack } => {
            cmd_synth(&file, &out, stack.as_deref(), &DeploymentInputs::from_env()?)
        }
        Commands::Plan { file, out } => cmd_plan(&file, &out, &DeploymentInputs::from_env()?),
        Commands::Drift { out, tripwire } => cmd_drift(&out, tripwire),
        Commands::Status { out } => cmd_status(&out),
        Commands::Settings { file, environment } => {
            let environment = environment
                .or_else(|| std::env::var("ENVIRONMENT").ok())
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
            cmd_settings(&file, &environment)
        }
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ssg-infra", &mut std::io::stdout());
            Ok(())
        }
    }
}

const STARTER_CONFIG: &str = r#"version: "1.0"
app: SSG-Stack

# Global values apply to every environment; a block named after the
# environment (ENVIRONMENT, default dev) overrides them.
context:
  lambdaMemorySize: 1024
  lambdaTimeout: 30
  queueRetentionPeriod: 3
  logRetentionPeriod: ONE_WEEK
  removalPolicy: DESTROY
  dev:
    lambdaMemorySize: 512
  prod:
    removalPolicy: RETAIN
    logRetentionPeriod: THREE_MONTHS
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("ssg.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&config_path, STARTER_CONFIG)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized ssg-infra project at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

/// Parse and validate a context file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::SynthConfig, String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} validation error(s)", errors.len()))
}

/// Parse, validate, and compose the full app.
fn load_app(file: &Path, inputs: &DeploymentInputs) -> Result<types::App, String> {
    let config = parse_and_validate(file)?;
    root::build_app(&config, inputs)
}

fn cmd_validate(file: &Path, inputs: &DeploymentInputs, verbose: bool) -> Result<(), String> {
    let app = load_app(file, inputs)?;
    let waves = resolver::deployment_waves(&app)?;

    println!(
        "OK: {} ({} stacks, {} resources, {} waves, environment {})",
        app.name,
        app.stacks.len(),
        app.resource_count(),
        waves.len(),
        app.environment
    );
    if verbose {
        for (i, wave) in waves.iter().enumerate() {
            println!("Wave {}:", i + 1);
            for name in wave {
                let Some(stack) = app.stack(name) else {
                    continue;
                };
                println!("  {} ({} resources)", name, stack.resource_count());
                let mut counts: Vec<_> = types::count_by_type(stack).into_iter().collect();
                counts.sort_unstable();
                for (resource_type, n) in counts {
                    println!("    {} x{}", resource_type, n);
                }
            }
        }
    }
    Ok(())
}

fn cmd_synth(
    file: &Path,
    out: &Path,
    only: Option<&str>,
    inputs: &DeploymentInputs,
) -> Result<(), String> {
    let app = load_app(file, inputs)?;
    let result = codegen::synth(&app, out, only)?;

    for path in &result.written {
        println!("  wrote {}", path.display());
    }
    println!();
    println!(
        "Synthesized {} stack(s) to {} in {:.2}s (run {}).",
        result.written.len(),
        out.display(),
        result.total_seconds,
        result.run_id
    );
    Ok(())
}

fn cmd_plan(file: &Path, out: &Path, inputs: &DeploymentInputs) -> Result<(), String> {
    let app = load_app(file, inputs)?;
    let order = resolver::build_execution_order(&app)?;
    let previous = state::load_manifest(out)?;
    let plan = planner::plan(&app, &order, previous.as_ref())?;

    print_plan(&plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &types::SynthPlan) {
    println!("Planning: {} ({} stacks)", plan.app, plan.changes.len());
    println!();
    for change in &plan.changes {
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Update => "~",
            types::PlanAction::Destroy => "-",
            types::PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }
    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn require_manifest(out: &Path) -> Result<types::Manifest, String> {
    state::load_manifest(out)?.ok_or_else(|| {
        format!(
            "no manifest in {}; run `ssg-infra synth` first",
            out.display()
        )
    })
}

fn cmd_drift(out: &Path, tripwire_mode: bool) -> Result<(), String> {
    let manifest = require_manifest(out)?;
    println!(
        "Checking {} ({} templates)...",
        manifest.app,
        manifest.stacks.len()
    );
    let findings = drift::detect_drift(out, &manifest);

    if findings.is_empty() {
        println!("No drift detected.");
        return Ok(());
    }
    for f in &findings {
        println!("  DRIFTED: {} ({})", f.stack, f.detail);
        println!("    Expected: {}", f.expected_hash);
        println!("    Actual:   {}", f.actual_hash);
        eventlog::append_event(
            out,
            types::SynthEvent::DriftDetected {
                stack: f.stack.clone(),
                expected_hash: f.expected_hash.clone(),
                actual_hash: f.actual_hash.clone(),
            },
        )?;
    }
    println!();
    println!("Drift detected: {} template(s)", findings.len());
    if tripwire_mode {
        return Err(format!("{} drift finding(s)", findings.len()));
    }
    Ok(())
}

fn cmd_status(out: &Path) -> Result<(), String> {
    let Some(manifest) = state::load_manifest(out)? else {
        println!("No manifest found. Run `ssg-infra synth` first.");
        return Ok(());
    };

    println!("App: {} (environment {})", manifest.app, manifest.environment);
    if let Some(stage) = &manifest.stage {
        println!("  Stage: {}", stage);
    }
    println!("  Generated: {}", manifest.generated_at);
    println!("  Generator: {}", manifest.generator);
    println!("  Stacks: {}", manifest.stacks.len());
    let fingerprint = hasher::fingerprint(
        manifest
            .order
            .iter()
            .filter_map(|n| manifest.stacks.get(n).map(|e| (n.as_str(), e.hash.as_str()))),
    );
    println!("  Fingerprint: {}", fingerprint);

    for name in &manifest.order {
        let Some(entry) = manifest.stacks.get(name) else {
            continue;
        };
        let deps = if entry.dependencies.is_empty() {
            String::new()
        } else {
            format!(" after {}", entry.dependencies.join(", "))
        };
        println!(
            "    {}: {} resources [{}]{}",
            name, entry.resources, entry.hash, deps
        );
    }

    let last_run = eventlog::read_events(out)?
        .into_iter()
        .rev()
        .find_map(|e| match e.event {
            types::SynthEvent::SynthCompleted {
                run_id,
                total_seconds,
                ..
            } => Some((e.ts, run_id, total_seconds)),
            _ => None,
        });
    if let Some((ts, run_id, secs)) = last_run {
        println!("  Last run: {} at {} ({:.2}s)", run_id, ts, secs);
    }
    Ok(())
}

fn cmd_settings(file: &Path, environment: &str) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let rows = Settings::new(environment, &config.context).describe()?;
    let width = rows.iter().map(|(k, _, _)| k.len()).max().unwrap_or(0);

    println!("Settings for environment '{}':", environment);
    for (key, value, source) in rows {
        println!("  {:width$}  {} ({})", key, value, source, width = width);
    }
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    println!("{}", parser::config_schema()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inputs::sample_inputs;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ssg.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_ssg017_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ssg017_parse_synth_args() {
        let cli = Cli::parse_from(["ssg-infra", "synth", "--stack", "SsgBatch"]);
        match cli.command {
            Commands::Synth { file, out, stack } => {
                assert_eq!(file, PathBuf::from("ssg.yaml"));
                assert_eq!(out, PathBuf::from("cdk.out"));
                assert_eq!(stack.as_deref(), Some("SsgBatch"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_ssg017_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("project");
        cmd_init(&sub).unwrap();
        let config = parser::parse_config_file(&sub.join("ssg.yaml")).unwrap();
        assert!(parser::validate_config(&config).is_empty());
    }

    #[test]
    fn test_ssg017_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "exists");
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_ssg017_validate_valid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), STARTER_CONFIG);
        cmd_validate(&file, &sample_inputs(), true).unwrap();
    }

    #[test]
    fn test_ssg017_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(
            dir.path(),
            "version: \"2.0\"\ncontext:\n  lambdaMemory: 1\n",
        );
        let err = cmd_validate(&file, &sample_inputs(), false).unwrap_err();
        assert_eq!(err, "2 validation error(s)");
    }

    #[test]
    fn test_ssg017_synth_plan_drift_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), STARTER_CONFIG);
        let out = dir.path().join("cdk.out");
        let inputs = sample_inputs();

        cmd_synth(&file, &out, None, &inputs).unwrap();
        assert!(out.join("SsgVpc.template.json").exists());
        assert!(out.join("manifest.yaml").exists());

        cmd_plan(&file, &out, &inputs).unwrap();
        let manifest = require_manifest(&out).unwrap();
        let order = resolver::build_execution_order(&load_app(&file, &inputs).unwrap()).unwrap();
        let app = load_app(&file, &inputs).unwrap();
        let plan = planner::plan(&app, &order, Some(&manifest)).unwrap();
        assert_eq!(plan.unchanged as usize, app.stacks.len());

        cmd_drift(&out, true).unwrap();
        std::fs::write(out.join("SsgZoneStack.template.json"), "{}").unwrap();
        let err = cmd_drift(&out, true).unwrap_err();
        assert_eq!(err, "1 drift finding(s)");
        cmd_drift(&out, false).unwrap();

        let drift_events = eventlog::read_events(&out)
            .unwrap()
            .into_iter()
            .filter(|e| matches!(e.event, types::SynthEvent::DriftDetected { .. }))
            .count();
        assert_eq!(drift_events, 2);
        cmd_status(&out).unwrap();
    }

    #[test]
    fn test_ssg017_synth_single_stack() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), STARTER_CONFIG);
        let out = dir.path().join("cdk.out");
        cmd_synth(&file, &out, Some("SsgBatch"), &sample_inputs()).unwrap();
        assert!(out.join("SsgBatch.template.json").exists());
        assert!(out.join("SsgVpc.template.json").exists());
        assert!(!out.join("SsgGithubStack.template.json").exists());
    }

    #[test]
    fn test_ssg017_drift_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_drift(dir.path(), false).unwrap_err();
        assert!(err.contains("run `ssg-infra synth` first"));
    }

    #[test]
    fn test_ssg017_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        cmd_status(dir.path()).unwrap();
    }

    #[test]
    fn test_ssg017_settings() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), STARTER_CONFIG);
        cmd_settings(&file, "prod").unwrap();
        let bad = write_config(dir.path(), "version: \"1.0\"\ncontext:\n  lambdaTimeout: soon\n");
        assert!(cmd_settings(&bad, "dev").is_err());
    }

    #[test]
    fn test_ssg017_schema() {
        cmd_schema().unwrap();
    }
}
