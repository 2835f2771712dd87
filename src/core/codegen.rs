//! SSG-007: Render stack templates and write them with a manifest.
//!
//! Each stack renders to one pretty-printed CloudFormation JSON document,
//! written as `<out>/<Stack>.template.json`. The manifest records the
//! deployment order and the BLAKE3 hash of every rendered template, which
//! is what `plan` and `drift` compare against later.

use super::resolver::{build_execution_order, transitive_dependencies};
use super::state;
use super::types::{App, Manifest, Stack, SynthEvent};
use crate::tripwire::{eventlog, hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of a synthesis run.
#[derive(Debug, Clone)]
pub struct SynthResult {
    pub run_id: String,
    pub manifest: Manifest,

    /// Template files written by this run, in deployment order
    pub written: Vec<PathBuf>,

    pub total_seconds: f64,
}

/// Render a stack's template as pretty JSON with a trailing newline.
pub fn render_template(stack: &Stack) -> Result<String, String> {
    let mut json = serde_json::to_string_pretty(&stack.template)
        .map_err(|e| format!("cannot render {}: {}", stack.name, e))?;
    json.push('\n');
    Ok(json)
}

/// Hash of a stack's rendered template, as recorded in the manifest.
pub fn template_hash(stack: &Stack) -> Result<String, String> {
    Ok(hasher::hash_string(&render_template(stack)?))
}

/// Stacks a run covers: everything, or one stack plus what it depends on.
pub fn selected_stacks(app: &App, order: &[String], only: Option<&str>) -> Result<Vec<String>, String> {
    match only {
        None => Ok(order.to_vec()),
        Some(name) => {
            let mut selected = transitive_dependencies(app, name)?;
            selected.push(name.to_string());
            Ok(selected)
        }
    }
}

/// Synthesize an app into `out_dir`.
///
/// With `only`, just that stack and its dependencies are rewritten; manifest
/// entries of other stacks that still exist are carried over from the
/// previous manifest.
pub fn synth(app: &App, out_dir: &Path, only: Option<&str>) -> Result<SynthResult, String> {
    let start = Instant::now();
    let order = build_execution_order(app)?;
    let selected = selected_stacks(app, &order, only)?;
    let previous = match only {
        Some(_) => state::load_manifest(out_dir)?,
        None => None,
    };

    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("cannot create dir {}: {}", out_dir.display(), e))?;

    let run_id = eventlog::generate_run_id();
    let _span = tracing::info_span!("synth", app = %app.name, run_id = %run_id).entered();
    eventlog::append_event(
        out_dir,
        SynthEvent::SynthStarted {
            app: app.name.clone(),
            run_id: run_id.clone(),
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )?;

    let mut manifest = state::new_manifest(app, &order);
    let mut written = Vec::with_capacity(selected.len());
    let mut resources = 0usize;

    for name in &order {
        if !selected.contains(name) {
            if let Some(entry) = previous.as_ref().and_then(|m| m.stacks.get(name)) {
                manifest.stacks.insert(name.clone(), entry.clone());
            }
            continue;
        }
        let stack = app
            .stack(name)
            .ok_or_else(|| format!("unknown stack '{}'", name))?;
        let body = render_template(stack)?;
        let hash = hasher::hash_string(&body);
        let path = out_dir.join(state::template_file_name(name));
        state::write_atomic(&path, &body)?;
        tracing::debug!(stack = %name, path = %path.display(), "template written");

        eventlog::append_event(
            out_dir,
            SynthEvent::StackSynthesized {
                stack: name.clone(),
                resources: stack.resource_count(),
                hash: hash.clone(),
            },
        )?;
        resources += stack.resource_count();
        manifest
            .stacks
            .insert(name.clone(), state::stack_entry(app, name, &hash)?);
        written.push(path);
    }

    state::save_manifest(out_dir, &manifest)?;

    let total_seconds = start.elapsed().as_secs_f64();
    eventlog::append_event(
        out_dir,
        SynthEvent::SynthCompleted {
            app: app.name.clone(),
            run_id: run_id.clone(),
            stacks: written.len() as u32,
            resources: resources as u32,
            total_seconds,
        },
    )?;
    tracing::info!(stacks = written.len(), resources, total_seconds, "synthesis complete");

    Ok(SynthResult {
        run_id,
        manifest,
        written,
        total_seconds,
    })
}
