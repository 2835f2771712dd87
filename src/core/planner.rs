//! SSG-009: Plan generation: diff freshly rendered templates against the manifest.

use super::codegen::template_hash;
use super::types::*;

/// Generate a plan by comparing the app's rendered templates to a previous manifest.
pub fn plan(
    app: &App,
    execution_order: &[String],
    previous: Option<&Manifest>,
) -> Result<SynthPlan, String> {
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for name in execution_order {
        let stack = match app.stack(name) {
            Some(s) => s,
            None => continue,
        };
        let hash = template_hash(stack)?;
        let action = determine_action(name, &hash, previous);
        let description = describe_action(stack, &action);

        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::Destroy => to_destroy += 1,
            PlanAction::NoOp => unchanged += 1,
        }
        changes.push(PlannedChange {
            stack: name.clone(),
            action,
            description,
        });
    }

    // Stacks the previous synthesis wrote that the app no longer declares.
    if let Some(manifest) = previous {
        for name in manifest.order.iter().rev() {
            if app.stack(name).is_none() && manifest.stacks.contains_key(name) {
                to_destroy += 1;
                changes.push(PlannedChange {
                    stack: name.clone(),
                    action: PlanAction::Destroy,
                    description: format!("{}: no longer synthesized", name),
                });
            }
        }
    }

    tracing::debug!(to_create, to_update, to_destroy, unchanged, "plan computed");
    Ok(SynthPlan {
        app: app.name.clone(),
        changes,
        order: execution_order.to_vec(),
        to_create,
        to_update,
        to_destroy,
        unchanged,
    })
}

fn determine_action(name: &str, hash: &str, previous: Option<&Manifest>) -> PlanAction {
    match previous.and_then(|m| m.stacks.get(name)) {
        None => PlanAction::Create,
        Some(entry) if entry.hash == hash => PlanAction::NoOp,
        Some(_) => PlanAction::Update,
    }
}

fn describe_action(stack: &Stack, action: &PlanAction) -> String {
    match action {
        PlanAction::Create => format!(
            "{}: create ({} resources)",
            stack.name,
            stack.resource_count()
        ),
        PlanAction::Update => format!("{}: template changed", stack.name),
        PlanAction::Destroy => format!("{}: destroy", stack.name),
        PlanAction::NoOp => format!("{}: unchanged", stack.name),
    }
}
