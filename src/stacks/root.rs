//! SSG-043: Root composition (`SSG-Stack`).
//!
//! Builds every platform stack in dependency order, threading handles from
//! producers to consumers, then declares the explicit ordering edges that
//! imports alone do not imply. A stage prefixes every stack name.

use super::relay::{self, RelayProps};
use super::{
    api, batch, eb_rules, github, network, parameters, registry, scheduler, secrets, stripe, zone,
    StackContext,
};
use crate::core::inputs::DeploymentInputs;
use crate::core::settings::Settings;
use crate::core::types::{App, Stack, SynthConfig};

pub const VPC: &str = "SsgVpc";
pub const ECR: &str = "SsgEcrStack";
pub const ZONE: &str = "SsgZoneStack";
pub const SECRETS: &str = "SsgSecretsStack";
pub const PARAMETERS: &str = "SsgParametersStack";
pub const BATCH: &str = "SsgBatch";
pub const STRIPE_TOPIC: &str = "SsgStripeTopicStack";
pub const STRIPE_QUEUE: &str = "SsgStripeQueueStack";
pub const STRIPE_HOOK: &str = "SsgStripeLambdaStack";
pub const STRIPE_RELAY: &str = "SsgRelayLambdaStack";
pub const GATEWAY: &str = "SsgLambdaGateway";
pub const SCHEDULER_RELAY: &str = "SchedulerRelayLambdaStack";
pub const SCHEDULER: &str = "CloudWatchSchedulerStack";
pub const EB_RULES_LAMBDA: &str = "SsgEbRulesLambdaStack";
pub const EB_RULES: &str = "SsgEbRulesStack";
pub const AUTHORIZER: &str = "SsgApiAuthorizer";
pub const APP_API: &str = "SsgAppApi";
pub const GITHUB: &str = "SsgGithubStack";

/// Ordering edges declared on top of import-derived ones: (consumer, producer).
pub const EXPLICIT_EDGES: &[(&str, &str)] = &[
    (BATCH, VPC),
    (BATCH, ECR),
    (PARAMETERS, SECRETS),
    (SCHEDULER, ECR),
    (SCHEDULER, BATCH),
    (EB_RULES, ECR),
    (APP_API, ECR),
];

fn add(app: &mut App, stack: Stack) -> Result<(), String> {
    let _span = tracing::debug_span!("add_stack", stack = %stack.name).entered();
    app.add_stack(stack)
}

/// Resolve settings and build the whole stack graph.
pub fn build_app(config: &SynthConfig, inputs: &DeploymentInputs) -> Result<App, String> {
    let tunables = Settings::new(&inputs.environment, &config.context).resolve()?;
    let ctx = StackContext::new(&tunables, inputs);
    let mut app = App::new(&config.app, config.stage.as_deref(), &inputs.environment);
    let n = |id: &str| app.stack_name(id);

    let (stack, net) = network::build(&ctx, &n(VPC))?;
    let mut stacks = vec![stack];
    let (stack, reg) = registry::build(&ctx, &n(ECR))?;
    stacks.push(stack);
    let (stack, _zone) = zone::build(&ctx, &n(ZONE))?;
    stacks.push(stack);
    let (stack, sec) = secrets::build(&ctx, &n(SECRETS))?;
    stacks.push(stack);
    let (stack, params) = parameters::build(&ctx, &n(PARAMETERS), &sec)?;
    stacks.push(stack);
    let (stack, batch_handle) = batch::build(&ctx, &n(BATCH), &net, &reg)?;
    stacks.push(stack);

    let (stack, topic) = stripe::topic_stack(&ctx, &n(STRIPE_TOPIC))?;
    stacks.push(stack);
    let (stack, queue) = stripe::queue_stack(&ctx, &n(STRIPE_QUEUE), &topic)?;
    stacks.push(stack);
    let (stack, hook) = stripe::hook_stack(&ctx, &n(STRIPE_HOOK), &reg, &topic, &sec, &params)?;
    stacks.push(stack);
    let (stack, stripe_relay) = relay::build(
        &ctx,
        &n(STRIPE_RELAY),
        &reg,
        RelayProps {
            lambda_name: "StripeRelay",
            destination_url: &inputs.stripe_destination_url,
            source_queue: Some(&queue.queue_arn),
        },
    )?;
    stacks.push(stack);
    let (stack, _gateway) = stripe::gateway_stack(&ctx, &n(GATEWAY), &hook, &stripe_relay)?;
    stacks.push(stack);

    let (stack, scheduler_relay) = relay::build(
        &ctx,
        &n(SCHEDULER_RELAY),
        &reg,
        RelayProps {
            lambda_name: "SchedulerRelay",
            destination_url: &inputs.scheduler_destination_url,
            source_queue: None,
        },
    )?;
    stacks.push(stack);
    let (stack, _scheduler) =
        scheduler::build(&ctx, &n(SCHEDULER), &reg, &batch_handle, &scheduler_relay)?;
    stacks.push(stack);

    let (stack, rules_lambda) = eb_rules::rules_lambda_stack(&ctx, &n(EB_RULES_LAMBDA), &reg)?;
    stacks.push(stack);
    stacks.push(eb_rules::rules_stack(&ctx, &n(EB_RULES), &reg, &rules_lambda)?);

    let (stack, authorizer) = api::authorizer_stack(&ctx, &n(AUTHORIZER), &reg)?;
    stacks.push(stack);
    let (stack, _api_url) = api::app_api_stack(&ctx, &n(APP_API), &reg, &authorizer)?;
    stacks.push(stack);

    let (stack, _role) = github::build(&ctx, &n(GITHUB))?;
    stacks.push(stack);

    for stack in stacks {
        add(&mut app, stack)?;
    }
    for (consumer, producer) in EXPLICIT_EDGES {
        let consumer = app.stack_name(consumer);
        let producer = app.stack_name(producer);
        app.add_dependency(&consumer, &producer)?;
    }

    tracing::info!(
        app = %app.name,
        stacks = app.stacks.len(),
        resources = app.resource_count(),
        "app composed"
    );
    Ok(app)
}
