//! SSG-038: Stripe webhook pipeline.
//!
//! `StripeHook` receives webhooks through the gateway and publishes them to
//! `StripeTopic`. The topic fans out to `StripeQueue` (with a dead-letter
//! queue and a subscription-level dead-letter queue) and a parallel
//! development queue. `StripeRelay` polls `StripeQueue`.

use super::parameters::{parameter_arn, ParametersHandle};
use super::registry::{RegistryHandle, Repo};
use super::secrets::SecretsHandle;
use super::StackContext;
use crate::constructs::http_api::{self, HttpMethod, RouteSpec};
use crate::constructs::lambda::{self, BundleExports, BundleProps};
use crate::constructs::messaging::{self, Comparison, MetricAlarm, QueueProps};
use crate::constructs::iam::PolicyStatement;
use crate::core::inputs::require;
use crate::core::types::{ExportRef, Stack};
use serde_json::json;

pub const STRIPE_TOPIC_NAME: &str = "StripeTopic";
pub const STRIPE_QUEUE_NAME: &str = "StripeQueue";
pub const HOOK_LAMBDA_NAME: &str = "StripeHook";

/// Days the Stripe queues and their dead-letter queues keep messages.
const QUEUE_RETENTION_DAYS: u32 = 1;
const DLQ_RETENTION_DAYS: u32 = 7;
const QUEUE_VISIBILITY_TIMEOUT: u32 = 30;
const QUEUE_POLICY: &str = "StripeQueuePolicy";

/// Milliseconds before a hook invocation counts as slow.
const HOOK_SLOW_MILLIS: f64 = 5000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct StripeTopicHandle {
    pub topic_name: String,
    pub topic_arn: ExportRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StripeQueueHandle {
    pub queue_arn: ExportRef,
    pub queue_url: ExportRef,
}

/// `SsgStripeTopicStack`: the topic and its delivery alarms.
pub fn topic_stack(ctx: &StackContext<'_>, name: &str) -> Result<(Stack, StripeTopicHandle), String> {
    let mut stack = ctx.stack(name, "ScanSafeGuard Stripe event topic");
    let topic = messaging::topic(&mut stack, STRIPE_TOPIC_NAME, STRIPE_TOPIC_NAME)?;
    messaging::topic_alarms(&mut stack, &topic)?;
    let export_name = format!("{}TopicArn", STRIPE_TOPIC_NAME);
    let topic_arn = stack.export(&export_name, topic.arn(), &export_name)?;
    Ok((
        stack,
        StripeTopicHandle {
            topic_name: topic.topic_name,
            topic_arn,
        },
    ))
}

/// `SsgStripeQueueStack`: the relay queue, its dead-letter queues and the
/// development queue, all subscribed to the topic.
pub fn queue_stack(
    ctx: &StackContext<'_>,
    name: &str,
    topic: &StripeTopicHandle,
) -> Result<(Stack, StripeQueueHandle), String> {
    require(name, "source topic", &topic.topic_arn.name)?;
    let mut stack = ctx.stack(name, "ScanSafeGuard Stripe event queues");
    let topic_arn = stack.import(&topic.topic_arn);
    let removal = ctx.tunables.removal_policy;

    let queue_dlq = messaging::queue(
        &mut stack,
        &format!("{}QueueDLQ", STRIPE_QUEUE_NAME),
        QueueProps::named(&format!("DLQ-For-{}-Queue", STRIPE_QUEUE_NAME), DLQ_RETENTION_DAYS)
            .removal_policy(removal),
    )?;
    let topic_dlq = messaging::queue(
        &mut stack,
        &format!("{}TopicDLQ", STRIPE_QUEUE_NAME),
        QueueProps::named(&format!("DLQ-For-{}-Topic", STRIPE_QUEUE_NAME), DLQ_RETENTION_DAYS)
            .removal_policy(removal),
    )?;
    let dev = messaging::queue(
        &mut stack,
        &format!("{}ForDev", STRIPE_QUEUE_NAME),
        QueueProps::named(&format!("{}-For-Dev", STRIPE_QUEUE_NAME), QUEUE_RETENTION_DAYS)
            .visibility_timeout(QUEUE_VISIBILITY_TIMEOUT)
            .removal_policy(removal),
    )?;
    // The relay polling this queue runs with the shared Lambda timeout.
    let relay_visibility = QUEUE_VISIBILITY_TIMEOUT.max(ctx.tunables.lambda_timeout);
    let queue = messaging::queue(
        &mut stack,
        STRIPE_QUEUE_NAME,
        QueueProps::named(STRIPE_QUEUE_NAME, QUEUE_RETENTION_DAYS)
            .visibility_timeout(relay_visibility)
            .dead_letter(&queue_dlq, ctx.tunables.max_receive_count)
            .removal_policy(removal),
    )?;

    messaging::queue_policy(&mut stack, QUEUE_POLICY, topic_arn.clone(), &[&queue, &dev, &topic_dlq])?;
    messaging::subscribe_queue(
        &mut stack,
        &format!("{}ForDevSubscription", STRIPE_QUEUE_NAME),
        topic_arn.clone(),
        &dev,
        None,
        QUEUE_POLICY,
    )?;
    messaging::subscribe_queue(
        &mut stack,
        &format!("{}Subscription", STRIPE_QUEUE_NAME),
        topic_arn,
        &queue,
        Some(&topic_dlq),
        QUEUE_POLICY,
    )?;
    messaging::queue_alarms(&mut stack, &queue)?;

    let queue_arn = stack.export("QueueArn", queue.arn(), "StripeQueueArn")?;
    let queue_url = stack.export("QueueURL", queue.url(), "StripeQueueUrl")?;
    Ok((stack, StripeQueueHandle { queue_arn, queue_url }))
}

/// `SsgStripeLambdaStack`: the webhook receiver.
pub fn hook_stack(
    ctx: &StackContext<'_>,
    name: &str,
    registry: &RegistryHandle,
    topic: &StripeTopicHandle,
    secrets: &SecretsHandle,
    parameters: &ParametersHandle,
) -> Result<(Stack, BundleExports), String> {
    require(name, "Stripe hook Lambda version", &ctx.inputs.versions.stripe_hook)?;
    let hook_repo = registry.get(Repo::StripeHook)?;

    let mut stack = ctx.stack(name, "ScanSafeGuard Stripe webhook Lambda");
    let repository = hook_repo.import(&mut stack);
    let topic_arn = stack.import(&topic.topic_arn);
    let secret_arn = stack.import(&secrets.secret_arn);
    let topic_param_path = stack.import(&parameters.stripe_topic_arn);

    let props = BundleProps::new(HOOK_LAMBDA_NAME, repository, &ctx.inputs.versions.stripe_hook)
        .env("TOPIC_ARN", topic_arn.clone())
        .statement(
            messaging::publish_statement(topic_arn)
                .sid(&format!("Allow{}ToPublish", HOOK_LAMBDA_NAME)),
        )
        .statement(
            PolicyStatement::allow()
                .sid(&format!("Allow{}ToAccessParameters", HOOK_LAMBDA_NAME))
                .actions(&["ssm:GetParameter"])
                .resource(parameter_arn(topic_param_path)),
        )
        .statement(
            PolicyStatement::allow()
                .sid(&format!("Allow{}ToSecrets", HOOK_LAMBDA_NAME))
                .actions(&["secretsmanager:GetSecretValue"])
                .resource(secret_arn),
        );
    let bundle = lambda::lambda_bundle(&mut stack, ctx.tunables, props)?;

    lambda::duration_alarm(&mut stack, &bundle, &ctx.tunables.lambda_alarm.namespace, HOOK_SLOW_MILLIS)?;
    lambda::dead_letter_alarm(&mut stack, &bundle, 5.0)?;
    for (id, metric, threshold, description) in [
        (
            "StripeHookTopicPublishedAlarm",
            "NumberOfMessagesPublished",
            100.0,
            "Alarm if too many messages are published to the topic.",
        ),
        (
            "StripeHookTopicFailedAlarm",
            "NumberOfNotificationsFailed",
            10.0,
            "Alarm if notifications fail.",
        ),
    ] {
        let alarm = MetricAlarm::new("AWS/SNS", metric, "Sum")
            .dimension("TopicName", json!(topic.topic_name))
            .threshold(threshold, 1)
            .comparison(Comparison::GreaterThanOrEqual)
            .description(description);
        messaging::metric_alarm(&mut stack, id, &alarm)?;
    }

    let exports = bundle.exports(&stack.name);
    Ok((stack, exports))
}

/// `SsgLambdaGateway`: open HTTP routes for the hook and the relay.
pub fn gateway_stack(
    ctx: &StackContext<'_>,
    name: &str,
    hook: &BundleExports,
    relay: &BundleExports,
) -> Result<(Stack, String), String> {
    let mut stack = ctx.stack(name, "ScanSafeGuard webhook gateway");
    let api = http_api::http_api(&mut stack, "LambdaGatewayHttpApi", "LambdaGateway", None)?;

    for (integration_id, path, target) in [
        ("StripeHookIntegration", "/api/stripe-hook", hook),
        ("RelayIntegration", "/api/relay", relay),
    ] {
        let function_arn = stack.import(&target.function_arn);
        let integration = http_api::lambda_integration(&mut stack, &api, integration_id, function_arn)?;
        http_api::add_routes(
            &mut stack,
            &api,
            &[RouteSpec::new(path, &[HttpMethod::Any])],
            &integration,
            None,
        )?;
        let export_name = format!("{}ApiUrl", integration_id);
        stack.export(&export_name, api.endpoint(), &export_name)?;
    }
    Ok((stack, api.name))
}
