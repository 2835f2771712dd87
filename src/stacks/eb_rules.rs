//! SSG-040: EventBridge rule stacks.
//!
//! `SsgEbRulesLambdaStack` owns `EventBridgeRuleTopic` and the
//! `EventBridgeRuleHandler` Lambda that publishes to it. `SsgEbRulesStack`
//! fans the topic out to `EbRulesQueue` (relayed by `EBRelay`) and a
//! development queue, and routes batch job state changes and scheduler
//! events to the handler alias.

use super::registry::{RegistryHandle, Repo};
use super::StackContext;
use crate::constructs::lambda::{self, BundleExports, BundleProps};
use crate::constructs::messaging::{self, EventSourceProps, QueueProps};
use crate::core::inputs::require;
use crate::core::intrinsic::get_att;
use crate::core::types::{CfnResource, ExportRef, Stack};
use serde_json::{json, Value};

pub const RULE_TOPIC: &str = "EventBridgeRuleTopic";
pub const HANDLER_LAMBDA_NAME: &str = "EventBridgeRuleHandler";
pub const RELAY_LAMBDA_NAME: &str = "EBRelay";
pub const RULES_QUEUE: &str = "EbRulesQueue";

/// Rules routed to the handler: (logical id, source, detail type, description).
pub const RULES: &[(&str, &str, &str, &str)] = &[
    (
        "BatchJobStateChangeRule",
        "aws.batch",
        "AWS Batch Job State Change",
        "Trigger Lambda for batch job state changes",
    ),
    (
        "ScheduledBatchEventRule",
        "aws.scheduler",
        "Scheduled Event",
        "Trigger Lambda for scheduled batch jobs",
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct RulesLambdaHandle {
    pub topic_arn: ExportRef,
    pub handler: BundleExports,
}

/// `SsgEbRulesLambdaStack`
pub fn rules_lambda_stack(
    ctx: &StackContext<'_>,
    name: &str,
    registry: &RegistryHandle,
) -> Result<(Stack, RulesLambdaHandle), String> {
    require(name, "EventBridge rules Lambda version", &ctx.inputs.versions.eb_rules)?;
    let rules_repo = registry.get(Repo::EbRules)?;

    let mut stack = ctx.stack(name, "ScanSafeGuard EventBridge rule handler");
    let repository = rules_repo.import(&mut stack);
    let topic = messaging::topic(&mut stack, RULE_TOPIC, RULE_TOPIC)?;

    let props = BundleProps::new(HANDLER_LAMBDA_NAME, repository, &ctx.inputs.versions.eb_rules)
        .env("TOPIC_ARN", topic.arn())
        .statement(
            messaging::publish_statement(topic.arn())
                .sid(&format!("Allow{}ToSendToTopic", HANDLER_LAMBDA_NAME)),
        );
    let bundle = lambda::lambda_bundle(&mut stack, ctx.tunables, props)?;
    lambda::health_alarms(&mut stack, ctx.tunables, &bundle)?;

    let topic_arn = stack.export("EventBridgeRuleTopicArn", topic.arn(), "EventBridgeRuleTopicArn")?;
    let handler = bundle.exports(&stack.name);
    Ok((stack, RulesLambdaHandle { topic_arn, handler }))
}

fn rule(
    stack: &mut Stack,
    logical_id: &str,
    source: &str,
    detail_type: &str,
    description: &str,
    target: Value,
) -> Result<(), String> {
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::Events::Rule",
            json!({
                "Description": description,
                "State": "ENABLED",
                "EventPattern": {
                    "source": [source],
                    "detail-type": [detail_type],
                },
                "Targets": [{ "Arn": target, "Id": "Target0" }],
            }),
        ),
    )
}

/// `SsgEbRulesStack`
pub fn rules_stack(
    ctx: &StackContext<'_>,
    name: &str,
    registry: &RegistryHandle,
    rules_lambda: &RulesLambdaHandle,
) -> Result<Stack, String> {
    require(name, "relay Lambda version", &ctx.inputs.versions.relay)?;
    require(name, "scheduler destination URL", &ctx.inputs.scheduler_destination_url)?;
    let relay_repo = registry.get(Repo::Relay)?;
    let tunables = ctx.tunables;

    let mut stack = ctx.stack(name, "ScanSafeGuard EventBridge rules and relay");
    let topic_arn = stack.import(&rules_lambda.topic_arn);
    let handler_alias = stack.import(&rules_lambda.handler.alias_arn);
    let repository = relay_repo.import(&mut stack);

    let dlq = messaging::queue(
        &mut stack,
        &format!("{}DLQ", RULES_QUEUE),
        QueueProps::named(&format!("{}DLQ", RULES_QUEUE), tunables.queue_retention_period)
            .visibility_timeout(tunables.dead_letter_queue_visibility_timeout)
            .removal_policy(tunables.removal_policy),
    )?;
    let queue = messaging::queue(
        &mut stack,
        RULES_QUEUE,
        QueueProps::named(RULES_QUEUE, tunables.queue_retention_period)
            .visibility_timeout(tunables.visibility_timeout)
            .dead_letter(&dlq, tunables.dead_letter_queue_max_receive_count)
            .removal_policy(tunables.removal_policy),
    )?;
    let dev = messaging::queue(
        &mut stack,
        &format!("{}DevQueue", RULES_QUEUE),
        QueueProps::named(&format!("{}DevQueue", RULES_QUEUE), tunables.queue_retention_period)
            .visibility_timeout(tunables.visibility_timeout)
            .removal_policy(tunables.removal_policy),
    )?;

    let queue_policy = format!("{}Policy", RULES_QUEUE);
    messaging::queue_policy(&mut stack, &queue_policy, topic_arn.clone(), &[&queue, &dev])?;
    messaging::subscribe_queue(&mut stack, "EbRulesQueueSubscription", topic_arn.clone(), &queue, None, &queue_policy)?;
    messaging::subscribe_queue(&mut stack, "EbRulesQueueDevQueueSubscription", topic_arn, &dev, None, &queue_policy)?;

    stack.export("EbRulesQueueQueueUrl", queue.url(), "EbRulesQueueQueueUrl")?;
    stack.export("EbRulesQueueDevQueueUrl", dev.url(), "EbRulesQueueDevQueueUrl")?;
    stack.export("EbRulesQueueDLQUrl", dlq.url(), "EbRulesQueueDLQUrl")?;

    let props = BundleProps::new(RELAY_LAMBDA_NAME, repository, &ctx.inputs.versions.relay)
        .env("DESTINATION_URL", json!(ctx.inputs.scheduler_destination_url))
        .statement(
            messaging::consume_statement(queue.arn())
                .sid(&format!("Allow{}ToConsume{}", RELAY_LAMBDA_NAME, RULES_QUEUE)),
        );
    let relay = lambda::lambda_bundle(&mut stack, tunables, props)?;
    messaging::check_visibility_timeout(&queue, tunables.lambda_timeout)?;
    let mut source = EventSourceProps::default();
    if let Some(policy) = &relay.role.default_policy {
        source = source.after(policy);
    }
    messaging::sqs_event_source(&mut stack, "RelayLambdaEventSource", queue.arn(), relay.alias_arn(), source)?;

    for (id, source, detail_type, description) in RULES {
        rule(&mut stack, id, source, detail_type, description, handler_alias.clone())?;
        lambda::invoke_permission(
            &mut stack,
            &format!("{}Invoke", id),
            handler_alias.clone(),
            "events.amazonaws.com",
            Some(get_att(id, "Arn")),
        )?;
    }

    tracing::debug!(stack = %stack.name, rules = RULES.len(), "eventbridge rules declared");
    Ok(stack)
}
