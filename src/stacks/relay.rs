//! SSG-037: Relay Lambda stacks (`SsgRelayLambdaStack`, `SchedulerRelayLambdaStack`).
//!
//! A relay forwards whatever it receives to `DESTINATION_URL`. When given a
//! source queue it polls that queue through its alias.

use super::registry::{RegistryHandle, Repo};
use super::StackContext;
use crate::constructs::lambda::{self, BundleExports, BundleProps};
use crate::constructs::messaging::{self, EventSourceProps};
use crate::core::inputs::require;
use crate::core::types::{ExportRef, Stack};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct RelayProps<'a> {
    pub lambda_name: &'a str,
    pub destination_url: &'a str,

    /// Queue ARN export to poll, if any
    pub source_queue: Option<&'a ExportRef>,
}

pub fn build(
    ctx: &StackContext<'_>,
    name: &str,
    registry: &RegistryHandle,
    props: RelayProps<'_>,
) -> Result<(Stack, BundleExports), String> {
    require(name, "relay Lambda version", &ctx.inputs.versions.relay)?;
    require(name, "destination URL", props.destination_url)?;
    let relay_repo = registry.get(Repo::Relay)?;

    let mut stack = ctx.stack(name, &format!("ScanSafeGuard {} relay Lambda", props.lambda_name));
    let repository = relay_repo.import(&mut stack);
    let queue_arn = props.source_queue.map(|q| stack.import(q));

    let mut bundle_props = BundleProps::new(props.lambda_name, repository, &ctx.inputs.versions.relay)
        .env("DESTINATION_URL", json!(props.destination_url));
    if let Some(arn) = &queue_arn {
        bundle_props = bundle_props.statement(
            messaging::consume_statement(arn.clone())
                .sid(&format!("Allow{}ToConsumeSourceQueue", props.lambda_name)),
        );
    }
    let bundle = lambda::lambda_bundle(&mut stack, ctx.tunables, bundle_props)?;
    lambda::health_alarms(&mut stack, ctx.tunables, &bundle)?;

    if let Some(arn) = queue_arn {
        lambda::invoke_permission(
            &mut stack,
            &format!("{}AllowSourceQueueToInvokeAlias", props.lambda_name),
            bundle.alias_arn(),
            "sqs.amazonaws.com",
            Some(arn.clone()),
        )?;
        let mut source = EventSourceProps::default();
        if let Some(policy) = &bundle.role.default_policy {
            source = source.after(policy);
        }
        messaging::sqs_event_source(
            &mut stack,
            &format!("{}SourceQueueEventSource", props.lambda_name),
            arn,
            bundle.alias_arn(),
            source,
        )?;
    }

    let exports = bundle.exports(&stack.name);
    Ok((stack, exports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures::fixture;
    use crate::stacks::registry;

    #[test]
    fn test_ssg037_relay_without_queue() {
        let f = fixture();
        let (_, reg) = registry::build(&f.ctx(), "SsgEcrStack").unwrap();
        let (stack, exports) = build(
            &f.ctx(),
            "SchedulerRelayLambdaStack",
            &reg,
            RelayProps {
                lambda_name: "SchedulerRelay",
                destination_url: &f.inputs.scheduler_destination_url,
                source_queue: None,
            },
        )
        .unwrap();
        assert_eq!(exports.name, "SchedulerRelay");
        assert_eq!(exports.alias_arn.stack, "SchedulerRelayLambdaStack");
        assert_eq!(stack.resources_of_type("AWS::Lambda::EventSourceMapping").count(), 0);
        let f_res = stack.resource("SchedulerRelay").unwrap();
        assert_eq!(
            f_res.properties["Environment"]["Variables"]["DESTINATION_URL"],
            f.inputs.scheduler_destination_url
        );
        assert_eq!(stack.dependencies, vec!["SsgEcrStack"]);
    }

    #[test]
    fn test_ssg037_relay_polls_source_queue() {
        let f = fixture();
        let (_, reg) = registry::build(&f.ctx(), "SsgEcrStack").unwrap();
        let queue = ExportRef {
            stack: "SsgStripeQueueStack".into(),
            name: "StripeQueueArn".into(),
        };
        let (stack, _) = build(
            &f.ctx(),
            "SsgRelayLambdaStack",
            &reg,
            RelayProps {
                lambda_name: "StripeRelay",
                destination_url: &f.inputs.stripe_destination_url,
                source_queue: Some(&queue),
            },
        )
        .unwrap();
        let esm = stack.resource("StripeRelaySourceQueueEventSource").unwrap();
        assert_eq!(esm.properties["EventSourceArn"], json!({"Fn::ImportValue": "StripeQueueArn"}));
        assert_eq!(esm.properties["FunctionName"], json!({"Ref": "StripeRelayPREPROD"}));
        assert_eq!(esm.properties["BatchSize"], 1);
        assert_eq!(esm.properties["ScalingConfig"]["MaximumConcurrency"], 10);
        assert_eq!(esm.depends_on, vec!["StripeRelayLambdaExecutionRoleDefaultPolicy"]);
        assert!(stack.dependencies.contains(&"SsgStripeQueueStack".to_string()));
        assert!(stack.resource("StripeRelayAllowSourceQueueToInvokeAlias").is_some());
    }

    #[test]
    fn test_ssg037_empty_destination_rejected_before_resources() {
        let f = fixture();
        let (_, reg) = registry::build(&f.ctx(), "SsgEcrStack").unwrap();
        let err = build(
            &f.ctx(),
            "SchedulerRelayLambdaStack",
            &reg,
            RelayProps {
                lambda_name: "SchedulerRelay",
                destination_url: "",
                source_queue: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, "SchedulerRelayLambdaStack: destination URL is required");
    }
}
