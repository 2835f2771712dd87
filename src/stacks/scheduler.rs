//! SSG-039: CloudWatch scheduler stack (`CloudWatchSchedulerStack`).
//!
//! `ScheduleLambda` publishes job commands to `JobCommandTopic`. The topic
//! feeds `JobCommandQueue`, which the scheduler relay (declared in its own
//! stack) polls through its alias. A scheduler role may invoke the schedule
//! alias and submit jobs to both batch queues.

use super::batch::BatchHandle;
use super::registry::{RegistryHandle, Repo};
use super::StackContext;
use crate::constructs::iam::{self, PolicyStatement, RoleProps};
use crate::constructs::lambda::{self, BundleExports, BundleProps};
use crate::constructs::messaging::{self, EventSourceProps, MetricAlarm, QueueProps};
use crate::core::inputs::require;
use crate::core::intrinsic::reference;
use crate::core::types::{ExportRef, RemovalPolicy, Stack};

pub const SCHEDULE_LAMBDA_NAME: &str = "ScheduleLambda";
pub const JOB_COMMAND_TOPIC: &str = "JobCommandTopic";
pub const JOB_COMMAND_QUEUE: &str = "JobCommandQueue";
pub const DEV_QUEUE: &str = "DevSchedulingCommandQueue";
pub const SCHEDULER_ROLE_NAME: &str = "EventJobRuleRole";

const QUEUE_POLICY: &str = "JobCommandQueuePolicy";
const RELAY_CONSUME_POLICY: &str = "SchedulerRelayJobCommandQueuePolicy";

const DLQ_RETENTION_DAYS: u32 = 7;
const DEV_VISIBILITY_TIMEOUT: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerHandle {
    pub job_command_topic_arn: ExportRef,
    pub job_command_queue_url: ExportRef,
    pub scheduler_role_arn: ExportRef,
    pub schedule_lambda: BundleExports,
}

pub fn build(
    ctx: &StackContext<'_>,
    name: &str,
    registry: &RegistryHandle,
    batch: &BatchHandle,
    scheduler_relay: &BundleExports,
) -> Result<(Stack, SchedulerHandle), String> {
    require(name, "schedule Lambda version", &ctx.inputs.versions.eb_schedule)?;
    require(name, "relay Lambda version", &ctx.inputs.versions.relay)?;
    let schedule_repo = registry.get(Repo::EbSchedule)?;

    let mut stack = ctx.stack(name, "ScanSafeGuard job scheduling");
    let tunables = ctx.tunables;
    let repository = schedule_repo.import(&mut stack);

    // Logical id and name are fixed, so the ARN can be built before the
    // topic is declared.
    let topic_arn = reference(JOB_COMMAND_TOPIC);
    let props = BundleProps::new(SCHEDULE_LAMBDA_NAME, repository, &ctx.inputs.versions.eb_schedule)
        .env("TOPIC_ARN", topic_arn.clone())
        .statement(
            messaging::publish_statement(topic_arn)
                .sid(&format!("Allow{}ToPublish", SCHEDULE_LAMBDA_NAME)),
        );
    let schedule = lambda::lambda_bundle(&mut stack, tunables, props)?;

    let schedule_dlq = messaging::queue(
        &mut stack,
        "ScheduleDeadLetterQueue",
        QueueProps::named("ScheduleDeadLetterQueue", DLQ_RETENTION_DAYS)
            .removal_policy(RemovalPolicy::Destroy),
    )?;
    stack.export("ScheduleDeadLetterQueueArn", schedule_dlq.arn(), "ScheduleDeadLetterQueueArn")?;

    let topic = messaging::topic(&mut stack, JOB_COMMAND_TOPIC, JOB_COMMAND_TOPIC)?;
    let job_command_topic_arn = stack.export("JobCommandTopicArn", topic.arn(), "JobCommandTopicArn")?;

    let queue_dlq = messaging::queue(
        &mut stack,
        "JobCommandQueueDLQ",
        QueueProps::named("JobCommandQueueDLQ", DLQ_RETENTION_DAYS)
            .removal_policy(RemovalPolicy::Destroy),
    )?;
    let queue = messaging::queue(
        &mut stack,
        JOB_COMMAND_QUEUE,
        QueueProps::named(JOB_COMMAND_QUEUE, tunables.queue_retention_period)
            .visibility_timeout(tunables.visibility_timeout)
            .dead_letter(&queue_dlq, tunables.max_receive_count)
            .removal_policy(RemovalPolicy::Destroy),
    )?;
    let topic_dlq = messaging::queue(
        &mut stack,
        "JobCommandTopicDLQ",
        QueueProps::named("JobCommandTopicDLQ", DLQ_RETENTION_DAYS),
    )?;
    let dev = messaging::queue(
        &mut stack,
        DEV_QUEUE,
        QueueProps::named(DEV_QUEUE, tunables.queue_retention_period)
            .visibility_timeout(DEV_VISIBILITY_TIMEOUT)
            .removal_policy(RemovalPolicy::Destroy),
    )?;

    let age = MetricAlarm::new(&tunables.queue_alarm.namespace, "ApproximateAgeOfOldestMessage", "Maximum")
        .dimension("QueueName", queue.name())
        .tuned(&tunables.queue_alarm)
        .description("Alarm if the SQS queue message age exceeds the threshold.");
    messaging::metric_alarm(&mut stack, "QueueAgeAlarm", &age)?;

    messaging::queue_policy(&mut stack, QUEUE_POLICY, topic.arn(), &[&queue, &dev, &topic_dlq])?;
    messaging::subscribe_queue(&mut stack, "JobCommandQueueSubscription", topic.arn(), &queue, Some(&topic_dlq), QUEUE_POLICY)?;
    messaging::subscribe_queue(&mut stack, "DevSchedulingCommandQueueSubscription", topic.arn(), &dev, None, QUEUE_POLICY)?;

    // The relay lives in its own stack; wire it to this queue by import.
    messaging::check_visibility_timeout(&queue, tunables.lambda_timeout)?;
    let relay_alias = stack.import(&scheduler_relay.alias_arn);
    let relay_role = stack.import(&scheduler_relay.role_name);
    iam::attach_policy(
        &mut stack,
        RELAY_CONSUME_POLICY,
        &[relay_role],
        &[messaging::consume_statement(queue.arn()).sid("AllowSQSTrigger")],
    )?;
    messaging::sqs_event_source(
        &mut stack,
        "JobCommandQueueEventSource",
        queue.arn(),
        relay_alias,
        EventSourceProps::default().after(RELAY_CONSUME_POLICY),
    )?;

    let low = stack.import(&batch.low_priority_queue_arn);
    let high = stack.import(&batch.high_priority_queue_arn);
    let role = iam::role(
        &mut stack,
        "EventRuleRole",
        RoleProps {
            role_name: Some(SCHEDULER_ROLE_NAME.to_string()),
            trust: vec![iam::assumed_by(iam::service_principal("scheduler.amazonaws.com"))],
            statements: vec![
                PolicyStatement::allow()
                    .sid("AllowSchedulerToInvokeLambda")
                    .actions(&["lambda:InvokeFunction"])
                    .resource(schedule.alias_arn()),
                PolicyStatement::allow()
                    .sid("AllowSchedulerToSubmitJobs")
                    .actions(&["batch:SubmitJob"])
                    .resources([low, high]),
            ],
            ..Default::default()
        },
    )?;
    let scheduler_role_arn = stack.export("EventRuleRoleArn", role.arn(), "eventScheduleRuleArn")?;

    let job_command_queue_url = stack.export("JobCommandQueueUrl", queue.url(), "JobCommandQueueUrl")?;
    stack.export("JobCommandTopicDLQUrl", topic_dlq.url(), "JobCommandTopicDLQUrl")?;
    stack.export("DevQueueUrl", dev.url(), "DevQueueUrl")?;

    let schedule_lambda = schedule.exports(&stack.name);
    tracing::debug!(stack = %stack.name, "scheduler stack built");
    Ok((
        stack,
        SchedulerHandle {
            job_command_topic_arn,
            job_command_queue_url,
            scheduler_role_arn,
            schedule_lambda,
        },
    ))
}
