//! SSG-021: Queues, topics, subscriptions, event sources, and metric alarms.
//!
//! Fan-out wiring is always topic → queue subscription plus a queue policy
//! admitting only the SNS service acting for that topic in this account.
//! Every redrive to a dead-letter queue must carry a positive receive count.

use super::iam::{self, PolicyStatement};
use crate::core::intrinsic::{account_id, get_att, reference};
use crate::core::settings::AlarmSettings;
use crate::core::types::{CfnResource, RemovalPolicy, Stack};
use serde_json::{json, Map, Value};

/// Messages per event-source invocation.
pub const BATCH_SIZE: u32 = 1;
/// Concurrent pollers for an event source.
pub const MAX_CONCURRENCY: u32 = 10;
/// Seconds to gather a batch.
pub const MAX_BATCHING_WINDOW: u32 = 10;

/// SQS visibility timeout when a queue sets none.
pub const DEFAULT_VISIBILITY_TIMEOUT: u32 = 30;

const SECONDS_PER_DAY: u32 = 86_400;
const MAX_RETENTION_DAYS: u32 = 14;

// ============================================================================
// Queues
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct QueueHandle {
    pub logical_id: String,
    pub queue_name: String,
    pub visibility_timeout: Option<u32>,
}

impl QueueHandle {
    pub fn arn(&self) -> Value {
        get_att(&self.logical_id, "Arn")
    }

    pub fn url(&self) -> Value {
        reference(&self.logical_id)
    }

    pub fn name(&self) -> Value {
        get_att(&self.logical_id, "QueueName")
    }
}

/// Redrive target for a queue.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub target_arn: Value,
    pub max_receive_count: u32,
}

#[derive(Debug, Clone)]
pub struct QueueProps {
    pub queue_name: String,
    pub retention_days: u32,
    pub visibility_timeout: Option<u32>,
    pub dead_letter: Option<DeadLetter>,
    pub removal_policy: Option<RemovalPolicy>,
}

impl QueueProps {
    pub fn named(queue_name: &str, retention_days: u32) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            retention_days,
            visibility_timeout: None,
            dead_letter: None,
            removal_policy: None,
        }
    }

    pub fn visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    pub fn dead_letter(mut self, target: &QueueHandle, max_receive_count: u32) -> Self {
        self.dead_letter = Some(DeadLetter {
            target_arn: target.arn(),
            max_receive_count,
        });
        self
    }

    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }
}

pub fn queue(stack: &mut Stack, logical_id: &str, props: QueueProps) -> Result<QueueHandle, String> {
    if props.retention_days == 0 || props.retention_days > MAX_RETENTION_DAYS {
        return Err(format!(
            "queue '{}': retention must be 1..={} days, got {}",
            props.queue_name, MAX_RETENTION_DAYS, props.retention_days
        ));
    }
    let mut properties = Map::new();
    properties.insert("QueueName".into(), json!(props.queue_name));
    properties.insert(
        "MessageRetentionPeriod".into(),
        json!(props.retention_days * SECONDS_PER_DAY),
    );
    if let Some(secs) = props.visibility_timeout {
        properties.insert("VisibilityTimeout".into(), json!(secs));
    }
    if let Some(dl) = &props.dead_letter {
        if dl.max_receive_count == 0 {
            return Err(format!(
                "queue '{}': maxReceiveCount must be greater than 0",
                props.queue_name
            ));
        }
        properties.insert(
            "RedrivePolicy".into(),
            json!({
                "deadLetterTargetArn": dl.target_arn,
                "maxReceiveCount": dl.max_receive_count,
            }),
        );
    }

    let mut resource = CfnResource::new("AWS::SQS::Queue", Value::Object(properties));
    if let Some(policy) = props.removal_policy {
        resource = resource.with_removal_policy(policy);
    }
    stack.add_resource(logical_id, resource)?;
    Ok(QueueHandle {
        logical_id: logical_id.to_string(),
        queue_name: props.queue_name,
        visibility_timeout: props.visibility_timeout,
    })
}

/// Actions a consumer needs on a queue.
pub fn consume_statement(queue_arn: Value) -> PolicyStatement {
    PolicyStatement::allow()
        .actions(&[
            "sqs:ReceiveMessage",
            "sqs:ChangeMessageVisibility",
            "sqs:GetQueueUrl",
            "sqs:DeleteMessage",
            "sqs:GetQueueAttributes",
        ])
        .resource(queue_arn)
}

pub fn send_statement(queue_arn: Value) -> PolicyStatement {
    PolicyStatement::allow()
        .actions(&["sqs:SendMessage"])
        .resource(queue_arn)
}

// ============================================================================
// Topics
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TopicHandle {
    pub logical_id: String,
    pub topic_name: String,
}

impl TopicHandle {
    pub fn arn(&self) -> Value {
        reference(&self.logical_id)
    }
}

pub fn topic(stack: &mut Stack, logical_id: &str, topic_name: &str) -> Result<TopicHandle, String> {
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::SNS::Topic",
            json!({
                "TopicName": topic_name,
                "DisplayName": format!("{} SNS Topic", topic_name),
            }),
        ),
    )?;
    Ok(TopicHandle {
        logical_id: logical_id.to_string(),
        topic_name: topic_name.to_string(),
    })
}

pub fn publish_statement(topic_arn: Value) -> PolicyStatement {
    PolicyStatement::allow()
        .actions(&["sns:Publish"])
        .resource(topic_arn)
}

/// Subscribe a queue to a topic, optionally with a subscription-level DLQ.
/// The subscription waits for `queue_policy`, the policy that lets the topic
/// deliver into the queue.
pub fn subscribe_queue(
    stack: &mut Stack,
    logical_id: &str,
    topic_arn: Value,
    queue: &QueueHandle,
    dead_letter: Option<&QueueHandle>,
    queue_policy: &str,
) -> Result<(), String> {
    let mut properties = Map::new();
    properties.insert("Protocol".into(), json!("sqs"));
    properties.insert("TopicArn".into(), topic_arn);
    properties.insert("Endpoint".into(), queue.arn());
    properties.insert("RawMessageDelivery".into(), json!(false));
    if let Some(dlq) = dead_letter {
        properties.insert(
            "RedrivePolicy".into(),
            json!({ "deadLetterTargetArn": dlq.arn() }),
        );
    }
    stack.add_resource(
        logical_id,
        CfnResource::new("AWS::SNS::Subscription", Value::Object(properties)).depends_on(queue_policy),
    )
}

/// Let the topic deliver into each queue, and nothing else.
pub fn queue_policy(
    stack: &mut Stack,
    logical_id: &str,
    topic_arn: Value,
    queues: &[&QueueHandle],
) -> Result<(), String> {
    if queues.is_empty() {
        return Err(format!("queue policy '{}' covers no queues", logical_id));
    }
    let statements: Vec<PolicyStatement> = queues
        .iter()
        .map(|q| {
            PolicyStatement::allow()
                .sid(&format!("AllowTopicTo{}", q.logical_id))
                .principal(iam::service_principal("sns.amazonaws.com"))
                .actions(&["sqs:SendMessage"])
                .resource(q.arn())
                .condition("ArnEquals", "aws:SourceArn", topic_arn.clone())
                .condition("StringEquals", "aws:SourceAccount", account_id())
        })
        .collect();
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::SQS::QueuePolicy",
            json!({
                "PolicyDocument": iam::policy_document(&statements),
                "Queues": queues.iter().map(|q| q.url()).collect::<Vec<_>>(),
            }),
        ),
    )
}

// ============================================================================
// Event sources
// ============================================================================

#[derive(Debug, Clone)]
pub struct EventSourceProps {
    pub batch_size: u32,
    pub max_batching_window: u32,
    pub max_concurrency: u32,
    pub report_batch_item_failures: bool,

    /// Policies granting the function's role access to the queue; the
    /// mapping is created only after they exist
    pub depends_on: Vec<String>,
}

impl Default for EventSourceProps {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            max_batching_window: MAX_BATCHING_WINDOW,
            max_concurrency: MAX_CONCURRENCY,
            report_batch_item_failures: true,
            depends_on: Vec::new(),
        }
    }
}

impl EventSourceProps {
    /// Wait for the policy that lets the consumer read the queue.
    pub fn after(mut self, policy_id: &str) -> Self {
        self.depends_on.push(policy_id.to_string());
        self
    }
}

/// SQS redelivers a message still being processed unless the queue's
/// visibility timeout covers the consuming function's timeout.
pub fn check_visibility_timeout(queue: &QueueHandle, function_timeout: u32) -> Result<(), String> {
    let visibility = queue.visibility_timeout.unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);
    if visibility < function_timeout {
        return Err(format!(
            "queue '{}': visibility timeout {}s is shorter than the consumer timeout {}s",
            queue.queue_name, visibility, function_timeout
        ));
    }
    Ok(())
}

/// Poll `queue_arn` and invoke `function` (name, ARN or alias ARN).
pub fn sqs_event_source(
    stack: &mut Stack,
    logical_id: &str,
    queue_arn: Value,
    function: Value,
    props: EventSourceProps,
) -> Result<(), String> {
    if props.batch_size == 0 {
        return Err(format!("event source '{}': batch size must be > 0", logical_id));
    }
    if props.max_concurrency < 2 {
        return Err(format!(
            "event source '{}': maximum concurrency must be at least 2",
            logical_id
        ));
    }
    let mut properties = Map::new();
    properties.insert("EventSourceArn".into(), queue_arn);
    properties.insert("FunctionName".into(), function);
    properties.insert("BatchSize".into(), json!(props.batch_size));
    properties.insert(
        "MaximumBatchingWindowInSeconds".into(),
        json!(props.max_batching_window),
    );
    properties.insert(
        "ScalingConfig".into(),
        json!({ "MaximumConcurrency": props.max_concurrency }),
    );
    if props.report_batch_item_failures {
        properties.insert(
            "FunctionResponseTypes".into(),
            json!(["ReportBatchItemFailures"]),
        );
    }
    let mut resource = CfnResource::new("AWS::Lambda::EventSourceMapping", Value::Object(properties));
    for policy in &props.depends_on {
        resource = resource.depends_on(policy);
    }
    stack.add_resource(logical_id, resource)
}

// ============================================================================
// Alarms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThanOrEqual,
    LessThan,
}

impl Comparison {
    fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThanOrEqual => "GreaterThanOrEqualToThreshold",
            Self::LessThan => "LessThanThreshold",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricAlarm {
    pub metric_name: String,
    pub namespace: String,
    pub dimensions: Vec<(String, Value)>,
    pub statistic: String,
    pub period: u32,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparison: Comparison,
    pub description: String,
    pub actions_enabled: bool,
}

impl MetricAlarm {
    pub fn new(namespace: &str, metric_name: &str, statistic: &str) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            namespace: namespace.to_string(),
            dimensions: Vec::new(),
            statistic: statistic.to_string(),
            period: 60,
            evaluation_periods: 1,
            threshold: 0.0,
            comparison: Comparison::GreaterThanOrEqual,
            description: String::new(),
            actions_enabled: true,
        }
    }

    pub fn dimension(mut self, name: &str, value: Value) -> Self {
        self.dimensions.push((name.to_string(), value));
        self
    }

    pub fn threshold(mut self, threshold: f64, evaluation_periods: u32) -> Self {
        self.threshold = threshold;
        self.evaluation_periods = evaluation_periods;
        self
    }

    pub fn comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Period, evaluation periods, threshold and actions from settings.
    pub fn tuned(mut self, settings: &AlarmSettings) -> Self {
        self.period = settings.period;
        self.evaluation_periods = settings.evaluation_periods;
        self.threshold = settings.threshold;
        self.actions_enabled = settings.actions_enabled;
        self
    }
}

pub fn metric_alarm(stack: &mut Stack, logical_id: &str, alarm: &MetricAlarm) -> Result<(), String> {
    if alarm.evaluation_periods == 0 {
        return Err(format!("alarm '{}': evaluation periods must be > 0", logical_id));
    }
    let dimensions: Vec<Value> = alarm
        .dimensions
        .iter()
        .map(|(name, value)| json!({ "Name": name, "Value": value }))
        .collect();
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::CloudWatch::Alarm",
            json!({
                "AlarmDescription": alarm.description,
                "Namespace": alarm.namespace,
                "MetricName": alarm.metric_name,
                "Dimensions": dimensions,
                "Statistic": alarm.statistic,
                "Period": alarm.period,
                "EvaluationPeriods": alarm.evaluation_periods,
                "Threshold": alarm.threshold,
                "ComparisonOperator": alarm.comparison.as_str(),
                "ActionsEnabled": alarm.actions_enabled,
            }),
        ),
    )
}

/// Publish / delivery / failure alarms on a topic; alarm ARNs are exported.
pub fn topic_alarms(stack: &mut Stack, topic: &TopicHandle) -> Result<usize, String> {
    let specs: [(&str, f64, Comparison, &str); 3] = [
        (
            "NumberOfMessagesPublished",
            100.0,
            Comparison::GreaterThanOrEqual,
            "Alarm if too many messages are published to the topic",
        ),
        (
            "NumberOfNotificationsDelivered",
            90.0,
            Comparison::LessThan,
            "Alarm if fewer notifications are delivered than expected",
        ),
        (
            "NumberOfNotificationsFailed",
            10.0,
            Comparison::GreaterThanOrEqual,
            "Alarm if notifications fail",
        ),
    ];
    for (metric, threshold, comparison, description) in specs {
        let id = format!("{}{}Alarm", topic.topic_name, metric);
        let alarm = MetricAlarm::new("AWS/SNS", metric, "Sum")
            .dimension("TopicName", json!(topic.topic_name))
            .threshold(threshold, 1)
            .comparison(comparison)
            .description(description);
        metric_alarm(stack, &id, &alarm)?;
        stack.export(
            &format!("{}AlarmOutput", id),
            get_att(&id, "Arn"),
            &format!("{}-{}AlarmArn", metric, topic.topic_name),
        )?;
    }
    Ok(specs.len())
}

/// Oldest-message age and backlog alarms on a queue.
pub fn queue_alarms(stack: &mut Stack, queue: &QueueHandle) -> Result<usize, String> {
    let specs: [(&str, &str, f64, &str); 2] = [
        (
            "ApproximateAgeOfOldestMessage",
            "Maximum",
            300.0,
            "Alarm if the oldest message is older than 5 minutes.",
        ),
        (
            "ApproximateNumberOfMessagesVisible",
            "Maximum",
            100.0,
            "Alarm if there are more than 100 messages visible.",
        ),
    ];
    for (metric, statistic, threshold, description) in specs {
        let alarm = MetricAlarm::new("AWS/SQS", metric, statistic)
            .dimension("QueueName", queue.name())
            .threshold(threshold, 1)
            .description(description);
        metric_alarm(stack, &format!("{}{}Alarm", queue.logical_id, metric), &alarm)?;
    }
    Ok(specs.len())
}
