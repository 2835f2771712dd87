//! SSG-022: Managed Lambda bundle factory.
//!
//! `lambda_bundle` declares the fixed set of resources every platform Lambda
//! gets: a dead-letter queue, an execution role, a log group, the container
//! image function, a published version with an environment alias, one error
//! alarm, and the exported outputs other stacks import.

use super::iam::{self, PolicyStatement, RoleHandle, RoleProps};
use super::messaging::{self, Comparison, MetricAlarm, QueueHandle, QueueProps};
use crate::core::inputs::require;
use crate::core::intrinsic::{get_att, join, reference, sub};
use crate::core::settings::Tunables;
use crate::core::types::{CfnResource, ExportRef, Stack};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

/// Days a Lambda dead-letter queue keeps failed events.
pub const DLQ_RETENTION_DAYS: u32 = 14;

pub const BASIC_EXECUTION_POLICY: &str = "service-role/AWSLambdaBasicExecutionRole";

/// An image repository as seen from the consuming stack.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryRef {
    pub repository_name: String,
    pub arn: Value,
    pub uri: Value,
}

#[derive(Debug, Clone)]
pub struct BundleProps {
    /// PascalCase function name, e.g. `StripeRelay`
    pub name: String,
    pub repository: RepositoryRef,
    pub image_tag: String,

    /// Appended to the execution role's default policy
    pub statements: Vec<PolicyStatement>,

    pub environment: IndexMap<String, Value>,
}

impl BundleProps {
    pub fn new(name: &str, repository: RepositoryRef, image_tag: &str) -> Self {
        Self {
            name: name.to_string(),
            repository,
            image_tag: image_tag.to_string(),
            statements: Vec::new(),
            environment: IndexMap::new(),
        }
    }

    pub fn statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn env(mut self, key: &str, value: Value) -> Self {
        self.environment.insert(key.to_string(), value);
        self
    }
}

/// Handles to everything `lambda_bundle` declared.
#[derive(Debug, Clone)]
pub struct LambdaBundle {
    pub name: String,
    pub function_id: String,
    pub version_id: String,
    pub alias_id: String,
    pub alias_name: String,
    pub log_group_id: String,
    pub dead_letter_queue: QueueHandle,
    pub role: RoleHandle,
}

impl LambdaBundle {
    pub fn function_name(&self) -> Value {
        reference(&self.function_id)
    }

    pub fn function_arn(&self) -> Value {
        get_att(&self.function_id, "Arn")
    }

    /// `Ref` on an alias yields its ARN.
    pub fn alias_arn(&self) -> Value {
        reference(&self.alias_id)
    }

    /// Export names declared for this bundle.
    pub fn export_name(&self, suffix: &str) -> String {
        format!("{}{}", self.name, suffix)
    }

    /// Handles other stacks use to import this bundle.
    pub fn exports(&self, stack_name: &str) -> BundleExports {
        let export = |suffix: &str| ExportRef {
            stack: stack_name.to_string(),
            name: self.export_name(suffix),
        };
        BundleExports {
            name: self.name.clone(),
            function_arn: export("LambdaArn"),
            alias_arn: export("LambdaAliasArn"),
            role_name: export("RoleName"),
        }
    }
}

/// A bundle as seen from another stack.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleExports {
    pub name: String,
    pub function_arn: ExportRef,
    pub alias_arn: ExportRef,
    pub role_name: ExportRef,
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!(
            "lambda name '{}' must be non-empty and alphanumeric",
            name
        ));
    }
    Ok(())
}

/// Declare a complete Lambda bundle into `stack`.
pub fn lambda_bundle(
    stack: &mut Stack,
    tunables: &Tunables,
    props: BundleProps,
) -> Result<LambdaBundle, String> {
    validate_name(&props.name)?;
    require(&stack.name, &format!("{} image tag", props.name), &props.image_tag)?;
    let name = props.name.as_str();
    let _span = tracing::debug_span!("lambda_bundle", stack = %stack.name, lambda = name).entered();

    let dead_letter_queue = messaging::queue(
        stack,
        &format!("{}LambdaDeadLetterQueue", name),
        QueueProps::named(&format!("{}LambdaDeadLetterQueue", name), DLQ_RETENTION_DAYS)
            .removal_policy(tunables.removal_policy),
    )?;

    let mut statements = vec![
        PolicyStatement::allow()
            .sid(&format!("Allow{}ToAccessSSM", name))
            .actions(&["ssm:GetParameter"])
            .resource(sub(
                "arn:${AWS::Partition}:ssm:${AWS::Region}:${AWS::AccountId}:parameter/ssg/*",
            )),
        messaging::send_statement(dead_letter_queue.arn())
            .sid(&format!("Allow{}ToUseDeadLetterQueue", name)),
    ];
    statements.extend(props.statements);

    let role_id = format!("{}LambdaExecutionRole", name);
    let role = iam::role(
        stack,
        &role_id,
        RoleProps {
            role_name: Some(format!("{}-lambda-execution-role", name.to_lowercase())),
            description: Some(format!("{} Execution Role", name)),
            trust: vec![
                iam::assumed_by(iam::service_principal("lambda.amazonaws.com")),
                iam::assumed_by(iam::account_root_principal()),
            ],
            managed_policies: vec![iam::aws_managed_policy(BASIC_EXECUTION_POLICY)],
            statements,
            max_session_duration: None,
        },
    )?;

    let log_group_id = format!("{}LogGroup", name);
    stack.add_resource(
        &log_group_id,
        CfnResource::new(
            "AWS::Logs::LogGroup",
            json!({
                "LogGroupName": format!("/aws/lambda/{}", name),
                "RetentionInDays": tunables.log_retention_period.days(),
            }),
        )
        .with_removal_policy(tunables.removal_policy),
    )?;

    let mut function = Map::new();
    function.insert("FunctionName".into(), json!(name));
    function.insert("Description".into(), json!(format!("{} Lambda Function", name)));
    function.insert("PackageType".into(), json!("Image"));
    function.insert(
        "Code".into(),
        json!({ "ImageUri": join("", vec![props.repository.uri.clone(), json!(":"), json!(props.image_tag)]) }),
    );
    function.insert("MemorySize".into(), json!(tunables.lambda_memory_size));
    function.insert("Timeout".into(), json!(tunables.lambda_timeout));
    function.insert("Role".into(), role.arn());
    function.insert(
        "DeadLetterConfig".into(),
        json!({ "TargetArn": dead_letter_queue.arn() }),
    );
    function.insert(
        "LoggingConfig".into(),
        json!({ "LogGroup": reference(&log_group_id) }),
    );
    if !props.environment.is_empty() {
        function.insert(
            "Environment".into(),
            json!({ "Variables": props.environment }),
        );
    }
    let function_id = name.to_string();
    let mut function = CfnResource::new("AWS::Lambda::Function", Value::Object(function));
    if let Some(policy) = &role.default_policy {
        function = function.depends_on(policy);
    }
    stack.add_resource(&function_id, function.depends_on(&role_id))?;

    let version_id = format!("{}CurrentVersion", name);
    stack.add_resource(
        &version_id,
        CfnResource::new(
            "AWS::Lambda::Version",
            json!({ "FunctionName": reference(&function_id) }),
        ),
    )?;

    let alias_name = format!("{}{}", name, tunables.alias_suffix());
    stack.add_resource(
        &alias_name,
        CfnResource::new(
            "AWS::Lambda::Alias",
            json!({
                "FunctionName": reference(&function_id),
                "FunctionVersion": get_att(&version_id, "Version"),
                "Name": alias_name,
            }),
        ),
    )?;

    let error_alarm = MetricAlarm::new(&tunables.lambda_alarm.namespace, "Errors", "Sum")
        .dimension("FunctionName", reference(&function_id))
        .tuned(&tunables.lambda_alarm)
        .description("Alarm if the Lambda function encounters errors.");
    messaging::metric_alarm(stack, &format!("{}LambdaErrorAlarm", name), &error_alarm)?;

    let bundle = LambdaBundle {
        name: name.to_string(),
        function_id,
        version_id,
        alias_id: alias_name.clone(),
        alias_name,
        log_group_id,
        dead_letter_queue,
        role,
    };

    stack.export(
        &bundle.export_name("LambdaArn"),
        bundle.function_arn(),
        &bundle.export_name("LambdaArn"),
    )?;
    stack.export(
        &bundle.export_name("LambdaAliasArn"),
        bundle.alias_arn(),
        &bundle.export_name("LambdaAliasArn"),
    )?;
    stack.export(
        &bundle.export_name("Lambda"),
        json!(bundle.alias_name),
        &bundle.export_name("Lambda"),
    )?;
    stack.export(
        &bundle.export_name("RoleName"),
        bundle.role.name(),
        &bundle.export_name("RoleName"),
    )?;
    stack.export(
        &bundle.export_name("RepositoryArn"),
        props.repository.arn,
        &bundle.export_name("RepositoryArn"),
    )?;

    tracing::debug!(stack = %stack.name, lambda = %bundle.name, alias = %bundle.alias_name, "lambda bundle declared");
    Ok(bundle)
}

/// Duration and dead-letter depth alarms for a bundle.
pub fn health_alarms(
    stack: &mut Stack,
    tunables: &Tunables,
    bundle: &LambdaBundle,
) -> Result<(), String> {
    let duration = MetricAlarm::new(&tunables.lambda_alarm.namespace, "Duration", "Average")
        .dimension("FunctionName", bundle.function_name())
        .tuned(&tunables.lambda_alarm)
        .description("Alarm if Lambda function duration exceeds the threshold.");
    messaging::metric_alarm(stack, &format!("{}DurationAlarm", bundle.name), &duration)?;

    let depth = MetricAlarm::new(
        &tunables.queue_alarm.namespace,
        "ApproximateNumberOfMessagesVisible",
        "Maximum",
    )
    .dimension("QueueName", bundle.dead_letter_queue.name())
    .tuned(&tunables.queue_alarm)
    .description("Alarm if messages start to accumulate in the dead-letter queue.");
    messaging::metric_alarm(
        stack,
        &format!("{}DeadLetterQueueDepthAlarm", bundle.name),
        &depth,
    )
}

/// Let a service principal invoke `function`, optionally scoped to one source.
pub fn invoke_permission(
    stack: &mut Stack,
    logical_id: &str,
    function: Value,
    service: &str,
    source_arn: Option<Value>,
) -> Result<(), String> {
    let mut properties = Map::new();
    properties.insert("Action".into(), json!("lambda:InvokeFunction"));
    properties.insert("FunctionName".into(), function);
    properties.insert("Principal".into(), json!(service));
    if let Some(arn) = source_arn {
        properties.insert("SourceArn".into(), arn);
    }
    stack.add_resource(
        logical_id,
        CfnResource::new("AWS::Lambda::Permission", Value::Object(properties)),
    )
}

/// Alarm when a function's duration crosses a fixed number of milliseconds.
pub fn duration_alarm(
    stack: &mut Stack,
    bundle: &LambdaBundle,
    namespace: &str,
    millis: f64,
) -> Result<(), String> {
    let alarm = MetricAlarm::new(namespace, "Duration", "Average")
        .dimension("FunctionName", bundle.function_name())
        .threshold(millis, 1)
        .comparison(Comparison::GreaterThanOrEqual)
        .description("Alarm if Lambda function duration exceeds 5 seconds.");
    messaging::metric_alarm(stack, &format!("{}SlowInvocationAlarm", bundle.name), &alarm)
}

/// Alarm when `threshold` messages sit in the bundle's dead-letter queue.
pub fn dead_letter_alarm(
    stack: &mut Stack,
    bundle: &LambdaBundle,
    threshold: f64,
) -> Result<(), String> {
    let alarm = MetricAlarm::new("AWS/SQS", "ApproximateNumberOfMessagesVisible", "Maximum")
        .dimension("QueueName", bundle.dead_letter_queue.name())
        .threshold(threshold, 1)
        .description("Alarm if messages start to accumulate in the dead-letter queue.");
    messaging::metric_alarm(stack, &format!("{}DeadLetterAlarm", bundle.name), &alarm)
}

#[cfg(test)]
pub(crate) fn test_repository(name: &str) -> RepositoryRef {
    RepositoryRef {
        repository_name: name.to_string(),
        arn: json!(format!("arn:aws:ecr:us-east-1:123456789012:repository/{}", name)),
        uri: json!(format!("123456789012.dkr.ecr.us-east-1.amazonaws.com/{}", name)),
    }
}
