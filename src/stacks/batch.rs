//! SSG-036: Batch stack (`SsgBatch`).
//!
//! Fargate spot compute in the public subnets, a fair-share scheduling
//! policy keyed on subscription tier, low and high priority job queues, and
//! the nmap scan job definition.

use super::network::{NetworkHandle, SubnetTier};
use super::registry::{RegistryHandle, Repo};
use super::StackContext;
use crate::constructs::iam::{self, PolicyStatement, RoleProps};
use crate::core::inputs::require;
use crate::core::intrinsic::{get_att, join, reference, split};
use crate::core::types::{CfnResource, ExportRef, RemovalPolicy, Stack};
use serde_json::json;

pub const NAME_PREFIX: &str = "Ssg";
pub const NMAP_IMAGE_TAG: &str = "7.95";
pub const JOB_VCPU: &str = "1";
pub const JOB_MEMORY_MIB: &str = "2048";
pub const HIGH_PRIORITY: u32 = 10;
pub const MAX_VCPUS: u32 = 256;

/// Fair-share weights per subscription tier.
pub const SHARES: &[(&str, f64)] = &[("basic", 1.0), ("professional", 2.0), ("enterprise", 4.0)];

#[derive(Debug, Clone, PartialEq)]
pub struct BatchHandle {
    pub low_priority_queue_arn: ExportRef,
    pub high_priority_queue_arn: ExportRef,
    pub compute_environment_arn: ExportRef,
}

pub fn build(
    ctx: &StackContext<'_>,
    name: &str,
    network: &NetworkHandle,
    registry: &RegistryHandle,
) -> Result<(Stack, BatchHandle), String> {
    let env = ctx.inputs.environment.as_str();
    require(name, "environment", env)?;
    let nmap = registry.get(Repo::Nmap)?;

    let mut stack = ctx.stack(name, "ScanSafeGuard Batch compute, queues and job definitions");
    stack.add_tag("Service", "Batch");
    let _span = tracing::debug_span!("batch_stack", stack = name, env).entered();

    let vpc_id = stack.import(&network.vpc_id);
    let public_subnets = stack.import(network.subnets(SubnetTier::Public));
    let nmap_repo = nmap.import(&mut stack);

    let service_role = iam::role(
        &mut stack,
        "SsgBatchCompEnvRole",
        RoleProps {
            role_name: Some(format!("{}-batch-comp-env-role-{}", NAME_PREFIX, env)),
            trust: vec![iam::assumed_by(iam::service_principal("batch.amazonaws.com"))],
            managed_policies: vec![iam::aws_managed_policy("service-role/AWSBatchServiceRole")],
            ..Default::default()
        },
    )?;

    let events_role = iam::role(
        &mut stack,
        "SsgEventBridgeRole",
        RoleProps {
            role_name: Some(format!("{}-event-bridge-role-{}", NAME_PREFIX, env)),
            trust: vec![iam::assumed_by(iam::service_principal("events.amazonaws.com"))],
            managed_policies: vec![iam::aws_managed_policy("service-role/AWSBatchServiceRole")],
            statements: vec![PolicyStatement::allow()
                .sid("BatchSubmitJob")
                .actions(&["batch:SubmitJob"])
                .resource(json!("*"))],
            ..Default::default()
        },
    )?;

    stack.add_resource(
        "BatchSecurityGroup",
        CfnResource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": "SG for the batch job",
                "VpcId": vpc_id,
                "SecurityGroupEgress": [
                    { "CidrIp": "0.0.0.0/0", "IpProtocol": "-1", "Description": "Allow all outbound traffic" }
                ],
            }),
        ),
    )?;

    let compute_env_name = format!("{}-batch-compute-environment-{}", NAME_PREFIX, env);
    stack.add_resource(
        "SsgBatchComputeEnvironment",
        CfnResource::new(
            "AWS::Batch::ComputeEnvironment",
            json!({
                "ComputeEnvironmentName": compute_env_name,
                "Type": "MANAGED",
                "State": "ENABLED",
                "ServiceRole": service_role.arn(),
                "ReplaceComputeEnvironment": false,
                "UpdatePolicy": { "TerminateJobsOnUpdate": false, "JobExecutionTimeoutMinutes": 30 },
                "ComputeResources": {
                    "Type": "FARGATE_SPOT",
                    "MaxvCpus": MAX_VCPUS,
                    "Subnets": split(",", public_subnets),
                    "SecurityGroupIds": [get_att("BatchSecurityGroup", "GroupId")],
                    "UpdateToLatestImageVersion": true,
                },
            }),
        ),
    )?;

    stack.add_resource(
        "SsgSharePolicy",
        CfnResource::new(
            "AWS::Batch::SchedulingPolicy",
            json!({
                "Name": format!("{}-batch-share-policy-{}", NAME_PREFIX, env),
                "FairsharePolicy": {
                    "ShareDistribution": SHARES
                        .iter()
                        .map(|(id, weight)| json!({ "ShareIdentifier": id, "WeightFactor": weight }))
                        .collect::<Vec<_>>(),
                },
            }),
        ),
    )?;

    for (id, suffix, priority, order) in [
        ("SsgBatchJobQueueLow", "low", 1, 1),
        ("SsgBatchJobQueueHigh", "high", HIGH_PRIORITY, 2),
    ] {
        stack.add_resource(
            id,
            CfnResource::new(
                "AWS::Batch::JobQueue",
                json!({
                    "JobQueueName": format!("{}-batch-job-queue-{}-{}", NAME_PREFIX, suffix, env),
                    "Priority": priority,
                    "State": "ENABLED",
                    "SchedulingPolicyArn": reference("SsgSharePolicy"),
                    "ComputeEnvironmentOrder": [
                        { "ComputeEnvironment": reference("SsgBatchComputeEnvironment"), "Order": order }
                    ],
                }),
            ),
        )?;
    }

    let log_group_name = format!("/aws/batch/job/{}-batch-job-{}", NAME_PREFIX, env);
    stack.add_resource(
        "SsgBatchLogGroup",
        CfnResource::new(
            "AWS::Logs::LogGroup",
            json!({
                "LogGroupName": log_group_name,
                "RetentionInDays": ctx.tunables.log_retention_period.days(),
            }),
        )
        .with_removal_policy(RemovalPolicy::Destroy),
    )?;

    let task_role = iam::role(
        &mut stack,
        "SsgBatchEcsRole",
        RoleProps {
            role_name: Some(format!("{}-batch-ecs-role-{}", NAME_PREFIX, env)),
            trust: vec![iam::assumed_by(iam::service_principal("ecs-tasks.amazonaws.com"))],
            managed_policies: vec![
                iam::aws_managed_policy("service-role/AmazonECSTaskExecutionRolePolicy"),
                iam::aws_managed_policy("CloudWatchLogsFullAccess"),
            ],
            ..Default::default()
        },
    )?;

    stack.add_resource(
        "SsgBatchJobDefinition",
        CfnResource::new(
            "AWS::Batch::JobDefinition",
            json!({
                "JobDefinitionName": format!("{}-batch-job-definition-{}-nmap", NAME_PREFIX, env),
                "Type": "container",
                "PlatformCapabilities": ["FARGATE"],
                "SchedulingPriority": 50,
                "ContainerProperties": {
                    "Image": join("", vec![nmap_repo.uri, json!(":"), json!(NMAP_IMAGE_TAG)]),
                    "JobRoleArn": task_role.arn(),
                    "ExecutionRoleArn": task_role.arn(),
                    "Command": ["nmap", "-v", "-A", "scanme.nmap.org"],
                    "NetworkConfiguration": { "AssignPublicIp": "ENABLED" },
                    "Environment": [{ "Name": "Environment", "Value": env }],
                    "ResourceRequirements": [
                        { "Type": "VCPU", "Value": JOB_VCPU },
                        { "Type": "MEMORY", "Value": JOB_MEMORY_MIB },
                    ],
                    "FargatePlatformConfiguration": { "PlatformVersion": "LATEST" },
                    "LogConfiguration": {
                        "LogDriver": "awslogs",
                        "Options": {
                            "awslogs-group": reference("SsgBatchLogGroup"),
                            "awslogs-region": reference("AWS::Region"),
                            "awslogs-stream-prefix": "batch",
                        },
                    },
                },
            }),
        ),
    )?;

    stack.export(
        "SsgComputingEnvironmentName",
        json!(compute_env_name),
        "SsgComputingEnvironmentName",
    )?;
    let compute_environment_arn = stack.export(
        "SsgComputingEnvironmentArn",
        reference("SsgBatchComputeEnvironment"),
        "SsgComputingEnvironmentArn",
    )?;
    let low_priority_queue_arn =
        stack.export("SsgJobQueueLowArn", reference("SsgBatchJobQueueLow"), "SsgJobQueueLowArn")?;
    let high_priority_queue_arn =
        stack.export("SsgJobQueueHighArn", reference("SsgBatchJobQueueHigh"), "SsgJobQueueHighArn")?;
    stack.export(
        "SsgEventBridgeRoleArn",
        events_role.arn(),
        "SsgEventBridgeRoleArn",
    )?;

    Ok((
        stack,
        BatchHandle {
            low_priority_queue_arn,
            high_priority_queue_arn,
            compute_environment_arn,
        },
    ))
}
