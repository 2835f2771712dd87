//! SSG-042: CI identity stack (`SsgGithubStack`).
//!
//! GitHub Actions workflows of one repository assume `github-actions-role`
//! through the OIDC provider.

use super::StackContext;
use crate::constructs::iam::{self, PolicyStatement, RoleProps};
use crate::core::intrinsic::get_att;
use crate::core::types::{CfnResource, ExportRef, Stack};
use serde_json::json;

pub const OIDC_URL: &str = "https://token.actions.githubusercontent.com";
pub const OIDC_CLIENT_ID: &str = "sts.amazonaws.com";
pub const OIDC_THUMBPRINT: &str = "a031c46782e6e6c662c2c87c76da9aa62ccabd8e";
pub const ROLE_NAME: &str = "github-actions-role";
pub const MAX_SESSION_SECONDS: u32 = 3600;

const TOKEN_HOST: &str = "token.actions.githubusercontent.com";

pub fn build(ctx: &StackContext<'_>, name: &str) -> Result<(Stack, ExportRef), String> {
    let repo = ctx.inputs.github_repository.trim();
    match repo.split_once('/') {
        Some((owner, project)) if !owner.is_empty() && !project.is_empty() => {}
        _ => {
            return Err(format!(
                "{}: GitHub repository '{}' must be of the form owner/name",
                name, repo
            ))
        }
    }

    let mut stack = ctx.stack(name, "ScanSafeGuard GitHub Actions identity");
    stack.add_resource(
        "GithubOIDC",
        CfnResource::new(
            "AWS::IAM::OIDCProvider",
            json!({
                "Url": OIDC_URL,
                "ClientIdList": [OIDC_CLIENT_ID],
                "ThumbprintList": [OIDC_THUMBPRINT],
            }),
        ),
    )?;

    let trust = PolicyStatement::allow()
        .principal(iam::federated_principal(get_att("GithubOIDC", "Arn")))
        .actions(&["sts:AssumeRoleWithWebIdentity"])
        .condition("StringLike", &format!("{}:sub", TOKEN_HOST), json!(format!("repo:{}:*", repo)))
        .condition("StringEquals", &format!("{}:aud", TOKEN_HOST), json!(OIDC_CLIENT_ID));

    let role = iam::role(
        &mut stack,
        "DeployToECSRole",
        RoleProps {
            role_name: Some(ROLE_NAME.to_string()),
            description: Some("GitHub actions deployment to ECS".to_string()),
            trust: vec![trust],
            managed_policies: vec![
                iam::aws_managed_policy("AmazonS3FullAccess"),
                iam::aws_managed_policy("AmazonEC2ContainerRegistryReadOnly"),
                iam::aws_managed_policy("SecretsManagerReadWrite"),
            ],
            statements: Vec::new(),
            max_session_duration: Some(MAX_SESSION_SECONDS),
        },
    )?;
    let role_arn = stack.export("GithubActionsRoleArn", role.arn(), "GithubActionsRoleArn")?;
    Ok((stack, role_arn))
}
