//! SSG-041: Job API stacks (`SsgApiAuthorizer`, `SsgAppApi`).
//!
//! Every job and schedule route goes through the authorizer Lambda, which
//! returns simple (allow / deny) responses keyed on the `Authorization`
//! header.

use super::registry::{RegistryHandle, Repo};
use super::StackContext;
use crate::constructs::http_api::{self, Cors, HttpMethod, RouteSpec};
use crate::constructs::iam::PolicyStatement;
use crate::constructs::lambda::{self, BundleExports, BundleProps};
use crate::core::inputs::require;
use crate::core::intrinsic::sub;
use crate::core::types::{ExportRef, Stack};
use serde_json::json;

pub const AUTHORIZER_NAME: &str = "SsgApiAuthorizer";
pub const APP_API_NAME: &str = "SsgAppApi";

/// Secret the authorizer reads its identity provider settings from.
pub const AUTH0_SECRET_ID: &str = "ssg-auth0-secrets";

/// Authorized routes of the job API.
pub fn app_routes() -> Vec<RouteSpec> {
    use HttpMethod::{Delete, Get, Post, Put};
    vec![
        RouteSpec::new("/api/job", &[Get, Post]),
        RouteSpec::new("/api/job/{id}", &[Get, Put, Delete]),
        RouteSpec::new("/api/schedule", &[Get, Post]),
        RouteSpec::new("/api/schedule/{id}", &[Get, Put, Delete]),
    ]
}

/// `SsgApiAuthorizer`
pub fn authorizer_stack(
    ctx: &StackContext<'_>,
    name: &str,
    registry: &RegistryHandle,
) -> Result<(Stack, BundleExports), String> {
    require(name, "authorizer Lambda version", &ctx.inputs.versions.authorizer)?;
    let auth_repo = registry.get(Repo::Authorizer)?;

    let mut stack = ctx.stack(name, "ScanSafeGuard API authorizer");
    let repository = auth_repo.import(&mut stack);

    // Secrets Manager appends a random suffix to secret ARNs.
    let secret_arn = sub(&format!(
        "arn:${{AWS::Partition}}:secretsmanager:${{AWS::Region}}:${{AWS::AccountId}}:secret:{}-*",
        AUTH0_SECRET_ID
    ));
    let props = BundleProps::new(AUTHORIZER_NAME, repository, &ctx.inputs.versions.authorizer)
        .env("AUTH0_SECRET_ID", json!(AUTH0_SECRET_ID))
        .statement(
            PolicyStatement::allow()
                .sid(&format!("Allow{}ToAccessSecretsManager", AUTHORIZER_NAME))
                .actions(&["secretsmanager:GetSecretValue"])
                .resource(secret_arn),
        );
    let bundle = lambda::lambda_bundle(&mut stack, ctx.tunables, props)?;
    let exports = bundle.exports(&stack.name);
    Ok((stack, exports))
}

/// `SsgAppApi`: the job API Lambda behind an authorized HTTP API.
pub fn app_api_stack(
    ctx: &StackContext<'_>,
    name: &str,
    registry: &RegistryHandle,
    authorizer: &BundleExports,
) -> Result<(Stack, ExportRef), String> {
    require(name, "job API Lambda version", &ctx.inputs.versions.job_api)?;
    let job_repo = registry.get(Repo::JobApi)?;

    let mut stack = ctx.stack(name, "ScanSafeGuard job API");
    let repository = job_repo.import(&mut stack);
    let authorizer_alias = stack.import(&authorizer.alias_arn);

    let props = BundleProps::new(APP_API_NAME, repository, &ctx.inputs.versions.job_api);
    let bundle = lambda::lambda_bundle(&mut stack, ctx.tunables, props)?;

    let api = http_api::http_api(
        &mut stack,
        &format!("{}HttpApi", APP_API_NAME),
        APP_API_NAME,
        Some(Cors::permissive()),
    )?;
    let integration = http_api::lambda_integration(
        &mut stack,
        &api,
        &format!("{}Integration", APP_API_NAME),
        bundle.alias_arn(),
    )?;
    let auth = http_api::lambda_authorizer(
        &mut stack,
        &api,
        &format!("{}LambdaAuthorizer", APP_API_NAME),
        authorizer_alias,
    )?;
    let keys = http_api::add_routes(&mut stack, &api, &app_routes(), &integration, Some(&auth))?;
    tracing::debug!(stack = %stack.name, routes = keys.len(), "job api routes declared");

    let export_name = format!("{}ApiUrl", APP_API_NAME);
    let url = stack.export(&export_name, api.endpoint(), &export_name)?;
    Ok((stack, url))
}
