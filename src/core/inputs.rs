//! SSG-004: Deployment inputs read from the process environment.
//!
//! Required inputs are checked together so the error names every missing
//! variable at once. Nothing is built until this succeeds.

use serde::Serialize;

/// Required environment variables, in the order they are reported.
pub const REQUIRED_VARS: &[&str] = &[
    "CERTIFICATE_ARN",
    "ZONE_NAME",
    "RELAY_LAMBDA_VERSION",
    "STRIPE_HOOK_LAMBDA_VERSION",
    "EB_RULES_LAMBDA_VERSION",
    "EB_SCHEDULE_LAMBDA_VERSION",
    "JOB_API_LAMBDA_VERSION",
    "AUTHORIZER_LAMBDA_VERSION",
    "SCHEDULER_DESTINATION_URL",
    "STRIPE_DESTINATION_URL",
];

pub const DEFAULT_ENVIRONMENT: &str = "dev";
pub const DEFAULT_OWNER: &str = "platform@scansafeguard.dev";
pub const DEFAULT_GITHUB_REPOSITORY: &str = "scansafeguard/scansafeguard";

/// Image tags for every Lambda the platform deploys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LambdaVersions {
    pub relay: String,
    pub stripe_hook: String,
    pub eb_rules: String,
    pub eb_schedule: String,
    pub job_api: String,
    pub authorizer: String,
}

/// Everything a synthesis run needs from outside the context file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentInputs {
    pub certificate_arn: String,
    pub zone_name: String,
    pub versions: LambdaVersions,
    pub scheduler_destination_url: String,
    pub stripe_destination_url: String,

    /// `ENVIRONMENT`; selects the scoped context block and parameter paths
    pub environment: String,
    pub owner: String,
    pub frontend_domain_name: String,

    /// `owner/name` allowed to assume the CI deployment role
    pub github_repository: String,
}

impl DeploymentInputs {
    /// Read inputs from the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read inputs through an arbitrary lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|k| get(k).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            ));
        }

        let required = |key: &str| get(key).unwrap_or_default();
        let inputs = Self {
            certificate_arn: required("CERTIFICATE_ARN"),
            zone_name: required("ZONE_NAME"),
            versions: LambdaVersions {
                relay: required("RELAY_LAMBDA_VERSION"),
                stripe_hook: required("STRIPE_HOOK_LAMBDA_VERSION"),
                eb_rules: required("EB_RULES_LAMBDA_VERSION"),
                eb_schedule: required("EB_SCHEDULE_LAMBDA_VERSION"),
                job_api: required("JOB_API_LAMBDA_VERSION"),
                authorizer: required("AUTHORIZER_LAMBDA_VERSION"),
            },
            scheduler_destination_url: required("SCHEDULER_DESTINATION_URL"),
            stripe_destination_url: required("STRIPE_DESTINATION_URL"),
            environment: get("ENVIRONMENT").unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            owner: get("OWNER").unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            frontend_domain_name: get("FRONTEND_DOMAIN_NAME")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            github_repository: get("GITHUB_REPOSITORY")
                .unwrap_or_else(|| DEFAULT_GITHUB_REPOSITORY.to_string()),
        };
        tracing::debug!(environment = %inputs.environment, "deployment inputs resolved");
        Ok(inputs)
    }
}

/// Fail unless `value` is non-empty. Stack builders call this before
/// declaring any resource.
pub fn require(stack: &str, what: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{}: {} is required", stack, what));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_inputs() -> DeploymentInputs {
    DeploymentInputs::from_lookup(|k| sample_env(k)).unwrap()
}

#[cfg(test)]
pub(crate) fn sample_env(key: &str) -> Option<String> {
    let v = match key {
        "CERTIFICATE_ARN" => "arn:aws:acm:us-east-1:123456789012:certificate/abc",
        "ZONE_NAME" => "scansafeguard.dev",
        "RELAY_LAMBDA_VERSION" => "1.4.0",
        "STRIPE_HOOK_LAMBDA_VERSION" => "2.0.1",
        "EB_RULES_LAMBDA_VERSION" => "0.9.0",
        "EB_SCHEDULE_LAMBDA_VERSION" => "0.3.2",
        "JOB_API_LAMBDA_VERSION" => "3.1.0",
        "AUTHORIZER_LAMBDA_VERSION" => "1.0.0",
        "SCHEDULER_DESTINATION_URL" => "https://api.scansafeguard.dev/api/schedule",
        "STRIPE_DESTINATION_URL" => "https://api.scansafeguard.dev/api/stripe",
        _ => return None,
    };
    Some(v.to_string())
}
