//! SSG-034: Secrets stack (`SsgSecretsStack`).
//!
//! The secret is created with placeholder values; operators fill in the real
//! ones after the first deploy.

use super::StackContext;
use crate::core::intrinsic::reference;
use crate::core::types::{CfnResource, ExportRef, Stack};
use serde_json::{json, Map, Value};

pub const SECRET_NAME: &str = "ssgSecret";

/// Keys of the platform secret and their placeholder values.
pub const PLACEHOLDER_KEYS: &[(&str, &str)] = &[
    ("stripeDestinationUrl", "PLACEHOLDER_STRIPE_DESTINATION_URL"),
    ("stripeTopicArn", "PLACEHOLDER_STRIPE_TOPIC_ARN"),
    ("couchbaseUsername", "PLACEHOLDER_USERNAME"),
    ("couchbasePassword", "PLACEHOLDER_PASSWORD"),
    ("couchbaseConnectionString", "PLACEHOLDER_CONNECTION_STRING"),
    ("couchbaseBucket", "PLACEHOLDER_BUCKET"),
    ("couchbaseGlobalScope", "PLACEHOLDER_SCOPE"),
    ("auth0BaseUrl", "PLACEHOLDER_BASE_URL"),
    ("stripeSecretKey", "PLACEHOLDER_STRIPE_SECRET_KEY"),
    ("stripeWebhookSecret", "PLACEHOLDER_STRIPE_WEBHOOK_SECRET"),
    ("stripeCollectionId", "PLACEHOLDER_STRIPE_COLLECTION_NAME"),
    ("stripeScopeName", "PLACEHOLDER_STRIPE_SCOPE_NAME"),
    ("stripeMvsProductId", "PLACEHOLDER_STRIPE_MVS_PRODUCT_ID"),
    ("stripePublishableKey", "PLACEHOLDER_STRIPE_PUBLISHABLE_KEY"),
    ("auth0IssuerBaseUrl", "PLACEHOLDER_ISSUER_BASE_URL"),
    ("auth0ClientId", "PLACEHOLDER_CLIENT_ID"),
    ("auth0ClientSecret", "PLACEHOLDER_CLIENT_SECRET"),
    ("auth0Audience", "PLACEHOLDER_AUDIENCE"),
    ("auth0Domain", "PLACEHOLDER_DOMAIN"),
    ("auth0CallbackUrl", "PLACEHOLDER_CALLBACK_URL"),
    ("auth0ManagementApiAudience", "PLACEHOLDER_MANAGEMENT_API_AUDIENCE"),
    ("auth0ManagementApiClientId", "PLACEHOLDER_MANAGEMENT_API_CLIENT_ID"),
    ("auth0ManagementApiClientSecret", "PLACEHOLDER_MANAGEMENT_API_CLIENT_SECRET"),
    ("auth0ManagementDomain", "PLACEHOLDER_MANAGEMENT_DOMAIN"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SecretsHandle {
    pub secret_arn: ExportRef,
}

fn placeholder_document() -> Result<String, String> {
    let map: Map<String, Value> = PLACEHOLDER_KEYS
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    serde_json::to_string(&Value::Object(map)).map_err(|e| format!("secret document: {}", e))
}

pub fn build(ctx: &StackContext<'_>, name: &str) -> Result<(Stack, SecretsHandle), String> {
    let mut stack = ctx.stack(name, "ScanSafeGuard application secrets");
    stack.add_resource(
        "SsgSecret",
        CfnResource::new(
            "AWS::SecretsManager::Secret",
            json!({
                "Name": SECRET_NAME,
                "Description": "The secrets used for SSG",
                "SecretString": placeholder_document()?,
            }),
        )
        .with_removal_policy(ctx.tunables.removal_policy),
    )?;
    // Ref on a secret yields its ARN
    let secret_arn = stack.export("SsgSecretArn", reference("SsgSecret"), "SsgSecretArn")?;
    Ok((stack, SecretsHandle { secret_arn }))
}
