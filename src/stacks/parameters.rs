//! SSG-035: Parameter store stack (`SsgParametersStack`).
//!
//! Parameters live under `/ssg/<environment>/`. The Stripe topic ARN is
//! computed from the topic's fixed name so this stack does not depend on the
//! topic stack.

use super::secrets::SecretsHandle;
use super::stripe::STRIPE_TOPIC_NAME;
use super::StackContext;
use crate::core::inputs::require;
use crate::core::intrinsic::{join, reference, sub};
use crate::core::types::{CfnResource, ExportRef, Stack};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ParametersHandle {
    /// Export holding the topic-ARN parameter's *name*
    pub stripe_topic_arn: ExportRef,
    pub stripe_destination_url: ExportRef,
    pub frontend_domain_name: Option<ExportRef>,
    pub secret_arn: ExportRef,
}

/// `/ssg/<environment>/<key>`
pub fn parameter_path(environment: &str, key: &str) -> String {
    format!("/ssg/{}/{}", environment, key)
}

/// ARN of a parameter given (an expression for) its absolute path.
pub fn parameter_arn(path: Value) -> Value {
    join(
        "",
        vec![
            json!("arn:"),
            reference("AWS::Partition"),
            json!(":ssm:"),
            reference("AWS::Region"),
            json!(":"),
            reference("AWS::AccountId"),
            json!(":parameter"),
            path,
        ],
    )
}

fn string_parameter(
    stack: &mut Stack,
    logical_id: &str,
    path: &str,
    value: Value,
    description: &str,
) -> Result<(), String> {
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::SSM::Parameter",
            json!({
                "Name": path,
                "Type": "String",
                "Value": value,
                "Description": description,
                "Tier": "Standard",
                "DataType": "text",
            }),
        ),
    )
}

pub fn build(
    ctx: &StackContext<'_>,
    name: &str,
    secrets: &SecretsHandle,
) -> Result<(Stack, ParametersHandle), String> {
    let env = ctx.inputs.environment.as_str();
    require(name, "environment", env)?;
    require(name, "Stripe destination URL", &ctx.inputs.stripe_destination_url)?;

    let mut stack = ctx.stack(name, "ScanSafeGuard SSM parameters");

    let topic_path = parameter_path(env, "stripe-topic-arn");
    string_parameter(
        &mut stack,
        "StripeTopicArn",
        &topic_path,
        sub(&format!(
            "arn:${{AWS::Partition}}:sns:${{AWS::Region}}:${{AWS::AccountId}}:{}",
            STRIPE_TOPIC_NAME
        )),
        "Stripe topic ARN",
    )?;
    let stripe_topic_arn = stack.export("StripeTopicArnOutput", json!(topic_path), "StripeTopicArn")?;

    let url_path = parameter_path(env, "stripe-destination-url");
    string_parameter(
        &mut stack,
        "StripeDestinationUrl",
        &url_path,
        json!(ctx.inputs.stripe_destination_url),
        "Location of the Stripe webhook destination",
    )?;
    let stripe_destination_url =
        stack.export("StripeDestinationUrlOutput", json!(url_path), "StripeDestinationUrl")?;

    // SSM rejects empty values, so the frontend parameter is optional.
    let frontend_domain_name = if ctx.inputs.frontend_domain_name.is_empty() {
        None
    } else {
        let path = parameter_path(env, "frontend-domain-name");
        string_parameter(
            &mut stack,
            "FrontendDomainName",
            &path,
            json!(ctx.inputs.frontend_domain_name),
            "Domain name of the frontend",
        )?;
        Some(stack.export("FrontendDomainNameOutput", json!(path), "FrontendDomainName")?)
    };

    let secret_path = parameter_path(env, "secret-arn");
    let secret_value = stack.import(&secrets.secret_arn);
    string_parameter(
        &mut stack,
        "SsgSecretArnParameter",
        &secret_path,
        secret_value,
        "ARN of the platform secret",
    )?;
    let secret_arn = stack.export("SecretArnParameterOutput", json!(secret_path), "SsgSecretArnParameter")?;

    Ok((
        stack,
        ParametersHandle {
            stripe_topic_arn,
            stripe_destination_url,
            frontend_domain_name,
            secret_arn,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures::fixture;
    use crate::stacks::secrets;

    fn secrets_handle() -> SecretsHandle {
        let f = fixture();
        secrets::build(&f.ctx(), "SsgSecretsStack").unwrap().1
    }

    #[test]
    fn test_ssg035_parameter_paths_scoped_by_environment() {
        let f = fixture();
        let (stack, handle) = build(&f.ctx(), "SsgParametersStack", &secrets_handle()).unwrap();
        let topic = stack.resource("StripeTopicArn").unwrap();
        assert_eq!(topic.properties["Name"], "/ssg/dev/stripe-topic-arn");
        assert!(topic.properties["Value"]["Fn::Sub"]
            .as_str()
            .unwrap()
            .ends_with(":StripeTopic"));
        let url = stack.resource("StripeDestinationUrl").unwrap();
        assert_eq!(url.properties["Value"], f.inputs.stripe_destination_url);
        assert_eq!(handle.stripe_topic_arn.name, "StripeTopicArn");
    }

    #[test]
    fn test_ssg035_depends_on_secrets() {
        let f = fixture();
        let (stack, _) = build(&f.ctx(), "SsgParametersStack", &secrets_handle()).unwrap();
        assert_eq!(stack.dependencies, vec!["SsgSecretsStack"]);
        let p = stack.resource("SsgSecretArnParameter").unwrap();
        assert_eq!(p.properties["Value"], json!({"Fn::ImportValue": "SsgSecretArn"}));
    }

    #[test]
    fn test_ssg035_frontend_parameter_optional() {
        let f = fixture();
        let (stack, handle) = build(&f.ctx(), "SsgParametersStack", &secrets_handle()).unwrap();
        assert!(stack.resource("FrontendDomainName").is_none());
        assert!(handle.frontend_domain_name.is_none());

        let mut f = fixture();
        f.inputs.frontend_domain_name = "app.scansafeguard.dev".into();
        let (stack, handle) = build(&f.ctx(), "SsgParametersStack", &secrets_handle()).unwrap();
        assert!(stack.resource("FrontendDomainName").is_some());
        assert_eq!(handle.frontend_domain_name.unwrap().name, "FrontendDomainName");
    }

    #[test]
    fn test_ssg035_missing_destination_rejected() {
        let mut f = fixture();
        f.inputs.stripe_destination_url = " ".into();
        let err = build(&f.ctx(), "SsgParametersStack", &secrets_handle()).unwrap_err();
        assert!(err.contains("Stripe destination URL is required"));
    }

    #[test]
    fn test_ssg035_parameter_arn() {
        let arn = parameter_arn(json!("/ssg/dev/x"));
        assert_eq!(arn["Fn::Join"][1][6], ":parameter");
        assert_eq!(arn["Fn::Join"][1][7], "/ssg/dev/x");
    }
}
