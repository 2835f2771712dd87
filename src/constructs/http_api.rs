//! SSG-023: HTTP APIs (API Gateway v2) with Lambda proxy integrations.

use super::lambda::invoke_permission;
use crate::core::intrinsic::{get_att, join, reference, sub_with};
use crate::core::types::{CfnResource, Stack};
use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Any,
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "ANY"),
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A path and the methods served on it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    pub path: String,
    pub methods: Vec<HttpMethod>,
}

impl RouteSpec {
    pub fn new(path: &str, methods: &[HttpMethod]) -> Self {
        Self {
            path: path.to_string(),
            methods: methods.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cors {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
}

impl Cors {
    /// Any origin, method and header.
    pub fn permissive() -> Self {
        Self {
            allow_origins: vec!["*".into()],
            allow_methods: vec!["*".into()],
            allow_headers: vec!["*".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpApiHandle {
    pub logical_id: String,
    pub name: String,
}

impl HttpApiHandle {
    pub fn api_id(&self) -> Value {
        reference(&self.logical_id)
    }

    pub fn endpoint(&self) -> Value {
        get_att(&self.logical_id, "ApiEndpoint")
    }

    /// `execute-api` ARN covering every stage, method and path.
    fn execute_arn(&self) -> Value {
        sub_with(
            "arn:${AWS::Partition}:execute-api:${AWS::Region}:${AWS::AccountId}:${Api}/*/*",
            json!({ "Api": self.api_id() }),
        )
    }
}

/// Declare an HTTP API and its auto-deployed `$default` stage.
pub fn http_api(
    stack: &mut Stack,
    logical_id: &str,
    name: &str,
    cors: Option<Cors>,
) -> Result<HttpApiHandle, String> {
    let mut properties = Map::new();
    properties.insert("Name".into(), json!(name));
    properties.insert("ProtocolType".into(), json!("HTTP"));
    if let Some(c) = cors {
        properties.insert(
            "CorsConfiguration".into(),
            json!({
                "AllowOrigins": c.allow_origins,
                "AllowMethods": c.allow_methods,
                "AllowHeaders": c.allow_headers,
            }),
        );
    }
    stack.add_resource(
        logical_id,
        CfnResource::new("AWS::ApiGatewayV2::Api", Value::Object(properties)),
    )?;
    stack.add_resource(
        &format!("{}DefaultStage", logical_id),
        CfnResource::new(
            "AWS::ApiGatewayV2::Stage",
            json!({
                "ApiId": reference(logical_id),
                "StageName": "$default",
                "AutoDeploy": true,
            }),
        ),
    )?;
    Ok(HttpApiHandle {
        logical_id: logical_id.to_string(),
        name: name.to_string(),
    })
}

fn lambda_invocation_uri(function_arn: Value) -> Value {
    join(
        "",
        vec![
            json!("arn:"),
            reference("AWS::Partition"),
            json!(":apigateway:"),
            reference("AWS::Region"),
            json!(":lambda:path/2015-03-31/functions/"),
            function_arn,
            json!("/invocations"),
        ],
    )
}

/// Proxy integration to a Lambda, plus the permission letting the API call it.
pub fn lambda_integration(
    stack: &mut Stack,
    api: &HttpApiHandle,
    logical_id: &str,
    function_arn: Value,
) -> Result<String, String> {
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::ApiGatewayV2::Integration",
            json!({
                "ApiId": api.api_id(),
                "IntegrationType": "AWS_PROXY",
                "IntegrationUri": function_arn,
                "PayloadFormatVersion": "2.0",
            }),
        ),
    )?;
    invoke_permission(
        stack,
        &format!("{}Permission", logical_id),
        function_arn,
        "apigateway.amazonaws.com",
        Some(api.execute_arn()),
    )?;
    Ok(logical_id.to_string())
}

/// REQUEST authorizer with simple responses, keyed on the Authorization header.
pub fn lambda_authorizer(
    stack: &mut Stack,
    api: &HttpApiHandle,
    logical_id: &str,
    function_arn: Value,
) -> Result<String, String> {
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::ApiGatewayV2::Authorizer",
            json!({
                "ApiId": api.api_id(),
                "Name": logical_id,
                "AuthorizerType": "REQUEST",
                "AuthorizerUri": lambda_invocation_uri(function_arn.clone()),
                "AuthorizerPayloadFormatVersion": "2.0",
                "EnableSimpleResponses": true,
                "IdentitySource": ["$request.header.Authorization"],
            }),
        ),
    )?;
    invoke_permission(
        stack,
        &format!("{}Permission", logical_id),
        function_arn,
        "apigateway.amazonaws.com",
        Some(sub_with(
            "arn:${AWS::Partition}:execute-api:${AWS::Region}:${AWS::AccountId}:${Api}/authorizers/${Authorizer}",
            json!({ "Api": api.api_id(), "Authorizer": reference(logical_id) }),
        )),
    )?;
    Ok(logical_id.to_string())
}

/// Logical id for a route, e.g. `JobApiGETapijobid`.
pub fn route_logical_id(prefix: &str, method: HttpMethod, path: &str) -> String {
    let clean: String = path.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("{}{}{}", prefix, method, clean)
}

/// Declare one route per method of every spec. Returns the route keys.
pub fn add_routes(
    stack: &mut Stack,
    api: &HttpApiHandle,
    routes: &[RouteSpec],
    integration_id: &str,
    authorizer_id: Option<&str>,
) -> Result<Vec<String>, String> {
    let mut keys = Vec::new();
    for spec in routes {
        if !spec.path.starts_with('/') {
            return Err(format!("route path '{}' must start with '/'", spec.path));
        }
        for method in &spec.methods {
            let route_key = format!("{} {}", method, spec.path);
            let mut properties = Map::new();
            properties.insert("ApiId".into(), api.api_id());
            properties.insert("RouteKey".into(), json!(route_key));
            properties.insert(
                "Target".into(),
                join("/", vec![json!("integrations"), reference(integration_id)]),
            );
            match authorizer_id {
                Some(auth) => {
                    properties.insert("AuthorizationType".into(), json!("CUSTOM"));
                    properties.insert("AuthorizerId".into(), reference(auth));
                }
                None => {
                    properties.insert("AuthorizationType".into(), json!("NONE"));
                }
            }
            stack.add_resource(
                &route_logical_id(&api.logical_id, *method, &spec.path),
                CfnResource::new("AWS::ApiGatewayV2::Route", Value::Object(properties)),
            )?;
            keys.push(route_key);
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssg023_api_with_stage_and_cors() {
        let mut stack = Stack::new("S", "s");
        let api = http_api(&mut stack, "AppHttpApi", "SsgAppApi", Some(Cors::permissive())).unwrap();
        assert_eq!(api.endpoint(), json!({"Fn::GetAtt": ["AppHttpApi", "ApiEndpoint"]}));
        let r = stack.resource("AppHttpApi").unwrap();
        assert_eq!(r.properties["ProtocolType"], "HTTP");
        assert_eq!(r.properties["CorsConfiguration"]["AllowOrigins"][0], "*");
        let stage = stack.resource("AppHttpApiDefaultStage").unwrap();
        assert_eq!(stage.properties["StageName"], "$default");
    }

    #[test]
    fn test_ssg023_routes_with_authorizer() {
        let mut stack = Stack::new("S", "s");
        let api = http_api(&mut stack, "Api", "Api", None).unwrap();
        let integration = lambda_integration(&mut stack, &api, "JobIntegration", json!("arn:fn")).unwrap();
        let auth = lambda_authorizer(&mut stack, &api, "JobAuthorizer", json!("arn:auth")).unwrap();
        let keys = add_routes(
            &mut stack,
            &api,
            &[
                RouteSpec::new("/api/job", &[HttpMethod::Get, HttpMethod::Post]),
                RouteSpec::new("/api/job/{id}", &[HttpMethod::Delete]),
            ],
            &integration,
            Some(&auth),
        )
        .unwrap();
        assert_eq!(keys, vec!["GET /api/job", "POST /api/job", "DELETE /api/job/{id}"]);

        let route = stack.resource("ApiDELETEapijobid").unwrap();
        assert_eq!(route.properties["AuthorizationType"], "CUSTOM");
        assert_eq!(route.properties["AuthorizerId"], json!({"Ref": "JobAuthorizer"}));

        let authorizer = stack.resource("JobAuthorizer").unwrap();
        assert_eq!(authorizer.properties["AuthorizerType"], "REQUEST");
        assert_eq!(authorizer.properties["EnableSimpleResponses"], true);
        assert_eq!(
            authorizer.properties["IdentitySource"][0],
            "$request.header.Authorization"
        );
        assert_eq!(stack.resources_of_type("AWS::Lambda::Permission").count(), 2);
    }

    #[test]
    fn test_ssg023_open_route() {
        let mut stack = Stack::new("S", "s");
        let api = http_api(&mut stack, "Gw", "LambdaGateway", None).unwrap();
        let integration = lambda_integration(&mut stack, &api, "HookIntegration", json!("arn:fn")).unwrap();
        add_routes(
            &mut stack,
            &api,
            &[RouteSpec::new("/api/stripe-hook", &[HttpMethod::Any])],
            &integration,
            None,
        )
        .unwrap();
        let route = stack.resource("GwANYapistripehook").unwrap();
        assert_eq!(route.properties["RouteKey"], "ANY /api/stripe-hook");
        assert_eq!(route.properties["AuthorizationType"], "NONE");
        assert!(route.properties.get("AuthorizerId").is_none());
    }

    #[test]
    fn test_ssg023_relative_path_rejected() {
        let mut stack = Stack::new("S", "s");
        let api = http_api(&mut stack, "Gw", "Gw", None).unwrap();
        let err = add_routes(
            &mut stack,
            &api,
            &[RouteSpec::new("api/job", &[HttpMethod::Get])],
            "I",
            None,
        )
        .unwrap_err();
        assert!(err.contains("must start with '/'"));
    }
}
