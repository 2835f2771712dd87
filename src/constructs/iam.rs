//! SSG-020: IAM roles, policy statements, and inline policies.

use crate::core::intrinsic::{get_att, managed_policy_arn, reference, sub};
use crate::core::types::{CfnResource, Stack};
use serde_json::{json, Map, Value};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

/// One statement of an IAM policy document.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principal: Option<Value>,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub conditions: Map<String, Value>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            principal: None,
            actions: Vec::new(),
            resources: Vec::new(),
            conditions: Map::new(),
        }
    }

    pub fn sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }

    pub fn actions(mut self, actions: &[&str]) -> Self {
        self.actions.extend(actions.iter().map(|a| a.to_string()));
        self
    }

    pub fn resource(mut self, resource: Value) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn resources(mut self, resources: impl IntoIterator<Item = Value>) -> Self {
        self.resources.extend(resources);
        self
    }

    pub fn principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Add `operator: { key: value }` to the condition block.
    pub fn condition(mut self, operator: &str, key: &str, value: Value) -> Self {
        let entry = self
            .conditions
            .entry(operator.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(m) = entry {
            m.insert(key.to_string(), value);
        }
        self
    }

    pub fn to_json(&self) -> Value {
        let mut m = Map::new();
        if let Some(sid) = &self.sid {
            m.insert("Sid".into(), json!(sid));
        }
        m.insert("Effect".into(), json!(self.effect.as_str()));
        if let Some(p) = &self.principal {
            m.insert("Principal".into(), p.clone());
        }
        m.insert("Action".into(), collapse(self.actions.iter().map(|a| json!(a)).collect()));
        if !self.resources.is_empty() {
            m.insert("Resource".into(), collapse(self.resources.clone()));
        }
        if !self.conditions.is_empty() {
            m.insert("Condition".into(), Value::Object(self.conditions.clone()));
        }
        Value::Object(m)
    }
}

/// Single-element lists are written as scalars.
fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
    })
}

pub fn service_principal(service: &str) -> Value {
    json!({ "Service": service })
}

pub fn account_root_principal() -> Value {
    json!({ "AWS": sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:root") })
}

pub fn federated_principal(provider_arn: Value) -> Value {
    json!({ "Federated": provider_arn })
}

/// Trust statement letting `principal` assume the role.
pub fn assumed_by(principal: Value) -> PolicyStatement {
    PolicyStatement::allow()
        .principal(principal)
        .actions(&["sts:AssumeRole"])
}

/// ARN of an AWS-managed policy such as `service-role/AWSLambdaBasicExecutionRole`.
pub fn aws_managed_policy(name: &str) -> Value {
    managed_policy_arn(name)
}

/// Handle to a role declared in some stack.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleHandle {
    pub logical_id: String,
    pub role_name: Option<String>,

    /// Logical id of `<Role>DefaultPolicy`, when the role has statements
    pub default_policy: Option<String>,
}

impl RoleHandle {
    pub fn arn(&self) -> Value {
        get_att(&self.logical_id, "Arn")
    }

    pub fn name(&self) -> Value {
        reference(&self.logical_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleProps {
    pub role_name: Option<String>,
    pub description: Option<String>,
    pub trust: Vec<PolicyStatement>,
    pub managed_policies: Vec<Value>,

    /// Written to `<Role>DefaultPolicy` when non-empty
    pub statements: Vec<PolicyStatement>,

    pub max_session_duration: Option<u32>,
}

/// Declare a role, plus its default inline policy when it has statements.
pub fn role(stack: &mut Stack, logical_id: &str, props: RoleProps) -> Result<RoleHandle, String> {
    if props.trust.is_empty() {
        return Err(format!("role '{}' has no trust statements", logical_id));
    }
    let mut properties = Map::new();
    properties.insert(
        "AssumeRolePolicyDocument".into(),
        policy_document(&props.trust),
    );
    if let Some(name) = &props.role_name {
        properties.insert("RoleName".into(), json!(name));
    }
    if let Some(desc) = &props.description {
        properties.insert("Description".into(), json!(desc));
    }
    if !props.managed_policies.is_empty() {
        properties.insert(
            "ManagedPolicyArns".into(),
            Value::Array(props.managed_policies.clone()),
        );
    }
    if let Some(secs) = props.max_session_duration {
        properties.insert("MaxSessionDuration".into(), json!(secs));
    }
    stack.add_resource(
        logical_id,
        CfnResource::new("AWS::IAM::Role", Value::Object(properties)),
    )?;

    let mut handle = RoleHandle {
        logical_id: logical_id.to_string(),
        role_name: props.role_name,
        default_policy: None,
    };
    if !props.statements.is_empty() {
        let policy_id = format!("{}DefaultPolicy", logical_id);
        attach_policy(stack, &policy_id, &[handle.name()], &props.statements)?;
        handle.default_policy = Some(policy_id);
    }
    Ok(handle)
}

/// Declare an `AWS::IAM::Policy` attached to the given role names.
pub fn attach_policy(
    stack: &mut Stack,
    logical_id: &str,
    roles: &[Value],
    statements: &[PolicyStatement],
) -> Result<(), String> {
    if statements.is_empty() {
        return Err(format!("policy '{}' has no statements", logical_id));
    }
    stack.add_resource(
        logical_id,
        CfnResource::new(
            "AWS::IAM::Policy",
            json!({
                "PolicyName": logical_id,
                "PolicyDocument": policy_document(statements),
                "Roles": roles,
            }),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssg020_statement_json() {
        let s = PolicyStatement::allow()
            .sid("AllowPublish")
            .actions(&["sns:Publish"])
            .resource(reference("Topic"));
        let v = s.to_json();
        assert_eq!(v["Sid"], "AllowPublish");
        assert_eq!(v["Effect"], "Allow");
        assert_eq!(v["Action"], "sns:Publish");
        assert_eq!(v["Resource"], json!({"Ref": "Topic"}));
        assert!(v.get("Condition").is_none());
    }

    #[test]
    fn test_ssg020_statement_multiple_actions_and_conditions() {
        let v = PolicyStatement::allow()
            .actions(&["sqs:SendMessage", "sqs:GetQueueUrl"])
            .resource(json!("*"))
            .condition("ArnEquals", "aws:SourceArn", json!("arn:topic"))
            .condition("StringEquals", "aws:SourceAccount", json!("123"))
            .to_json();
        assert_eq!(v["Action"].as_array().unwrap().len(), 2);
        assert_eq!(v["Condition"]["ArnEquals"]["aws:SourceArn"], "arn:topic");
        assert_eq!(v["Condition"]["StringEquals"]["aws:SourceAccount"], "123");
    }

    #[test]
    fn test_ssg020_role_with_default_policy() {
        let mut stack = Stack::new("S", "s");
        let handle = role(
            &mut stack,
            "ExecRole",
            RoleProps {
                role_name: Some("exec-role".into()),
                trust: vec![assumed_by(service_principal("lambda.amazonaws.com"))],
                managed_policies: vec![aws_managed_policy(
                    "service-role/AWSLambdaBasicExecutionRole",
                )],
                statements: vec![PolicyStatement::allow()
                    .actions(&["ssm:GetParameter"])
                    .resource(json!("*"))],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(handle.arn(), json!({"Fn::GetAtt": ["ExecRole", "Arn"]}));
        assert_eq!(handle.default_policy.as_deref(), Some("ExecRoleDefaultPolicy"));

        let r = stack.resource("ExecRole").unwrap();
        assert_eq!(r.resource_type, "AWS::IAM::Role");
        assert_eq!(r.properties["RoleName"], "exec-role");
        assert_eq!(
            r.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            "lambda.amazonaws.com"
        );

        let p = stack.resource("ExecRoleDefaultPolicy").unwrap();
        assert_eq!(p.resource_type, "AWS::IAM::Policy");
        assert_eq!(p.properties["Roles"][0], json!({"Ref": "ExecRole"}));
    }

    #[test]
    fn test_ssg020_role_without_statements_has_no_policy() {
        let mut stack = Stack::new("S", "s");
        let handle = role(
            &mut stack,
            "Bare",
            RoleProps {
                trust: vec![assumed_by(service_principal("batch.amazonaws.com"))],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(stack.resource_count(), 1);
        assert!(handle.default_policy.is_none());
    }

    #[test]
    fn test_ssg020_role_requires_trust() {
        let mut stack = Stack::new("S", "s");
        assert!(role(&mut stack, "NoTrust", RoleProps::default()).is_err());
        assert_eq!(stack.resource_count(), 0);
    }

    #[test]
    fn test_ssg020_attach_policy_requires_statements() {
        let mut stack = Stack::new("S", "s");
        assert!(attach_policy(&mut stack, "Empty", &[json!("r")], &[]).is_err());
    }
}
