//! SSG-002: CloudFormation intrinsic function helpers.
//!
//! Small constructors for `Ref`, `Fn::GetAtt`, `Fn::Sub` and friends so stack
//! builders never spell the JSON shapes out by hand.

use serde_json::{json, Value};

pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// `Fn::Sub` with only pseudo-parameter / logical-id substitution.
pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// `Fn::Sub` with an explicit variable map.
pub fn sub_with(template: &str, vars: Value) -> Value {
    json!({ "Fn::Sub": [template, vars] })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index.to_string(), list] })
}

pub fn split(delimiter: &str, source: Value) -> Value {
    json!({ "Fn::Split": [delimiter, source] })
}

/// Availability zones of the deployment region.
pub fn get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

pub fn account_id() -> Value {
    reference("AWS::AccountId")
}

pub fn region() -> Value {
    reference("AWS::Region")
}

/// ARN of an AWS-managed IAM policy, partition-aware.
pub fn managed_policy_arn(path_and_name: &str) -> Value {
    sub(&format!("arn:${{AWS::Partition}}:iam::aws:policy/{}", path_and_name))
}

/// One `{Key, Value}` entry of a list-style `Tags` property.
pub fn tag(key: &str, value: &str) -> Value {
    json!({ "Key": key, "Value": value })
}
