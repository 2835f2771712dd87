//! SSG-001: Template, stack, and manifest types.
//!
//! Defines the CloudFormation template model emitted by synthesis, the
//! `Stack`/`App` containers that builders declare resources into, and the
//! manifest / plan / event types used by the CLI. Template types serialize
//! with CloudFormation's PascalCase keys.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// CloudFormation template format version written into every template.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

// ============================================================================
// Template
// ============================================================================

/// A CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resource declarations (order-preserving)
    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, CfnResource>,

    /// Stack outputs, optionally exported for cross-stack import
    #[serde(rename = "Outputs", default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description,
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResource {
    /// CloudFormation type, e.g. `AWS::SQS::Queue`
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
}

impl CfnResource {
    pub fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Apply a removal policy to both deletion and replacement.
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        if !self.depends_on.iter().any(|d| d == logical_id) {
            self.depends_on.push(logical_id.to_string());
        }
        self
    }

    /// Look up a top-level property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Merge stack tags into the resource's tag property, if its type takes
    /// one. Keys the resource already sets win.
    pub fn apply_tags(&mut self, tags: &IndexMap<String, String>) {
        if tags.is_empty() {
            return;
        }
        let Some((key, style)) = tag_property(&self.resource_type) else {
            return;
        };
        if self.properties.is_null() {
            self.properties = Value::Object(serde_json::Map::new());
        }
        let Some(properties) = self.properties.as_object_mut() else {
            return;
        };
        let slot = properties.entry(key).or_insert_with(|| match style {
            TagStyle::List => Value::Array(Vec::new()),
            TagStyle::Map => Value::Object(serde_json::Map::new()),
        });
        match slot {
            Value::Array(list) => {
                for (k, v) in tags {
                    if !list.iter().any(|t| t["Key"] == k.as_str()) {
                        list.push(super::intrinsic::tag(k, v));
                    }
                }
            }
            Value::Object(map) => {
                for (k, v) in tags {
                    map.entry(k.clone()).or_insert_with(|| Value::String(v.clone()));
                }
            }
            _ => {}
        }
    }
}

/// Shape of a resource type's tag property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagStyle {
    /// `[{Key, Value}]`
    List,
    /// `{key: value}`
    Map,
}

/// Tag property name and shape for taggable resource types.
fn tag_property(resource_type: &str) -> Option<(&'static str, TagStyle)> {
    match resource_type {
        "AWS::SQS::Queue"
        | "AWS::SNS::Topic"
        | "AWS::Lambda::Function"
        | "AWS::IAM::Role"
        | "AWS::IAM::OIDCProvider"
        | "AWS::Logs::LogGroup"
        | "AWS::ECR::Repository"
        | "AWS::SecretsManager::Secret"
        | "AWS::CertificateManager::Certificate"
        | "AWS::CloudWatch::Alarm"
        | "AWS::EC2::VPC"
        | "AWS::EC2::Subnet"
        | "AWS::EC2::RouteTable"
        | "AWS::EC2::InternetGateway"
        | "AWS::EC2::NatGateway"
        | "AWS::EC2::EIP"
        | "AWS::EC2::SecurityGroup" => Some(("Tags", TagStyle::List)),
        "AWS::Route53::HostedZone" => Some(("HostedZoneTags", TagStyle::List)),
        "AWS::Batch::ComputeEnvironment"
        | "AWS::Batch::JobQueue"
        | "AWS::Batch::JobDefinition"
        | "AWS::Batch::SchedulingPolicy"
        | "AWS::SSM::Parameter"
        | "AWS::ApiGatewayV2::Api"
        | "AWS::ApiGatewayV2::Stage" => Some(("Tags", TagStyle::Map)),
        _ => None,
    }
}

/// A template output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportName>,
}

/// `Export: { Name: ... }` block of an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportName {
    pub name: String,
}

/// What happens to a resource when it leaves the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[default]
    #[serde(rename = "Delete")]
    Destroy,
    Retain,
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroy => write!(f, "DESTROY"),
            Self::Retain => write!(f, "RETAIN"),
        }
    }
}

/// Log retention presets accepted by `logRetentionPeriod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionDays {
    OneWeek,
    ThreeMonths,
    SixMonths,
    OneYear,
    FiveYears,
}

impl RetentionDays {
    /// Parse a preset name such as `ONE_WEEK`.
    pub fn from_name(name: &str) -> Result<Self, String> {
        match name {
            "ONE_WEEK" => Ok(Self::OneWeek),
            "THREE_MONTHS" => Ok(Self::ThreeMonths),
            "SIX_MONTHS" => Ok(Self::SixMonths),
            "ONE_YEAR" => Ok(Self::OneYear),
            "FIVE_YEARS" => Ok(Self::FiveYears),
            other => Err(format!(
                "unknown log retention '{}' (expected ONE_WEEK, THREE_MONTHS, SIX_MONTHS, ONE_YEAR or FIVE_YEARS)",
                other
            )),
        }
    }

    /// Number of days CloudWatch Logs keeps events.
    pub fn days(self) -> u32 {
        match self {
            Self::OneWeek => 7,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::OneYear => 365,
            Self::FiveYears => 1827,
        }
    }
}

impl fmt::Display for RetentionDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneWeek => write!(f, "ONE_WEEK"),
            Self::ThreeMonths => write!(f, "THREE_MONTHS"),
            Self::SixMonths => write!(f, "SIX_MONTHS"),
            Self::OneYear => write!(f, "ONE_YEAR"),
            Self::FiveYears => write!(f, "FIVE_YEARS"),
        }
    }
}

// ============================================================================
// Stacks
// ============================================================================

/// Reference to an exported output of some stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportRef {
    /// Stack that declares the output
    pub stack: String,

    /// CloudFormation export name
    pub name: String,
}

/// A named, independently deployable bundle of declared resources.
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub tags: IndexMap<String, String>,

    /// Stacks that must be deployed before this one
    pub dependencies: Vec<String>,

    pub template: Template,
}

impl Stack {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: IndexMap::new(),
            dependencies: Vec::new(),
            template: Template::new(Some(description.to_string())),
        }
    }

    /// Declare a resource. Logical IDs are unique per stack.
    pub fn add_resource(&mut self, logical_id: &str, resource: CfnResource) -> Result<(), String> {
        if logical_id.is_empty() || !logical_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "stack '{}': logical id '{}' must be non-empty and alphanumeric",
                self.name, logical_id
            ));
        }
        if self.template.resources.contains_key(logical_id) {
            return Err(format!(
                "stack '{}' already declares resource '{}'",
                self.name, logical_id
            ));
        }
        tracing::trace!(stack = %self.name, logical_id, resource_type = %resource.resource_type, "declare resource");
        self.template
            .resources
            .insert(logical_id.to_string(), resource);
        Ok(())
    }

    /// Declare a plain (non-exported) output.
    pub fn add_output(&mut self, output_id: &str, value: Value) -> Result<(), String> {
        self.insert_output(output_id, value, None)
    }

    /// Declare an exported output and return a handle other stacks can import.
    pub fn export(
        &mut self,
        output_id: &str,
        value: Value,
        export_name: &str,
    ) -> Result<ExportRef, String> {
        self.insert_output(output_id, value, Some(export_name))?;
        Ok(ExportRef {
            stack: self.name.clone(),
            name: export_name.to_string(),
        })
    }

    fn insert_output(
        &mut self,
        output_id: &str,
        value: Value,
        export_name: Option<&str>,
    ) -> Result<(), String> {
        if self.template.outputs.contains_key(output_id) {
            return Err(format!(
                "stack '{}' already declares output '{}'",
                self.name, output_id
            ));
        }
        self.template.outputs.insert(
            output_id.to_string(),
            Output {
                value,
                description: None,
                export: export_name.map(|n| ExportName {
                    name: n.to_string(),
                }),
            },
        );
        Ok(())
    }

    /// Import another stack's export. Records the dependency edge.
    pub fn import(&mut self, export: &ExportRef) -> Value {
        self.add_dependency(&export.stack);
        super::intrinsic::import_value(&export.name)
    }

    /// Declare an explicit ordering edge. Self-edges and duplicates are ignored.
    pub fn add_dependency(&mut self, stack_name: &str) {
        if stack_name != self.name && !self.dependencies.iter().any(|d| d == stack_name) {
            self.dependencies.push(stack_name.to_string());
        }
    }

    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    /// Copy the stack's tags onto every taggable resource.
    pub fn propagate_tags(&mut self) {
        for resource in self.template.resources.values_mut() {
            resource.apply_tags(&self.tags);
        }
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.template.resources.get(logical_id)
    }

    /// All resources of a given CloudFormation type, in declaration order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a CfnResource)> + 'a {
        self.template
            .resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    pub fn resource_count(&self) -> usize {
        self.template.resources.len()
    }

    /// Export names declared by this stack.
    pub fn export_names(&self) -> Vec<&str> {
        self.template
            .outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.as_str()))
            .collect()
    }
}

/// The full set of stacks synthesized together.
#[derive(Debug, Clone)]
pub struct App {
    /// Root composition name, e.g. `SSG-Stack`
    pub name: String,

    /// Optional stage; prefixes every stack name
    pub stage: Option<String>,

    /// Deployment environment (`ENVIRONMENT`)
    pub environment: String,

    pub stacks: IndexMap<String, Stack>,
}

impl App {
    pub fn new(name: &str, stage: Option<&str>, environment: &str) -> Self {
        Self {
            name: name.to_string(),
            stage: stage.map(str::to_string),
            environment: environment.to_string(),
            stacks: IndexMap::new(),
        }
    }

    /// Fully-qualified stack name for a stack id (stage-prefixed when staged).
    pub fn stack_name(&self, id: &str) -> String {
        match &self.stage {
            Some(stage) => format!("{}-{}", stage, id),
            None => id.to_string(),
        }
    }

    /// Add a stack. Stack names and export names must be unique across the app.
    pub fn add_stack(&mut self, mut stack: Stack) -> Result<(), String> {
        if self.stacks.contains_key(&stack.name) {
            return Err(format!("duplicate stack '{}'", stack.name));
        }
        for export in stack.export_names() {
            if let Some(owner) = self.export_owner(export) {
                return Err(format!(
                    "export '{}' declared by both '{}' and '{}'",
                    export, owner, stack.name
                ));
            }
        }
        stack.propagate_tags();
        tracing::debug!(stack = %stack.name, resources = stack.resource_count(), "stack added");
        self.stacks.insert(stack.name.clone(), stack);
        Ok(())
    }

    /// Declare that `consumer` must be deployed after `producer`.
    pub fn add_dependency(&mut self, consumer: &str, producer: &str) -> Result<(), String> {
        if !self.stacks.contains_key(producer) {
            return Err(format!(
                "stack '{}' depends on unknown stack '{}'",
                consumer, producer
            ));
        }
        let stack = self
            .stacks
            .get_mut(consumer)
            .ok_or_else(|| format!("unknown stack '{}'", consumer))?;
        stack.add_dependency(producer);
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.get(name)
    }

    /// Which stack declares a given export.
    pub fn export_owner(&self, export_name: &str) -> Option<&str> {
        self.stacks
            .values()
            .find(|s| s.export_names().contains(&export_name))
            .map(|s| s.name.as_str())
    }

    pub fn resource_count(&self) -> usize {
        self.stacks.values().map(Stack::resource_count).sum()
    }
}

// ============================================================================
// Context file
// ============================================================================

/// Root of `ssg.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SynthConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Root composition name
    #[serde(default = "default_app_name")]
    pub app: String,

    /// Optional stage prefix for every stack name
    #[serde(default)]
    pub stage: Option<String>,

    /// Global tunables plus environment-scoped blocks
    #[serde(default)]
    #[schemars(with = "IndexMap<String, serde_json::Value>")]
    pub context: IndexMap<String, serde_yaml_ng::Value>,
}

pub const DEFAULT_APP_NAME: &str = "SSG-Stack";

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

// ============================================================================
// Manifest
// ============================================================================

/// Synthesis manifest written next to the templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version
    pub schema: String,

    pub app: String,

    #[serde(default)]
    pub stage: Option<String>,

    pub environment: String,

    /// When the manifest was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// Deployment order (stack names)
    pub order: Vec<String>,

    /// Per-stack entries
    pub stacks: IndexMap<String, StackEntry>,
}

/// Per-stack manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackEntry {
    /// Template file name relative to the output directory
    pub template_file: String,

    /// BLAKE3 hash of the rendered template
    pub hash: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub tags: IndexMap<String, String>,

    pub resources: usize,
}

// ============================================================================
// Plan
// ============================================================================

/// Action a deployment of a stack would take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned stack change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub stack: String,
    pub action: PlanAction,
    pub description: String,
}

/// Full synthesis plan.
#[derive(Debug, Clone)]
pub struct SynthPlan {
    pub app: String,
    pub changes: Vec<PlannedChange>,

    /// Deployment order (stack names)
    pub order: Vec<String>,

    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

// ============================================================================
// Synthesis events
// ============================================================================

/// Event for the JSONL synthesis log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SynthEvent {
    SynthStarted {
        app: String,
        run_id: String,
        generator_version: String,
    },
    StackSynthesized {
        stack: String,
        resources: usize,
        hash: String,
    },
    SynthCompleted {
        app: String,
        run_id: String,
        stacks: u32,
        resources: u32,
        total_seconds: f64,
    },
    DriftDetected {
        stack: String,
        expected_hash: String,
        actual_hash: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: SynthEvent,
}

/// Convert a serde_yaml_ng::Value to a display string.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

/// Collect resource counts per CloudFormation type (used by `status`).
pub fn count_by_type(stack: &Stack) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for r in stack.template.resources.values() {
        *counts.entry(r.resource_type.as_str()).or_insert(0) += 1;
    }
    counts
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ssg001_template_serializes_pascal_case() {
        let mut stack = Stack::new("Demo", "demo stack");
        stack
            .add_resource(
                "Queue",
                CfnResource::new("AWS::SQS::Queue", json!({"QueueName": "q"}))
                    .with_removal_policy(RemovalPolicy::Destroy),
            )
            .unwrap();
        let json = serde_json::to_value(&stack.template).unwrap();
        assert_eq!(json["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(json["Resources"]["Queue"]["Type"], "AWS::SQS::Queue");
        assert_eq!(json["Resources"]["Queue"]["DeletionPolicy"], "Delete");
        assert!(json["Resources"]["Queue"].get("DependsOn").is_none());
        assert!(json.get("Outputs").is_none());
    }

    #[test]
    fn test_ssg001_duplicate_logical_id_rejected() {
        let mut stack = Stack::new("Demo", "demo");
        let r = CfnResource::new("AWS::SNS::Topic", json!({}));
        stack.add_resource("Topic", r.clone()).unwrap();
        let err = stack.add_resource("Topic", r).unwrap_err();
        assert!(err.contains("already declares resource"));
    }

    #[test]
    fn test_ssg001_logical_id_must_be_alphanumeric() {
        let mut stack = Stack::new("Demo", "demo");
        let r = CfnResource::new("AWS::Events::Rule", json!({}));
        assert!(stack.add_resource("Batch-Rule", r.clone()).is_err());
        assert!(stack.add_resource("", r.clone()).is_err());
        assert!(stack.add_resource("BatchRule1", r).is_ok());
    }

    #[test]
    fn test_ssg001_export_and_import_records_dependency() {
        let mut producer = Stack::new("Producer", "p");
        let export = producer
            .export("VpcIdOut", json!({"Ref": "Vpc"}), "SSGVpcId")
            .unwrap();
        assert_eq!(export.stack, "Producer");
        assert_eq!(producer.export_names(), vec!["SSGVpcId"]);

        let mut consumer = Stack::new("Consumer", "c");
        let v = consumer.import(&export);
        assert_eq!(v, json!({"Fn::ImportValue": "SSGVpcId"}));
        assert_eq!(consumer.dependencies, vec!["Producer"]);

        // Importing twice doesn't duplicate the edge
        consumer.import(&export);
        assert_eq!(consumer.dependencies.len(), 1);
    }

    #[test]
    fn test_ssg001_self_dependency_ignored() {
        let mut s = Stack::new("Only", "o");
        s.add_dependency("Only");
        assert!(s.dependencies.is_empty());
    }

    #[test]
    fn test_ssg001_app_rejects_duplicate_exports() {
        let mut app = App::new("SSG-Stack", None, "dev");
        let mut a = Stack::new("A", "a");
        a.export("Out", json!("x"), "Shared").unwrap();
        let mut b = Stack::new("B", "b");
        b.export("Out", json!("y"), "Shared").unwrap();
        app.add_stack(a).unwrap();
        let err = app.add_stack(b).unwrap_err();
        assert!(err.contains("Shared"));
    }

    #[test]
    fn test_ssg001_app_dependency_unknown_producer() {
        let mut app = App::new("SSG-Stack", None, "dev");
        app.add_stack(Stack::new("A", "a")).unwrap();
        assert!(app.add_dependency("A", "Ghost").is_err());
        assert!(app.add_dependency("Ghost", "A").is_err());
    }

    #[test]
    fn test_ssg001_stage_prefixes_stack_names() {
        let staged = App::new("SSG-Stack", Some("Prod"), "prod");
        assert_eq!(staged.stack_name("SsgVpc"), "Prod-SsgVpc");
        let plain = App::new("SSG-Stack", None, "dev");
        assert_eq!(plain.stack_name("SsgVpc"), "SsgVpc");
    }

    #[test]
    fn test_ssg001_retention_days() {
        assert_eq!(RetentionDays::from_name("ONE_WEEK").unwrap().days(), 7);
        assert_eq!(RetentionDays::from_name("FIVE_YEARS").unwrap().days(), 1827);
        assert!(RetentionDays::from_name("FOREVER").is_err());
        assert_eq!(RetentionDays::SixMonths.to_string(), "SIX_MONTHS");
    }

    #[test]
    fn test_ssg001_plan_action_display() {
        assert_eq!(PlanAction::Create.to_string(), "CREATE");
        assert_eq!(PlanAction::NoOp.to_string(), "NO-OP");
    }

    #[test]
    fn test_ssg001_synth_event_serde() {
        let event = SynthEvent::SynthStarted {
            app: "SSG-Stack".to_string(),
            run_id: "r-abc".to_string(),
            generator_version: "0.4.0".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"synth_started\""));
        assert!(json.contains("\"run_id\":\"r-abc\""));
    }

    #[test]
    fn test_ssg001_manifest_yaml_roundtrip_preserves_order() {
        let mut stacks = IndexMap::new();
        for name in ["Zeta", "Alpha"] {
            stacks.insert(
                name.to_string(),
                StackEntry {
                    template_file: format!("{}.template.json", name),
                    hash: "blake3:abc".to_string(),
                    dependencies: vec![],
                    tags: IndexMap::new(),
                    resources: 1,
                },
            );
        }
        let manifest = Manifest {
            schema: "1.0".to_string(),
            app: "SSG-Stack".to_string(),
            stage: None,
            environment: "dev".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            generator: "ssg-infra 0.4.0".to_string(),
            order: vec!["Zeta".to_string(), "Alpha".to_string()],
            stacks,
        };
        let yaml = serde_yaml_ng::to_string(&manifest).unwrap();
        let back: Manifest = serde_yaml_ng::from_str(&yaml).unwrap();
        let keys: Vec<_> = back.stacks.keys().collect();
        assert_eq!(keys, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_ssg001_count_by_type() {
        let mut s = Stack::new("S", "s");
        s.add_resource("Q1", CfnResource::new("AWS::SQS::Queue", json!({})))
            .unwrap();
        s.add_resource("Q2", CfnResource::new("AWS::SQS::Queue", json!({})))
            .unwrap();
        s.add_resource("T", CfnResource::new("AWS::SNS::Topic", json!({})))
            .unwrap();
        let counts = count_by_type(&s);
        assert_eq!(counts["AWS::SQS::Queue"], 2);
        assert_eq!(counts["AWS::SNS::Topic"], 1);
    }

    #[test]
    fn test_ssg001_config_defaults() {
        let config: SynthConfig = serde_yaml_ng::from_str("version: \"1.0\"").unwrap();
        assert_eq!(config.app, "SSG-Stack");
        assert!(config.stage.is_none());
        assert!(config.context.is_empty());
    }

    #[test]
    fn test_ssg001_config_unknown_field_rejected() {
        let result: Result<SynthConfig, _> =
            serde_yaml_ng::from_str("version: \"1.0\"\nstacks: []");
        assert!(result.is_err());
    }

    #[test]
    fn test_ssg001_yaml_value_to_string() {
        assert_eq!(
            yaml_value_to_string(&serde_yaml_ng::Value::String("hello".into())),
            "hello"
        );
        assert_eq!(yaml_value_to_string(&serde_yaml_ng::Value::Bool(true)), "true");
        assert_eq!(yaml_value_to_string(&serde_yaml_ng::Value::Null), "");
    }

    #[test]
    fn test_ssg001_add_stack_propagates_tags() {
        let mut stack = Stack::new("Demo", "demo");
        stack
            .add_resource(
                "Queue",
                CfnResource::new(
                    "AWS::SQS::Queue",
                    json!({"Tags": [{"Key": "Owner", "Value": "payments"}]}),
                ),
            )
            .unwrap();
        stack
            .add_resource("Param", CfnResource::new("AWS::SSM::Parameter", json!({})))
            .unwrap();
        stack
            .add_resource("Perm", CfnResource::new("AWS::Lambda::Permission", json!({})))
            .unwrap();
        stack
            .add_resource("Role", CfnResource::new("AWS::IAM::Role", Value::Null))
            .unwrap();
        stack.add_tag("Project", "ScanSafeGuard");
        stack.add_tag("Owner", "platform");

        let mut app = App::new("SSG-Stack", None, "dev");
        app.add_stack(stack).unwrap();
        let stack = app.stack("Demo").unwrap();

        let queue_tags = &stack.resource("Queue").unwrap().properties["Tags"];
        assert_eq!(
            queue_tags,
            &json!([
                {"Key": "Owner", "Value": "payments"},
                {"Key": "Project", "Value": "ScanSafeGuard"}
            ])
        );
        assert_eq!(
            stack.resource("Param").unwrap().properties["Tags"],
            json!({"Project": "ScanSafeGuard", "Owner": "platform"})
        );
        assert!(stack.resource("Perm").unwrap().property("Tags").is_none());
        assert_eq!(
            stack.resource("Role").unwrap().properties["Tags"][0]["Key"],
            "Project"
        );
    }
}
