//! SSG-003: Context settings resolution.
//!
//! Every tunable is resolved in a fixed order: the block named after the
//! deployment environment, then the top-level (global) context value, then
//! the hard-coded default. A value that exists but has the wrong type is an
//! error rather than a silent fallback.

use super::types::{RemovalPolicy, RetentionDays};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml_ng::Value;

/// Every context key with a hard-coded default.
pub const TUNABLE_KEYS: &[&str] = &[
    "env",
    "lambdaMemorySize",
    "lambdaTimeout",
    "queueRetentionPeriod",
    "logRetentionPeriod",
    "removalPolicy",
    "visibilityTimeout",
    "maxReceiveCount",
    "deadLetterQueueMaxReceiveCount",
    "deadLetterQueueVisibilityTimeout",
    "lambdaAlarmEvaluationPeriod",
    "lambdaAlarmThreshold",
    "lambdaAlarmActionsEnabled",
    "lambdaAlarmNamespace",
    "lambdaAlarmPeriod",
    "queueAlarmEvaluationPeriod",
    "queueAlarmThreshold",
    "queueAlarmNamespace",
    "queueAlarmPeriod",
    "queueAlarmActionsEnabled",
];

/// Context source for a synthesis run.
#[derive(Debug, Clone)]
pub struct Settings {
    environment: String,
    context: IndexMap<String, Value>,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Environment,
    Global,
    Default,
}

impl std::fmt::Display for SettingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::Global => write!(f, "global"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl Settings {
    pub fn new(environment: &str, context: &IndexMap<String, Value>) -> Self {
        Self {
            environment: environment.to_string(),
            context: context.clone(),
        }
    }

    /// Deployment environment whose block takes precedence.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Raw lookup: environment block first, then global.
    pub fn lookup(&self, key: &str) -> Option<(&Value, SettingSource)> {
        let scoped = self
            .context
            .get(&self.environment)
            .and_then(Value::as_mapping)
            .and_then(|m| m.get(key));
        if let Some(v) = scoped {
            return Some((v, SettingSource::Environment));
        }
        self.context.get(key).map(|v| (v, SettingSource::Global))
    }

    /// Resolve a typed value, falling back to `default` when unset.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, String> {
        match self.lookup(key) {
            Some((value, source)) => serde_yaml_ng::from_value(value.clone()).map_err(|e| {
                format!(
                    "context value '{}' ({} scope, env '{}') has the wrong type: {}",
                    key, source, self.environment, e
                )
            }),
            None => Ok(default),
        }
    }

    pub fn source_of(&self, key: &str) -> SettingSource {
        self.lookup(key)
            .map(|(_, s)| s)
            .unwrap_or(SettingSource::Default)
    }

    pub fn env(&self) -> Result<String, String> {
        self.get("env", "preprod".to_string())
    }

    pub fn lambda_memory_size(&self) -> Result<u32, String> {
        let mb: u32 = self.get("lambdaMemorySize", 1024)?;
        if !(128..=10240).contains(&mb) {
            return Err(format!(
                "lambdaMemorySize must be between 128 and 10240 MiB, got {}",
                mb
            ));
        }
        Ok(mb)
    }

    /// Seconds.
    pub fn lambda_timeout(&self) -> Result<u32, String> {
        let secs: u32 = self.get("lambdaTimeout", 30)?;
        if !(1..=900).contains(&secs) {
            return Err(format!(
                "lambdaTimeout must be between 1 and 900 seconds, got {}",
                secs
            ));
        }
        Ok(secs)
    }

    /// Days.
    pub fn queue_retention_period(&self) -> Result<u32, String> {
        self.get("queueRetentionPeriod", 3)
    }

    pub fn log_retention_period(&self) -> Result<RetentionDays, String> {
        let name: String = self.get("logRetentionPeriod", "ONE_WEEK".to_string())?;
        RetentionDays::from_name(&name)
    }

    /// `DESTROY` maps to delete; any other string retains.
    pub fn removal_policy(&self) -> Result<RemovalPolicy, String> {
        let value: String = self.get("removalPolicy", "DESTROY".to_string())?;
        Ok(if value == "DESTROY" {
            RemovalPolicy::Destroy
        } else {
            RemovalPolicy::Retain
        })
    }

    pub fn visibility_timeout(&self) -> Result<u32, String> {
        self.get("visibilityTimeout", 60)
    }

    pub fn max_receive_count(&self) -> Result<u32, String> {
        positive("maxReceiveCount", self.get("maxReceiveCount", 5)?)
    }

    pub fn dead_letter_queue_max_receive_count(&self) -> Result<u32, String> {
        positive(
            "deadLetterQueueMaxReceiveCount",
            self.get("deadLetterQueueMaxReceiveCount", 5)?,
        )
    }

    pub fn dead_letter_queue_visibility_timeout(&self) -> Result<u32, String> {
        self.get("deadLetterQueueVisibilityTimeout", 60)
    }

    pub fn lambda_alarm(&self) -> Result<AlarmSettings, String> {
        Ok(AlarmSettings {
            evaluation_periods: self.get("lambdaAlarmEvaluationPeriod", 5)?,
            threshold: self.get("lambdaAlarmThreshold", 1000.0)?,
            actions_enabled: self.get("lambdaAlarmActionsEnabled", true)?,
            namespace: self.get("lambdaAlarmNamespace", "AWS/Lambda".to_string())?,
            period: self.get("lambdaAlarmPeriod", 60)?,
        })
    }

    pub fn queue_alarm(&self) -> Result<AlarmSettings, String> {
        Ok(AlarmSettings {
            evaluation_periods: self.get("queueAlarmEvaluationPeriod", 5)?,
            threshold: self.get("queueAlarmThreshold", 1000.0)?,
            actions_enabled: self.get("queueAlarmActionsEnabled", true)?,
            namespace: self.get("queueAlarmNamespace", "AWS/SQS".to_string())?,
            period: self.get("queueAlarmPeriod", 60)?,
        })
    }

    /// Resolve every tunable at once. Stack builders take the result.
    pub fn resolve(&self) -> Result<Tunables, String> {
        let tunables = Tunables {
            env: self.env()?,
            lambda_memory_size: self.lambda_memory_size()?,
            lambda_timeout: self.lambda_timeout()?,
            queue_retention_period: self.queue_retention_period()?,
            log_retention_period: self.log_retention_period()?,
            removal_policy: self.removal_policy()?,
            visibility_timeout: self.visibility_timeout()?,
            max_receive_count: self.max_receive_count()?,
            dead_letter_queue_max_receive_count: self.dead_letter_queue_max_receive_count()?,
            dead_letter_queue_visibility_timeout: self.dead_letter_queue_visibility_timeout()?,
            lambda_alarm: self.lambda_alarm()?,
            queue_alarm: self.queue_alarm()?,
        };
        tracing::debug!(environment = %self.environment, env = %tunables.env, "settings resolved");
        Ok(tunables)
    }

    /// Every tunable with its resolved value and source, in table order.
    pub fn describe(&self) -> Result<Vec<(String, String, SettingSource)>, String> {
        let t = self.resolve()?;
        let rows: Vec<(&str, String)> = vec![
            ("env", t.env.clone()),
            ("lambdaMemorySize", t.lambda_memory_size.to_string()),
            ("lambdaTimeout", format!("{}s", t.lambda_timeout)),
            ("queueRetentionPeriod", format!("{}d", t.queue_retention_period)),
            ("logRetentionPeriod", t.log_retention_period.to_string()),
            ("removalPolicy", t.removal_policy.to_string()),
            ("visibilityTimeout", format!("{}s", t.visibility_timeout)),
            ("maxReceiveCount", t.max_receive_count.to_string()),
            (
                "deadLetterQueueMaxReceiveCount",
                t.dead_letter_queue_max_receive_count.to_string(),
            ),
            (
                "deadLetterQueueVisibilityTimeout",
                format!("{}s", t.dead_letter_queue_visibility_timeout),
            ),
            (
                "lambdaAlarmEvaluationPeriod",
                t.lambda_alarm.evaluation_periods.to_string(),
            ),
            ("lambdaAlarmThreshold", t.lambda_alarm.threshold.to_string()),
            (
                "lambdaAlarmActionsEnabled",
                t.lambda_alarm.actions_enabled.to_string(),
            ),
            ("lambdaAlarmNamespace", t.lambda_alarm.namespace.clone()),
            ("lambdaAlarmPeriod", format!("{}s", t.lambda_alarm.period)),
            (
                "queueAlarmEvaluationPeriod",
                t.queue_alarm.evaluation_periods.to_string(),
            ),
            ("queueAlarmThreshold", t.queue_alarm.threshold.to_string()),
            ("queueAlarmNamespace", t.queue_alarm.namespace.clone()),
            ("queueAlarmPeriod", format!("{}s", t.queue_alarm.period)),
            (
                "queueAlarmActionsEnabled",
                t.queue_alarm.actions_enabled.to_string(),
            ),
        ];
        Ok(rows
            .into_iter()
            .map(|(k, v)| (k.to_string(), v, self.source_of(k)))
            .collect())
    }
}

fn positive(key: &str, value: u32) -> Result<u32, String> {
    if value == 0 {
        return Err(format!("{} must be greater than 0", key));
    }
    Ok(value)
}

/// Alarm tuning shared by Lambda and queue alarms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmSettings {
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub actions_enabled: bool,
    pub namespace: String,

    /// Seconds
    pub period: u32,
}

/// Fully resolved tunables for one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tunables {
    pub env: String,
    pub lambda_memory_size: u32,
    pub lambda_timeout: u32,
    pub queue_retention_period: u32,
    pub log_retention_period: RetentionDays,
    pub removal_policy: RemovalPolicy,
    pub visibility_timeout: u32,
    pub max_receive_count: u32,
    pub dead_letter_queue_max_receive_count: u32,
    pub dead_letter_queue_visibility_timeout: u32,
    pub lambda_alarm: AlarmSettings,
    pub queue_alarm: AlarmSettings,
}

impl Tunables {
    /// Alias suffix, e.g. `PREPROD`.
    pub fn alias_suffix(&self) -> String {
        self.env.to_uppercase()
    }
}

/// Tunables resolved from an empty context.
#[cfg(test)]
pub(crate) fn defaults() -> Tunables {
    Settings::new("dev", &IndexMap::new()).resolve().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn context(yaml: &str) -> IndexMap<String, Value> {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn test_ssg003_memory_default() {
        let s = Settings::new("dev", &IndexMap::new());
        assert_eq!(s.lambda_memory_size().unwrap(), 1024);
        assert_eq!(s.source_of("lambdaMemorySize"), SettingSource::Default);
    }

    #[test]
    fn test_ssg003_memory_global_override() {
        let s = Settings::new("dev", &context("lambdaMemorySize: 512"));
        assert_eq!(s.lambda_memory_size().unwrap(), 512);
        assert_eq!(s.source_of("lambdaMemorySize"), SettingSource::Global);
    }

    #[test]
    fn test_ssg003_memory_env_beats_global() {
        let ctx = context(
            r#"
lambdaMemorySize: 512
prod:
  lambdaMemorySize: 2048
"#,
        );
        let s = Settings::new("prod", &ctx);
        assert_eq!(s.lambda_memory_size().unwrap(), 2048);
        assert_eq!(s.source_of("lambdaMemorySize"), SettingSource::Environment);

        // Another environment only sees the global value
        let other = Settings::new("dev", &ctx);
        assert_eq!(other.lambda_memory_size().unwrap(), 512);
    }

    #[test]
    fn test_ssg003_all_defaults() {
        let t = defaults();
        assert_eq!(t.env, "preprod");
        assert_eq!(t.lambda_memory_size, 1024);
        assert_eq!(t.lambda_timeout, 30);
        assert_eq!(t.queue_retention_period, 3);
        assert_eq!(t.log_retention_period, RetentionDays::OneWeek);
        assert_eq!(t.removal_policy, RemovalPolicy::Destroy);
        assert_eq!(t.visibility_timeout, 60);
        assert_eq!(t.max_receive_count, 5);
        assert_eq!(t.dead_letter_queue_max_receive_count, 5);
        assert_eq!(t.dead_letter_queue_visibility_timeout, 60);
        assert_eq!(t.lambda_alarm.namespace, "AWS/Lambda");
        assert_eq!(t.lambda_alarm.period, 60);
        assert_eq!(t.lambda_alarm.threshold, 1000.0);
        assert!(t.lambda_alarm.actions_enabled);
        assert_eq!(t.queue_alarm.namespace, "AWS/SQS");
        assert_eq!(t.queue_alarm.evaluation_periods, 5);
        assert_eq!(t.alias_suffix(), "PREPROD");
    }

    #[test]
    fn test_ssg003_wrong_type_is_error() {
        let s = Settings::new("dev", &context("lambdaMemorySize: lots"));
        let err = s.lambda_memory_size().unwrap_err();
        assert!(err.contains("lambdaMemorySize"));
        assert!(err.contains("wrong type"));
    }

    #[test]
    fn test_ssg003_unknown_retention_is_error() {
        let s = Settings::new("dev", &context("logRetentionPeriod: TWO_DAYS"));
        assert!(s.log_retention_period().unwrap_err().contains("TWO_DAYS"));
    }

    #[test]
    fn test_ssg003_removal_policy_mapping() {
        let retain = Settings::new("dev", &context("removalPolicy: SNAPSHOT"));
        assert_eq!(retain.removal_policy().unwrap(), RemovalPolicy::Retain);
        let destroy = Settings::new("dev", &context("removalPolicy: DESTROY"));
        assert_eq!(destroy.removal_policy().unwrap(), RemovalPolicy::Destroy);
    }

    #[test]
    fn test_ssg003_zero_receive_count_rejected() {
        let s = Settings::new("dev", &context("maxReceiveCount: 0"));
        assert!(s.max_receive_count().is_err());
        assert!(s.resolve().is_err());
    }

    #[test]
    fn test_ssg003_memory_out_of_range() {
        let s = Settings::new("dev", &context("lambdaMemorySize: 64"));
        assert!(s.lambda_memory_size().is_err());
    }

    #[test]
    fn test_ssg003_non_mapping_env_block_ignored() {
        // A scalar under the environment name is not a scope block
        let s = Settings::new("dev", &context("dev: true\nlambdaTimeout: 45"));
        assert_eq!(s.lambda_timeout().unwrap(), 45);
    }

    #[test]
    fn test_ssg003_describe_lists_every_tunable() {
        let s = Settings::new("dev", &context("queueAlarmPeriod: 300"));
        let rows = s.describe().unwrap();
        assert_eq!(rows.len(), TUNABLE_KEYS.len());
        let keys: Vec<&str> = rows.iter().map(|r| r.0.as_str()).collect();
        assert_eq!(keys, TUNABLE_KEYS);
        let period = rows.iter().find(|r| r.0 == "queueAlarmPeriod").unwrap();
        assert_eq!(period.1, "300s");
        assert_eq!(period.2, SettingSource::Global);
    }

    proptest! {
        #[test]
        fn prop_resolution_order(
            global in proptest::option::of(1u32..100_000),
            scoped in proptest::option::of(1u32..100_000),
            default in 1u32..100_000,
        ) {
            let mut ctx = IndexMap::new();
            if let Some(g) = global {
                ctx.insert("visibilityTimeout".to_string(), Value::from(g));
            }
            if let Some(v) = scoped {
                let mut block = serde_yaml_ng::Mapping::new();
                block.insert(Value::from("visibilityTimeout"), Value::from(v));
                ctx.insert("staging".to_string(), Value::Mapping(block));
            }
            let s = Settings::new("staging", &ctx);
            let got: u32 = s.get("visibilityTimeout", default).unwrap();
            prop_assert_eq!(got, scoped.or(global).unwrap_or(default));
        }
    }
}
