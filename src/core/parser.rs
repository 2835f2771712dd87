//! SSG-005: Context file parsing and validation.
//!
//! Parses ssg.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - App and stage names must be valid stack-name prefixes
//! - Context keys must be known tunables or environment-scoped blocks of them

use super::settings::TUNABLE_KEYS;
use super::types::*;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Letters, digits and '-', starting with a letter.
pub fn is_valid_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,63}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Parse an ssg.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<SynthConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse an ssg.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<SynthConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &SynthConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", config.version),
        });
    }

    if !is_valid_name(&config.app) {
        errors.push(ValidationError {
            message: format!(
                "app name '{}' must start with a letter and contain only letters, digits and '-'",
                config.app
            ),
        });
    }

    if let Some(stage) = &config.stage {
        if !is_valid_name(stage) {
            errors.push(ValidationError {
                message: format!(
                    "stage '{}' must start with a letter and contain only letters, digits and '-'",
                    stage
                ),
            });
        }
    }

    for (key, value) in &config.context {
        if TUNABLE_KEYS.contains(&key.as_str()) {
            continue;
        }
        match value.as_mapping() {
            Some(block) => {
                for scoped in block.keys() {
                    let name = yaml_value_to_string(scoped);
                    if !TUNABLE_KEYS.contains(&name.as_str()) {
                        errors.push(ValidationError {
                            message: format!(
                                "context block '{}' sets unknown key '{}'",
                                key, name
                            ),
                        });
                    }
                }
            }
            None => errors.push(ValidationError {
                message: format!("unknown context key '{}'", key),
            }),
        }
    }

    errors
}

/// JSON Schema for ssg.yaml.
pub fn config_schema() -> Result<String, String> {
    let schema = schemars::schema_for!(SynthConfig);
    serde_json::to_string_pretty(&schema).map_err(|e| format!("schema error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssg005_parse_valid() {
        let yaml = r#"
version: "1.0"
app: SSG-Stack
context:
  lambdaMemorySize: 512
  prod:
    lambdaMemorySize: 2048
    removalPolicy: RETAIN
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.app, "SSG-Stack");
        let errors = validate_config(&config);
        assert!(
            errors.is_empty(),
            "unexpected errors: {:?}",
            errors.iter().map(|e| &e.message).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_ssg005_bad_version() {
        let config = parse_config("version: \"2.0\"").unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("version")));
    }

    #[test]
    fn test_ssg005_bad_app_name() {
        let config = parse_config("version: \"1.0\"\napp: 1-bad_name").unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("app name")));
    }

    #[test]
    fn test_ssg005_bad_stage_name() {
        let config = parse_config("version: \"1.0\"\nstage: \"prod stage\"").unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("stage")));
    }

    #[test]
    fn test_ssg005_unknown_context_key() {
        let config = parse_config("version: \"1.0\"\ncontext:\n  lambdaMemory: 512").unwrap();
        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| e.message.contains("unknown context key 'lambdaMemory'")));
    }

    #[test]
    fn test_ssg005_unknown_scoped_key() {
        let yaml = r#"
version: "1.0"
context:
  prod:
    lambdaMemorySize: 2048
    typo: 1
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'prod'"));
        assert!(errors[0].message.contains("'typo'"));
    }

    #[test]
    fn test_ssg005_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssg.yaml");
        std::fs::write(&path, "version: \"1.0\"\napp: File-Test\n").unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.app, "File-Test");
    }

    #[test]
    fn test_ssg005_parse_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_config_file(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn test_ssg005_parse_invalid_yaml() {
        let result = parse_config("not: [valid: yaml: {{");
        assert!(result.is_err());
    }

    #[test]
    fn test_ssg005_schema_mentions_fields() {
        let schema = config_schema().unwrap();
        assert!(schema.contains("\"version\""));
        assert!(schema.contains("\"context\""));
        assert!(schema.contains("\"stage\""));
    }
}
