//! SSG-008: Manifest load and atomic save.

use super::types::{App, Manifest, StackEntry};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.yaml";
pub const MANIFEST_SCHEMA: &str = "1.0";

/// Derive the manifest path within an output directory.
pub fn manifest_path(out_dir: &Path) -> PathBuf {
    out_dir.join(MANIFEST_FILE)
}

/// Template file name for a stack, relative to the output directory.
pub fn template_file_name(stack: &str) -> String {
    format!("{}.template.json", stack)
}

/// Load the manifest of an output directory. Returns None if there is none yet.
pub fn load_manifest(out_dir: &Path) -> Result<Option<Manifest>, String> {
    let path = manifest_path(out_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let manifest: Manifest = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid manifest {}: {}", path.display(), e))?;
    Ok(Some(manifest))
}

/// Write a file atomically (write to a sibling temp file, then rename).
pub fn write_atomic(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("cannot rename {} to {}: {}", tmp_path.display(), path.display(), e))
}

/// Save the manifest atomically.
pub fn save_manifest(out_dir: &Path, manifest: &Manifest) -> Result<(), String> {
    let yaml =
        serde_yaml_ng::to_string(manifest).map_err(|e| format!("serialize error: {}", e))?;
    write_atomic(&manifest_path(out_dir), &yaml)
}

/// Create an empty manifest for an app.
pub fn new_manifest(app: &App, order: &[String]) -> Manifest {
    use crate::tripwire::eventlog::now_iso8601;
    Manifest {
        schema: MANIFEST_SCHEMA.to_string(),
        app: app.name.clone(),
        stage: app.stage.clone(),
        environment: app.environment.clone(),
        generated_at: now_iso8601(),
        generator: format!("ssg-infra {}", env!("CARGO_PKG_VERSION")),
        order: order.to_vec(),
        stacks: IndexMap::new(),
    }
}

/// Manifest entry for a stack whose template rendered to `hash`.
pub fn stack_entry(app: &App, name: &str, hash: &str) -> Result<StackEntry, String> {
    let stack = app
        .stack(name)
        .ok_or_else(|| format!("unknown stack '{}'", name))?;
    Ok(StackEntry {
        template_file: template_file_name(name),
        hash: hash.to_string(),
        dependencies: stack.dependencies.clone(),
        tags: stack.tags.clone(),
        resources: stack.resource_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Stack;

    fn make_app() -> App {
        let mut app = App::new("SSG-Stack", None, "dev");
        let mut topic = Stack::new("SsgStripeTopicStack", "topic");
        topic.add_tag("Project", "ScanSafeGuard");
        app.add_stack(topic).unwrap();
        let mut queue = Stack::new("SsgStripeQueueStack", "queue");
        queue.add_dependency("SsgStripeTopicStack");
        app.add_stack(queue).unwrap();
        app
    }

    fn make_manifest(app: &App) -> Manifest {
        let order = vec![
            "SsgStripeTopicStack".to_string(),
            "SsgStripeQueueStack".to_string(),
        ];
        let mut manifest = new_manifest(app, &order);
        for name in &order {
            let entry = stack_entry(app, name, "blake3:abc123").unwrap();
            manifest.stacks.insert(name.clone(), entry);
        }
        manifest
    }

    #[test]
    fn test_ssg008_manifest_path() {
        let p = manifest_path(Path::new("/out"));
        assert_eq!(p, PathBuf::from("/out/manifest.yaml"));
        assert_eq!(template_file_name("SsgVpc"), "SsgVpc.template.json");
    }

    #[test]
    fn test_ssg008_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app();
        save_manifest(dir.path(), &make_manifest(&app)).unwrap();

        let loaded = load_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.app, "SSG-Stack");
        assert_eq!(loaded.environment, "dev");
        assert_eq!(loaded.stacks.len(), 2);
        let queue = &loaded.stacks["SsgStripeQueueStack"];
        assert_eq!(queue.dependencies, vec!["SsgStripeTopicStack"]);
        assert_eq!(queue.template_file, "SsgStripeQueueStack.template.json");
        assert_eq!(loaded.stacks["SsgStripeTopicStack"].tags["Project"], "ScanSafeGuard");
    }

    #[test]
    fn test_ssg008_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifest(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_ssg008_load_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(manifest_path(dir.path()), "stacks: [not, a, map").unwrap();
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(err.contains("invalid manifest"));
    }

    #[test]
    fn test_ssg008_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cdk.out");
        let app = make_app();
        save_manifest(&out, &make_manifest(&app)).unwrap();

        assert!(!out.join("manifest.yaml.tmp").exists());
        assert!(manifest_path(&out).exists());
    }

    #[test]
    fn test_ssg008_new_manifest() {
        let app = App::new("SSG-Stack", Some("Prod"), "prod");
        let m = new_manifest(&app, &[]);
        assert_eq!(m.stage.as_deref(), Some("Prod"));
        assert!(m.generated_at.contains('T'));
        assert!(m.generator.starts_with("ssg-infra "));
        assert!(m.stacks.is_empty());
    }

    #[test]
    fn test_ssg008_roundtrip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app();
        let mut manifest = make_manifest(&app);
        let first = manifest.stacks.shift_remove("SsgStripeTopicStack").unwrap();
        manifest.stacks.insert("SsgStripeTopicStack".to_string(), first);
        save_manifest(dir.path(), &manifest).unwrap();
        let loaded = load_manifest(dir.path()).unwrap().unwrap();
        let keys: Vec<_> = loaded.stacks.keys().collect();
        assert_eq!(keys, vec!["SsgStripeQueueStack", "SsgStripeTopicStack"]);
    }

    #[test]
    fn test_ssg008_unknown_stack_entry() {
        let app = make_app();
        assert!(stack_entry(&app, "SsgGhost", "blake3:x").is_err());
    }
}
