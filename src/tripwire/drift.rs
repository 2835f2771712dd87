//! SSG-016: Drift detection: compare synthesized templates on disk to manifest hashes.

use crate::core::types::Manifest;
use crate::tripwire::hasher;
use std::path::Path;

/// A single drift finding.
#[derive(Debug, Clone)]
pub struct DriftFinding {
    pub stack: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Check one template file against the hash recorded when it was written.
pub fn check_template_drift(stack: &str, path: &Path, expected_hash: &str) -> Option<DriftFinding> {
    if !path.exists() {
        return Some(DriftFinding {
            stack: stack.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: "MISSING".to_string(),
            detail: format!("{} does not exist", path.display()),
        });
    }

    let actual = hasher::hash_file(path).unwrap_or_else(|e| format!("ERROR:{}", e));
    if actual != expected_hash {
        Some(DriftFinding {
            stack: stack.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: actual,
            detail: format!("{} content changed", path.display()),
        })
    } else {
        None
    }
}

/// Check every template listed in a manifest, in deployment order.
pub fn detect_drift(out_dir: &Path, manifest: &Manifest) -> Vec<DriftFinding> {
    let mut findings = Vec::new();
    for (stack, entry) in &manifest.stacks {
        let path = out_dir.join(&entry.template_file);
        if let Some(finding) = check_template_drift(stack, &path, &entry.hash) {
            tracing::warn!(stack = %stack, detail = %finding.detail, "template drift");
            findings.push(finding);
        }
    }
    findings
}
