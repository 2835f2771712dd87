//! SSG-014: BLAKE3 hashing for rendered templates and files on disk.
//!
//! Every hash is written as `blake3:<hex>` so manifests stay self-describing.

use std::path::Path;

const PREFIX: &str = "blake3:";

fn tagged(hash: blake3::Hash) -> String {
    format!("{}{}", PREFIX, hash.to_hex())
}

/// Hash a file's contents, streamed.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| format!("read error {}: {}", path.display(), e))?;
    Ok(tagged(hasher.finalize()))
}

/// Hash a rendered template body.
pub fn hash_string(s: &str) -> String {
    tagged(blake3::hash(s.as_bytes()))
}

/// Fingerprint of a whole synthesis from `(stack, template hash)` pairs.
/// Sensitive to order, so callers pass deployment order.
pub fn fingerprint<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = blake3::Hasher::new();
    for (stack, hash) in entries {
        hasher.update(stack.as_bytes());
        hasher.update(b"=");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    tagged(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssg014_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SsgVpc.template.json");
        std::fs::write(&path, "{\"Resources\":{}}").unwrap();
        let h = hash_file(&path).unwrap();
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
    }

    #[test]
    fn test_ssg014_file_and_string_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let body = "x".repeat(200_000);
        std::fs::write(&path, &body).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_string(&body));
    }

    #[test]
    fn test_ssg014_hash_string() {
        assert_eq!(hash_string("{}"), hash_string("{}"));
        assert_ne!(hash_string("{}"), hash_string("{ }"));
    }

    #[test]
    fn test_ssg014_fingerprint_order_and_names() {
        let a = fingerprint([("SsgVpc", "blake3:aaa"), ("SsgBatch", "blake3:bbb")]);
        let b = fingerprint([("SsgBatch", "blake3:bbb"), ("SsgVpc", "blake3:aaa")]);
        let c = fingerprint([("SsgVpc", "blake3:bbb"), ("SsgBatch", "blake3:aaa")]);
        assert!(a.starts_with("blake3:"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ssg014_hash_file_not_found() {
        let err = hash_file(Path::new("/nonexistent/template.json")).unwrap_err();
        assert!(err.contains("cannot open"));
    }
}
