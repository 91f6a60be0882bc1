//! Static system context loaded from the manifest file.

use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// Read the manifest, trimmed.
///
/// A missing manifest falls back to `fallback`; any other read failure
/// yields an empty context. Both cases are logged.
pub fn load_system_context(manifest: &Path, fallback: &str) -> String {
    match std::fs::read_to_string(manifest) {
        Ok(text) => text.trim().to_string(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(manifest = %manifest.display(), "manifest not found, using basic context");
            fallback.to_string()
        }
        Err(e) => {
            warn!(manifest = %manifest.display(), error = %e, "could not load manifest");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_is_trimmed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("context.md");
        std::fs::write(&path, "\n  You support the billing app.\n\n").unwrap();
        assert_eq!(load_system_context(&path, "fallback"), "You support the billing app.");
    }

    #[test]
    fn test_missing_manifest_uses_fallback() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("context.md");
        assert_eq!(load_system_context(&path, "fallback"), "fallback");
    }

    #[test]
    fn test_unreadable_manifest_is_empty() {
        let tmp = TempDir::new().unwrap();
        // A directory cannot be read as a file.
        assert_eq!(load_system_context(tmp.path(), "fallback"), "");
    }
}
