//! Path validation with symlink-aware workspace containment.
//!
//! Grounded in the reference agent's `execpolicy::ensure_within_workspace`:
//! canonicalize the allowed base once, then walk the candidate path one
//! component at a time, re-checking containment after resolving any
//! symlink encountered along the way so a symlink planted inside an
//! allowed base cannot be used to escape it.

use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};

use toolrunner_commons::RuntimeError;

const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone)]
pub struct PathValidationOutcome {
    pub resolved_path: PathBuf,
}

/// Symbols and well-known sensitive locations that are never acceptable,
/// regardless of the allowed-base configuration.
fn forbidden_patterns() -> &'static [&'static str] {
    &[
        "/proc/",
        "/sys/",
        "/dev/",
        "/etc/shadow",
        "/etc/passwd",
        ".ssh/id_rsa",
        ".ssh/id_ed25519",
        ".aws/credentials",
    ]
}

fn has_control_characters(s: &str) -> bool {
    s.chars().any(|c| (c as u32) <= 0x1F)
}

pub struct PathValidator {
    allowed_bases: Vec<PathBuf>,
}

impl PathValidator {
    pub fn new(allowed_bases: Vec<PathBuf>) -> Self {
        Self { allowed_bases }
    }

    /// Runs the five ordered checks from the component contract:
    /// non-empty/length, forbidden pattern, canonical resolution,
    /// allowed-base containment, existence (unless `allow_creation`).
    ///
    /// Containment is checked before existence: a path outside every
    /// allowed base is always a SECURITY rejection, never FILE_NOT_FOUND,
    /// even when it also happens not to exist. This resolves the
    /// check-order question left open by the abstract design: treating
    /// "escaped the sandbox" as strictly worse than "target missing" means
    /// callers never learn existence information about paths they aren't
    /// authorized to see.
    pub fn validate(&self, path: &str, allow_creation: bool) -> Result<PathValidationOutcome, RuntimeError> {
        if path.is_empty() || path.len() > MAX_PATH_LEN {
            return Err(RuntimeError::validation("path is empty or exceeds 4096 bytes"));
        }

        if has_control_characters(path) {
            return Err(RuntimeError::security("path contains control characters"));
        }
        if path.split('/').any(|seg| seg == "..") {
            return Err(RuntimeError::security("path contains parent-directory traversal"));
        }
        for pattern in forbidden_patterns() {
            if path.contains(pattern) {
                return Err(RuntimeError::security(format!("path matches forbidden pattern `{pattern}`")));
            }
        }

        let candidate = PathBuf::from(path).clean();
        let candidate = if candidate.is_relative() {
            std::env::current_dir()
                .map_err(|e| RuntimeError::internal(e.to_string()))?
                .join(candidate)
                .clean()
        } else {
            candidate
        };

        let base = self
            .allowed_bases
            .iter()
            .find(|base| self.ensure_within_base(base, &candidate).is_ok());

        let base = base.ok_or_else(|| {
            RuntimeError::security(format!(
                "path `{}` does not lie within any allowed base directory",
                candidate.display()
            ))
        })?;
        self.ensure_within_base(base, &candidate)?;

        if !allow_creation && !candidate.exists() {
            return Err(RuntimeError::file_not_found(candidate.display().to_string()));
        }

        Ok(PathValidationOutcome { resolved_path: candidate })
    }

    /// Component-by-component symlink-aware containment check, grounded in
    /// `ensure_within_workspace`: canonicalize the base, then grow the
    /// candidate one component at a time, canonicalizing and re-checking
    /// containment at any symlinked prefix.
    fn ensure_within_base(&self, base: &Path, candidate: &Path) -> Result<(), RuntimeError> {
        let canonical_base = base
            .canonicalize()
            .map_err(|e| RuntimeError::security(format!("allowed base does not resolve: {e}")))?;

        if !candidate.starts_with(&canonical_base) && !candidate.starts_with(base) {
            return Err(RuntimeError::security("path escapes allowed base"));
        }

        let mut growing = PathBuf::new();
        for component in candidate.components() {
            growing.push(component);
            if matches!(component, Component::RootDir | Component::Prefix(_)) {
                continue;
            }
            match std::fs::symlink_metadata(&growing) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    let resolved = growing
                        .canonicalize()
                        .map_err(|e| RuntimeError::security(format!("symlink does not resolve: {e}")))?;
                    if !resolved.starts_with(&canonical_base) {
                        return Err(RuntimeError::security("symlink escapes allowed base"));
                    }
                }
                Ok(meta) if meta.is_file() && growing != candidate => {
                    return Err(RuntimeError::security("path traverses through a file component"));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        let validator = PathValidator::new(vec![PathBuf::from("/tmp")]);
        assert!(validator.validate("", false).is_err());
    }

    #[test]
    fn rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let validator = PathValidator::new(vec![dir.path().to_path_buf()]);
        let escaping = dir.path().join("../../etc/passwd");
        let err = validator.validate(escaping.to_str().unwrap(), true).unwrap_err();
        assert_eq!(err.error_type(), toolrunner_commons::ErrorType::Security);
    }

    #[test]
    fn accepts_existing_path_within_base() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hi").unwrap();
        let validator = PathValidator::new(vec![dir.path().to_path_buf()]);
        let outcome = validator.validate(file.to_str().unwrap(), false).unwrap();
        assert_eq!(outcome.resolved_path, file);
    }

    #[test]
    fn rejects_nonexistent_path_without_allow_creation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.txt");
        let validator = PathValidator::new(vec![dir.path().to_path_buf()]);
        let err = validator.validate(file.to_str().unwrap(), false).unwrap_err();
        assert_eq!(err.error_type(), toolrunner_commons::ErrorType::FileNotFound);
    }

    #[test]
    fn out_of_base_path_is_security_even_if_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        let validator = PathValidator::new(vec![dir.path().to_path_buf()]);
        let outside = std::env::temp_dir().join("definitely-not-registered-anywhere-12345");
        let err = validator.validate(outside.to_str().unwrap(), false).unwrap_err();
        assert_eq!(err.error_type(), toolrunner_commons::ErrorType::Security);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escaping_allowed_base() {
        use std::os::unix::fs::symlink;

        let outside = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let link = base.path().join("escape");
        symlink(outside.path(), &link).unwrap();

        let validator = PathValidator::new(vec![base.path().to_path_buf()]);
        let target = link.join("secret.txt");
        std::fs::write(outside.path().join("secret.txt"), "nope").unwrap();

        let err = validator.validate(target.to_str().unwrap(), false).unwrap_err();
        assert_eq!(err.error_type(), toolrunner_commons::ErrorType::Security);
    }
}
