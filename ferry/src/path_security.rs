//! Path security validation for attachments.
//!
//! This module ensures that every file ferry reads lies within an explicitly
//! allowed root. Paths are canonicalized (symlinks and `..` resolved) before
//! comparison, so a symlink planted inside an allowed root that points outside
//! it is rejected, not followed.
//!
//! ## Security
//! Directory walks validate the walk root and then every discovered file
//! again: a directory inside an allowed root can still contain symlinks that
//! lead out of it.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Errors reported by [`PathSecurityValidator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error(
        "Path '{}' resolves outside the allowed root{}",
        .path.display(),
        format_roots(.roots)
    )]
    OutsideAllowedRoots { path: PathBuf, roots: Vec<PathBuf> },

    #[error("Path '{}' does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("Path '{}' is not readable: {reason}", .path.display())]
    NotReadable { path: PathBuf, reason: String },
}

pub(crate) fn format_roots(roots: &[PathBuf]) -> String {
    if roots.is_empty() {
        "s (none configured)".to_string()
    } else if roots.len() == 1 {
        format!(" '{}'", roots[0].display())
    } else {
        let list: Vec<String> = roots
            .iter()
            .map(|r| format!("'{}'", r.display()))
            .collect();
        format!("s [{}]", list.join(", "))
    }
}

/// Confirms paths canonicalize inside a fixed set of allowed roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSecurityValidator {
    roots: Vec<PathBuf>,
}

impl PathSecurityValidator {
    /// Canonicalize the allowed roots. A root that does not exist is an error.
    pub fn new<I, P>(roots: I) -> Result<Self, SecurityError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut canonical_roots: Vec<PathBuf> = Vec::new();
        for root in roots {
            let root = root.as_ref();
            let canonical = canonicalize(root)?;
            if !canonical_roots.contains(&canonical) {
                canonical_roots.push(canonical);
            }
        }
        Ok(Self {
            roots: canonical_roots,
        })
    }

    /// The canonical allowed roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// True when `canonical` equals or descends from an allowed root.
    ///
    /// The argument must already be canonical.
    pub fn contains(&self, canonical: &Path) -> bool {
        self.roots.iter().any(|root| canonical.starts_with(root))
    }

    /// Validate `path` and return its canonical form.
    pub fn validate(&self, path: &Path) -> Result<PathBuf, SecurityError> {
        let canonical = match std::fs::canonicalize(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Report escapes before existence, so callers cannot probe
                // for files outside the roots.
                let anchored = anchor_missing_path(path);
                if !self.contains(&anchored) {
                    return Err(self.outside(path));
                }
                return Err(SecurityError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(SecurityError::NotReadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if !self.contains(&canonical) {
            return Err(self.outside(path));
        }

        check_readable(&canonical).map_err(|e| SecurityError::NotReadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(canonical)
    }

    fn outside(&self, path: &Path) -> SecurityError {
        SecurityError::OutsideAllowedRoots {
            path: path.to_path_buf(),
            roots: self.roots.clone(),
        }
    }
}

/// Validate `path` against `allowed_roots` in one call.
pub fn validate(path: &Path, allowed_roots: &[PathBuf]) -> Result<PathBuf, SecurityError> {
    PathSecurityValidator::new(allowed_roots)?.validate(path)
}

fn canonicalize(path: &Path) -> Result<PathBuf, SecurityError> {
    std::fs::canonicalize(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => SecurityError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SecurityError::NotReadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })
}

fn check_readable(canonical: &Path) -> std::io::Result<()> {
    if canonical.is_dir() {
        std::fs::read_dir(canonical).map(|_| ())
    } else {
        std::fs::File::open(canonical).map(|_| ())
    }
}

/// Canonicalize the deepest existing ancestor of a missing path and re-append
/// the remaining components lexically.
fn anchor_missing_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let absolute = normalize_path_lexically(&absolute);

    let mut remainder = Vec::new();
    let mut cursor = absolute.as_path();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(cursor) {
            let mut anchored = canonical;
            for part in remainder.iter().rev() {
                anchored.push(part);
            }
            return anchored;
        }
        match (cursor.parent(), cursor.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                cursor = parent;
            }
            _ => return absolute,
        }
    }
}

/// Normalize a path lexically (without filesystem access).
pub fn normalize_path_lexically(path: &Path) -> PathBuf {
    let mut stack = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if stack
                    .last()
                    .is_some_and(|c| matches!(c, Component::Normal(_)))
                {
                    stack.pop();
                } else if !stack
                    .last()
                    .is_some_and(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
                {
                    stack.push(component);
                }
            }
            c => stack.push(c),
        }
    }

    stack.iter().collect()
}
