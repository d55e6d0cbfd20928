//! Expansion of attachment specs into concrete, validated files.
//!
//! Resolution is synchronous. Output order is deterministic: specs in the
//! order given, and within a spec, paths sorted by file name.

use super::error::{CollectionEntryError, ResolutionError};
use super::types::{AttachmentSpec, ResolvedFile, SpecKind, SpecSource};
use crate::path_security::{PathSecurityValidator, SecurityError};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Resolves specs against a fixed set of allowed roots.
pub struct AttachmentResolver<'a> {
    validator: &'a PathSecurityValidator,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(validator: &'a PathSecurityValidator) -> Self {
        Self { validator }
    }

    /// Expand, validate and de-duplicate every spec.
    ///
    /// Any failure aborts the whole resolution; no partial result is returned.
    pub fn resolve(&self, specs: &[AttachmentSpec]) -> Result<Vec<ResolvedFile>, ResolutionError> {
        check_unique_aliases(specs)?;

        let mut files: Vec<ResolvedFile> = Vec::new();
        let mut index_by_path: BTreeMap<PathBuf, usize> = BTreeMap::new();

        for spec in specs {
            let paths = self.expand(spec)?;
            debug!(
                "Attachment '{}' expanded to {} file(s)",
                spec.alias,
                paths.len()
            );

            for path in paths {
                if let Some(&index) = index_by_path.get(&path) {
                    debug!(
                        "'{}' already attached as '{}'; merging destinations from '{}'",
                        path.display(),
                        files[index].alias(),
                        spec.alias
                    );
                    files[index].merge_destinations(&spec.destinations);
                    continue;
                }

                let (size, digest) = fingerprint(&spec.alias, &path)?;
                index_by_path.insert(path.clone(), files.len());
                files.push(ResolvedFile::new(
                    spec.alias.clone(),
                    path,
                    size,
                    digest,
                    spec.destinations.clone(),
                ));
            }
        }

        Ok(files)
    }

    /// Canonical paths for one spec, each already validated.
    fn expand(&self, spec: &AttachmentSpec) -> Result<Vec<PathBuf>, ResolutionError> {
        match (&spec.kind, &spec.source) {
            (SpecKind::Directory, SpecSource::Path(path)) => self.expand_directory(spec, path),
            (_, SpecSource::Path(path)) => self.expand_file(spec, path).map(|p| vec![p]),
            (_, SpecSource::Glob(pattern)) => self.expand_glob(spec, pattern),
            (_, SpecSource::FileList(list)) => self.expand_file_list(spec, list),
        }
    }

    fn validate(&self, alias: &str, path: &Path) -> Result<PathBuf, ResolutionError> {
        self.validator
            .validate(path)
            .map_err(|source| ResolutionError::Security {
                alias: alias.to_string(),
                source,
            })
    }

    fn expand_file(&self, spec: &AttachmentSpec, path: &Path) -> Result<PathBuf, ResolutionError> {
        let canonical = self.validate(&spec.alias, path)?;
        if !canonical.is_file() {
            return Err(ResolutionError::NotAFile {
                alias: spec.alias.clone(),
                path: path.to_path_buf(),
            });
        }
        Ok(canonical)
    }

    fn expand_directory(
        &self,
        spec: &AttachmentSpec,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, ResolutionError> {
        let root = self.validate(&spec.alias, dir)?;
        if !root.is_dir() {
            return Err(ResolutionError::NotADirectory {
                alias: spec.alias.clone(),
                path: dir.to_path_buf(),
            });
        }

        let mut walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        if !spec.recursive {
            walker = walker.max_depth(1);
        }

        let mut paths = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| ResolutionError::Walk {
                alias: spec.alias.clone(),
                path: e.path().unwrap_or(root.as_path()).to_path_buf(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            // Cheap filter first; validation canonicalizes.
            if !spec.accepts_extension(entry.path()) {
                continue;
            }
            let canonical = self.validate(&spec.alias, entry.path())?;
            paths.push(canonical);
        }
        Ok(paths)
    }

    fn expand_glob(
        &self,
        spec: &AttachmentSpec,
        pattern: &str,
    ) -> Result<Vec<PathBuf>, ResolutionError> {
        let matches = glob::glob(pattern).map_err(|e| ResolutionError::InvalidPattern {
            alias: spec.alias.clone(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in matches {
            let path = entry.map_err(|e| ResolutionError::Walk {
                alias: spec.alias.clone(),
                path: e.path().to_path_buf(),
                reason: e.error().to_string(),
            })?;
            if path.is_dir() || !spec.accepts_extension(&path) {
                continue;
            }
            paths.push(self.validate(&spec.alias, &path)?);
        }

        if paths.is_empty() {
            return Err(ResolutionError::NoMatches {
                alias: spec.alias.clone(),
                pattern: pattern.to_string(),
            });
        }
        paths.sort();
        Ok(paths)
    }

    /// Resolve each listed entry independently and report every bad line.
    fn expand_file_list(
        &self,
        spec: &AttachmentSpec,
        list: &Path,
    ) -> Result<Vec<PathBuf>, ResolutionError> {
        let list_path = self.expand_file(spec, list)?;
        let contents = std::fs::read_to_string(&list_path).map_err(|source| ResolutionError::Io {
            alias: spec.alias.clone(),
            path: list_path.clone(),
            source,
        })?;
        let base = list_path.parent().unwrap_or(Path::new("/")).to_path_buf();

        let mut paths = Vec::new();
        let mut bad_entries = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            let candidate = base.join(entry);
            if !spec.accepts_extension(&candidate) {
                continue;
            }
            let result = self.validator.validate(&candidate).and_then(|canonical| {
                if canonical.is_file() {
                    Ok(canonical)
                } else {
                    Err(SecurityError::NotReadable {
                        path: candidate.clone(),
                        reason: "not a regular file".to_string(),
                    })
                }
            });
            match result {
                Ok(canonical) => paths.push(canonical),
                Err(error) => bad_entries.push(CollectionEntryError {
                    line: index + 1,
                    entry: entry.to_string(),
                    error,
                }),
            }
        }

        if !bad_entries.is_empty() {
            return Err(ResolutionError::InvalidCollectionEntries {
                alias: spec.alias.clone(),
                list: list.to_path_buf(),
                entries: bad_entries,
            });
        }
        Ok(paths)
    }
}

/// Resolve `specs` against `allowed_roots` in one call.
///
/// Duplicate aliases are rejected before the roots are even canonicalized.
pub fn resolve(
    specs: &[AttachmentSpec],
    allowed_roots: &[PathBuf],
) -> Result<Vec<ResolvedFile>, ResolutionError> {
    check_unique_aliases(specs)?;
    let validator = PathSecurityValidator::new(allowed_roots).map_err(|source| {
        ResolutionError::Security {
            alias: String::new(),
            source,
        }
    })?;
    AttachmentResolver::new(&validator).resolve(specs)
}

fn check_unique_aliases(specs: &[AttachmentSpec]) -> Result<(), ResolutionError> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.alias.as_str()) {
            return Err(ResolutionError::DuplicateAlias {
                alias: spec.alias.clone(),
            });
        }
    }
    Ok(())
}

/// Size and SHA-256 hex digest, streamed.
fn fingerprint(alias: &str, path: &Path) -> Result<(u64, String), ResolutionError> {
    let io_err = |source| ResolutionError::Io {
        alias: alias.to_string(),
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(io_err)?;
    Ok((size, hex_encode(&hasher.finalize())))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
