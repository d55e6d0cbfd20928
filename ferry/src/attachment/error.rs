use crate::path_security::SecurityError;
use std::path::PathBuf;
use thiserror::Error;

/// Route-expression errors. Raised before any filesystem access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Route is empty")]
    Empty,

    #[error("Malformed route '{route}': {reason}")]
    MalformedRoute { route: String, reason: String },

    #[error("Unknown destination '{token}' in route '{route}' (accepted: {accepted})")]
    UnknownDestination {
        route: String,
        token: String,
        accepted: String,
    },

    #[error("Malformed destination list in route '{route}'")]
    MalformedDestinations { route: String },

    #[error("Invalid alias '{alias}': only letters, digits and '_' are allowed")]
    InvalidAlias { alias: String },

    #[error("Alias '{alias}' is declared more than once")]
    DuplicateAlias { alias: String },

    #[error("Option '{option}' does not apply to route '{route}'")]
    OptionNotApplicable { route: String, option: String },
}

/// One bad line in an `@file-list` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntryError {
    /// 1-based line number in the list file.
    pub line: usize,
    pub entry: String,
    pub error: SecurityError,
}

/// Errors expanding specs against the filesystem.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Alias '{alias}' is declared more than once")]
    DuplicateAlias { alias: String },

    #[error("Attachment '{alias}': {source}")]
    Security {
        alias: String,
        #[source]
        source: SecurityError,
    },

    #[error("Attachment '{alias}': '{}' is not a regular file", .path.display())]
    NotAFile { alias: String, path: PathBuf },

    #[error("Attachment '{alias}': '{}' is not a directory", .path.display())]
    NotADirectory { alias: String, path: PathBuf },

    #[error("Attachment '{alias}': pattern '{pattern}' matched no files")]
    NoMatches { alias: String, pattern: String },

    #[error("Attachment '{alias}': invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        alias: String,
        pattern: String,
        reason: String,
    },

    #[error("Attachment '{alias}': failed to walk '{}': {reason}", .path.display())]
    Walk {
        alias: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Attachment '{alias}': I/O error on '{}': {source}", .path.display())]
    Io {
        alias: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Attachment '{alias}': invalid entries in '{}': {}",
        .list.display(),
        describe_entries(.entries)
    )]
    InvalidCollectionEntries {
        alias: String,
        list: PathBuf,
        entries: Vec<CollectionEntryError>,
    },
}

fn describe_entries(entries: &[CollectionEntryError]) -> String {
    entries
        .iter()
        .map(|e| format!("line {} '{}' ({})", e.line, e.entry, e.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ResolutionError {
    /// The alias of the spec that failed.
    pub fn alias(&self) -> &str {
        match self {
            ResolutionError::DuplicateAlias { alias }
            | ResolutionError::Security { alias, .. }
            | ResolutionError::NotAFile { alias, .. }
            | ResolutionError::NotADirectory { alias, .. }
            | ResolutionError::NoMatches { alias, .. }
            | ResolutionError::InvalidPattern { alias, .. }
            | ResolutionError::Walk { alias, .. }
            | ResolutionError::Io { alias, .. }
            | ResolutionError::InvalidCollectionEntries { alias, .. } => alias,
        }
    }

    /// The underlying security error, when there is exactly one.
    pub fn security_error(&self) -> Option<&SecurityError> {
        match self {
            ResolutionError::Security { source, .. } => Some(source),
            _ => None,
        }
    }
}
