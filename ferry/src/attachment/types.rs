use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// A target an attached file can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Exposed to the prompt template as a variable.
    #[serde(rename = "template")]
    TemplateContext,
    /// Uploaded to the hosted code-execution sandbox.
    #[serde(rename = "sandbox-exec")]
    SandboxExec,
    /// Uploaded to the hosted document-search index.
    #[serde(rename = "search")]
    SearchIndex,
}

/// Route tokens accepted for each destination. The first entry is canonical.
const DESTINATION_TOKENS: &[(Destination, &[&str])] = &[
    (Destination::TemplateContext, &["template", "prompt"]),
    (
        Destination::SandboxExec,
        &["sandbox-exec", "ci", "code-interpreter"],
    ),
    (Destination::SearchIndex, &["search", "fs", "file-search"]),
];

impl Destination {
    pub const ALL: [Destination; 3] = [
        Destination::TemplateContext,
        Destination::SandboxExec,
        Destination::SearchIndex,
    ];

    /// Canonical route token.
    pub fn token(self) -> &'static str {
        match self {
            Destination::TemplateContext => "template",
            Destination::SandboxExec => "sandbox-exec",
            Destination::SearchIndex => "search",
        }
    }

    /// Look up a route token, case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        DESTINATION_TOKENS
            .iter()
            .find(|(_, names)| names.contains(&token.as_str()))
            .map(|(destination, _)| *destination)
    }

    /// Every accepted token, for error messages.
    pub fn accepted_tokens() -> Vec<&'static str> {
        DESTINATION_TOKENS
            .iter()
            .flat_map(|(_, names)| names.iter().copied())
            .collect()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// What kind of filesystem object a spec names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecKind {
    File,
    Directory,
    Collection,
}

/// Where a spec's files come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum SpecSource {
    Path(PathBuf),
    Glob(String),
    /// A text file listing one path per line.
    FileList(PathBuf),
}

impl fmt::Display for SpecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecSource::Path(p) => write!(f, "{}", p.display()),
            SpecSource::Glob(g) => f.write_str(g),
            SpecSource::FileList(p) => write!(f, "@{}", p.display()),
        }
    }
}

/// One user-declared attachment before filesystem resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    pub alias: String,
    pub source: SpecSource,
    pub kind: SpecKind,
    pub destinations: BTreeSet<Destination>,
    pub recursive: bool,
    /// Lowercase extensions without the leading dot. Empty means no filter.
    pub extension_filter: BTreeSet<String>,
}

impl AttachmentSpec {
    /// True when `path` passes this spec's extension filter.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        if self.extension_filter.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extension_filter.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

/// A route expression as it arrives from the command line, before parsing.
///
/// `tokens` holds either a single expression (`path`, `alias=path`,
/// `destinations:path`) or the two-token `alias path` form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRoute {
    pub kind: Option<SpecKind>,
    pub tokens: Vec<String>,
    pub recursive: bool,
    pub extensions: Vec<String>,
}

impl RawRoute {
    fn with_kind<I, S>(kind: SpecKind, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: Some(kind),
            tokens: tokens.into_iter().map(Into::into).collect(),
            recursive: false,
            extensions: Vec::new(),
        }
    }

    pub fn file<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_kind(SpecKind::File, tokens)
    }

    pub fn dir<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_kind(SpecKind::Directory, tokens)
    }

    pub fn collection<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_kind(SpecKind::Collection, tokens)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

/// A concrete file after resolution. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFile {
    alias: String,
    path: PathBuf,
    size_bytes: u64,
    content_digest: String,
    destinations: BTreeSet<Destination>,
}

impl ResolvedFile {
    pub fn new(
        alias: impl Into<String>,
        path: PathBuf,
        size_bytes: u64,
        content_digest: impl Into<String>,
        destinations: BTreeSet<Destination>,
    ) -> Self {
        Self {
            alias: alias.into(),
            path,
            size_bytes,
            content_digest: content_digest.into(),
            destinations,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Canonical absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Lowercase hex SHA-256 of the contents.
    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }

    pub fn destinations(&self) -> &BTreeSet<Destination> {
        &self.destinations
    }

    pub fn is_routed_to(&self, destination: Destination) -> bool {
        self.destinations.contains(&destination)
    }

    pub(crate) fn merge_destinations(&mut self, other: &BTreeSet<Destination>) {
        self.destinations.extend(other.iter().copied());
    }

    /// The tuple handed to the templating collaborator.
    pub fn binding(&self) -> TemplateBinding {
        TemplateBinding {
            alias: self.alias.clone(),
            path: self.path.clone(),
            size: self.size_bytes,
            destinations: self.destinations.iter().copied().collect(),
        }
    }
}

/// `{alias, path, size, destinations}` as exposed to the templating layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateBinding {
    pub alias: String,
    pub path: PathBuf,
    pub size: u64,
    pub destinations: Vec<Destination>,
}
