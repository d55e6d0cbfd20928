//! Route-expression parsing.
//!
//! Accepted forms, per route:
//!
//! - `path` (alias derived from the file or directory name)
//! - `alias=path`
//! - `alias path` (two tokens)
//! - `dest1,dest2:...` prefixed to any of the above; on the two-token form
//!   the prefix goes on the alias token
//!
//! Parsing is pure. Nothing here touches the filesystem.

use super::error::ParseError;
use super::types::{AttachmentSpec, Destination, RawRoute, SpecKind, SpecSource};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

const GLOB_CHARS: &[char] = &['*', '?', '['];

/// Parse every route and reject duplicate aliases.
pub fn parse(routes: &[RawRoute]) -> Result<Vec<AttachmentSpec>, ParseError> {
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(routes.len());
    for route in routes {
        let spec = parse_route(route)?;
        if !seen.insert(spec.alias.clone()) {
            return Err(ParseError::DuplicateAlias { alias: spec.alias });
        }
        specs.push(spec);
    }
    Ok(specs)
}

/// Parse a single route expression.
pub fn parse_route(route: &RawRoute) -> Result<AttachmentSpec, ParseError> {
    let display = route.tokens.join(" ");
    let kind = route.kind.unwrap_or(SpecKind::File);

    let (destinations, explicit_alias, raw_path) = match route.tokens.as_slice() {
        [] => return Err(ParseError::Empty),
        [single] => {
            if single.trim().is_empty() {
                return Err(ParseError::Empty);
            }
            let (destinations, rest) = split_destinations(single, &display)?;
            let (alias, path) = split_alias(rest, &display)?;
            (destinations, alias, path)
        }
        [alias_token, path] => {
            let (destinations, alias) = split_destinations(alias_token, &display)?;
            if alias.is_empty() || path.is_empty() {
                return Err(malformed(&display, "alias and path must both be non-empty"));
            }
            (destinations, Some(alias), path.as_str())
        }
        _ => {
            return Err(malformed(
                &display,
                "expected one expression or an 'alias path' pair",
            ));
        }
    };

    let (kind, source) = classify_source(kind, raw_path, &display)?;

    if route.recursive && kind != SpecKind::Directory {
        return Err(ParseError::OptionNotApplicable {
            route: display,
            option: "recursive".to_string(),
        });
    }
    if !route.extensions.is_empty() && kind == SpecKind::File {
        return Err(ParseError::OptionNotApplicable {
            route: display,
            option: "ext".to_string(),
        });
    }

    let alias = match explicit_alias {
        Some(alias) => {
            validate_alias(alias)?;
            alias.to_string()
        }
        None => derive_alias(&source)?,
    };

    Ok(AttachmentSpec {
        alias,
        source,
        kind,
        destinations,
        recursive: route.recursive,
        extension_filter: parse_extensions(&route.extensions, &display)?,
    })
}

/// Derive an alias from the last path component: lowercased, with every
/// non-alphanumeric character replaced by `_`.
pub fn derive_alias(source: &SpecSource) -> Result<String, ParseError> {
    let base = match source {
        SpecSource::Path(path) | SpecSource::FileList(path) => base_name(path),
        SpecSource::Glob(pattern) => {
            // Use the fixed directory part of a glob, if any.
            let fixed: PathBuf = Path::new(pattern)
                .components()
                .take_while(|c| !c.as_os_str().to_string_lossy().contains(GLOB_CHARS))
                .collect();
            base_name(&fixed)
        }
    };

    if !base.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(ParseError::InvalidAlias { alias: base });
    }
    Ok(base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect())
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty() && alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_alias(alias: &str) -> Result<(), ParseError> {
    if is_valid_alias(alias) {
        Ok(())
    } else {
        Err(ParseError::InvalidAlias {
            alias: alias.to_string(),
        })
    }
}

fn malformed(route: &str, reason: &str) -> ParseError {
    ParseError::MalformedRoute {
        route: route.to_string(),
        reason: reason.to_string(),
    }
}

/// Split an optional `dest1,dest2:` prefix off `token`.
///
/// A prefix that cannot be a destination list (a drive letter, or characters
/// no destination token uses) leaves the whole token as the remainder.
fn split_destinations<'a>(
    token: &'a str,
    route: &str,
) -> Result<(BTreeSet<Destination>, &'a str), ParseError> {
    let default = || BTreeSet::from([Destination::TemplateContext]);

    let Some((prefix, rest)) = token.split_once(':') else {
        return Ok((default(), token));
    };

    let is_drive_letter = prefix.len() == 1 && prefix.chars().all(|c| c.is_ascii_alphabetic());
    let looks_like_list = prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ',' | '-' | '_' | ' '));
    if is_drive_letter || !looks_like_list {
        return Ok((default(), token));
    }

    if prefix.trim().is_empty() || rest.is_empty() {
        return Err(ParseError::MalformedDestinations {
            route: route.to_string(),
        });
    }

    let mut destinations = BTreeSet::new();
    for part in prefix.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(ParseError::MalformedDestinations {
                route: route.to_string(),
            });
        }
        let destination =
            Destination::from_token(part).ok_or_else(|| ParseError::UnknownDestination {
                route: route.to_string(),
                token: part.to_string(),
                accepted: Destination::accepted_tokens().join(", "),
            })?;
        destinations.insert(destination);
    }
    Ok((destinations, rest))
}

/// Split `alias=path`. Only splits when the left side is a valid alias, so
/// paths that merely contain `=` are kept whole.
fn split_alias<'a>(token: &'a str, route: &str) -> Result<(Option<&'a str>, &'a str), ParseError> {
    match token.split_once('=') {
        Some(("", _)) => Err(malformed(route, "empty alias before '='")),
        Some((_, "")) => Err(malformed(route, "empty path after '='")),
        Some((alias, path)) if is_valid_alias(alias) => Ok((Some(alias), path)),
        _ => Ok((None, token)),
    }
}

fn classify_source(
    kind: SpecKind,
    raw: &str,
    route: &str,
) -> Result<(SpecKind, SpecSource), ParseError> {
    let is_glob = raw.contains(GLOB_CHARS);
    let list = raw.strip_prefix('@');

    match kind {
        SpecKind::File => {
            if let Some(list) = list {
                non_empty(list, route)?;
                Ok((SpecKind::Collection, SpecSource::FileList(PathBuf::from(list))))
            } else if is_glob {
                Ok((SpecKind::Collection, SpecSource::Glob(raw.to_string())))
            } else {
                Ok((SpecKind::File, SpecSource::Path(PathBuf::from(raw))))
            }
        }
        SpecKind::Directory => {
            if list.is_some() || is_glob {
                return Err(malformed(
                    route,
                    "directory routes take a plain path; use a collection for globs and lists",
                ));
            }
            Ok((SpecKind::Directory, SpecSource::Path(PathBuf::from(raw))))
        }
        SpecKind::Collection => {
            if let Some(list) = list {
                non_empty(list, route)?;
                Ok((SpecKind::Collection, SpecSource::FileList(PathBuf::from(list))))
            } else if is_glob {
                Ok((SpecKind::Collection, SpecSource::Glob(raw.to_string())))
            } else {
                Ok((SpecKind::Collection, SpecSource::FileList(PathBuf::from(raw))))
            }
        }
    }
}

fn non_empty(list: &str, route: &str) -> Result<(), ParseError> {
    if list.is_empty() {
        Err(malformed(route, "empty file-list path after '@'"))
    } else {
        Ok(())
    }
}

fn parse_extensions(raw: &[String], route: &str) -> Result<BTreeSet<String>, ParseError> {
    raw.iter()
        .flat_map(|item| item.split(','))
        .map(|ext| {
            let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
            if ext.is_empty() {
                Err(malformed(route, "empty extension in filter"))
            } else {
                Ok(ext)
            }
        })
        .collect()
}
