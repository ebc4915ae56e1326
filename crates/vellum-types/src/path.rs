//! Virtual path handling.
//!
//! Paths are `/`-separated strings, always absolute, never with a trailing
//! slash except for the root `/` itself. `.` components are dropped and `..`
//! pops, but may not climb above the root.

use thiserror::Error;

/// The root folder.
pub const ROOT: &str = "/";

/// Path validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("path escapes root: {0}")]
    EscapesRoot(String),
    #[error("invalid name '{0}'")]
    InvalidName(String),
}

/// Normalize a caller-supplied path.
pub fn normalize(path: &str) -> Result<String, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(PathError::EscapesRoot(path.to_string()));
                }
            }
            name => {
                if name.chars().any(|c| c.is_control()) {
                    return Err(PathError::InvalidName(name.to_string()));
                }
                parts.push(name);
            }
        }
    }
    if parts.is_empty() {
        Ok(ROOT.to_string())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

/// Check a bare name (no separators, not `.`/`..`).
pub fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.chars().any(|c| c.is_control())
    {
        return Err(PathError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// Parent of a normalized path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Last component of a normalized path; empty for the root.
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Append a name to a normalized folder path.
pub fn join(folder: &str, name: &str) -> String {
    if is_root(folder) {
        format!("/{name}")
    } else {
        format!("{folder}/{name}")
    }
}

/// True if `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return !is_root(path);
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// True if `path` is `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor || is_descendant(path, ancestor)
}

/// Move `path` from under `from` to under `to`. `path` must be within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    if !is_descendant(path, from) {
        return None;
    }
    let rest = if is_root(from) { &path[1..] } else { &path[from.len() + 1..] };
    Some(join(to, rest))
}
