//! Helpers for '/'-delimited virtual paths in the Precog namespace.
//!
//! These operate on plain strings. They never touch the local filesystem and
//! never validate that a path exists on the server.

use crate::error::{Error, Result};

/// Collapse every run of consecutive `/` into a single `/`.
pub fn sanitize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Strip exactly one trailing `/`, if present.
pub fn remove_trailing_slash(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

/// The directory containing `path`. Root-level paths have `/` as parent.
pub fn parent_path(path: &str) -> String {
    let sanitized = sanitize_path(path);
    let trimmed = remove_trailing_slash(&sanitized);
    let mut elements: Vec<&str> = trimmed.split('/').collect();
    elements.pop();
    let joined = elements.join("/");
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// The final segment of `path`. Empty when the path ends in `/`, which
/// marks it as a directory.
pub fn last_path_element(path: &str) -> String {
    let sanitized = sanitize_path(path);
    sanitized.rsplit('/').next().unwrap_or_default().to_string()
}

/// Join a directory and a name with a single separator.
pub fn join_path(dir: &str, name: &str) -> String {
    sanitize_path(&format!("{dir}/{name}"))
}

/// Split a path that must name a file into its directory and file name.
///
/// Fails with [`Error::InvalidPath`] carrying `message` when the path names
/// a directory.
pub fn file_target(path: &str, message: &str) -> Result<(String, String)> {
    let name = last_path_element(path);
    if name.is_empty() {
        return Err(Error::InvalidPath(format!("{message}: {path}")));
    }
    Ok((parent_path(path), name))
}
