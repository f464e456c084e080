//! Ref name validation following git-style conventions.
//!
//! Valid branch names:
//! - are non-empty
//! - contain no whitespace and none of `~ ^ : ? * [ \`
//! - contain neither `..` nor `@{`
//! - do not start or end with `.` or `/`, and do not end with `.lock`
//! - have non-empty `/`-separated components that do not start with `.`
//!
//! The `..` and `~`/`^` exclusions keep names unambiguous in revision
//! ranges such as `main...feature^`.

use crate::error::{RefError, Result};

const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a branch name.
///
/// ```
/// use lode_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("survey/2024").is_ok());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(name, "must not start or end with '.'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }
    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }
    Ok(())
}

/// Validate a tag name. Same rules as branch names.
pub fn validate_tag_name(name: &str) -> Result<()> {
    validate_branch_name(name)
}

/// Validate a remote name: a branch-like name without slashes.
pub fn validate_remote_name(name: &str) -> Result<()> {
    if name.contains('/') {
        return Err(invalid(name, "remote name must not contain '/'"));
    }
    validate_branch_name(name)
}
