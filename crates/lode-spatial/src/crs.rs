//! Coordinate reference system identification.
//!
//! Lode does not interpret CRS definitions beyond their authority code. A
//! definition is accepted in any of these forms:
//!
//! - `EPSG:4326`
//! - `urn:ogc:def:crs:EPSG::4326`
//! - OGC WKT1 / WKT2, using the root object's `AUTHORITY["EPSG","4326"]` or
//!   `ID["EPSG",4326]`

use std::fmt;

use crate::error::{SpatialError, SpatialResult};

/// An identified coordinate reference system.
#[derive(Clone, Debug)]
pub struct Crs {
    authority: String,
    code: u32,
    definition: String,
}

impl Crs {
    pub fn epsg(code: u32) -> Self {
        Self {
            authority: "EPSG".into(),
            code,
            definition: format!("EPSG:{code}"),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    /// `AUTHORITY:CODE`, e.g. `EPSG:2193`.
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.authority, self.code)
    }

    /// The definition this CRS was created from.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Two CRSs are equivalent when they share authority and code.
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        self.authority.eq_ignore_ascii_case(&other.authority) && self.code == other.code
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.is_equivalent(other)
    }
}

impl Eq for Crs {}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Identify a CRS definition. `context` names what the definition belongs
/// to (usually a dataset path) and is carried into the error.
pub fn make_crs(definition: &str, context: &str) -> SpatialResult<Crs> {
    let trimmed = definition.trim();
    let invalid = |reason: &str| SpatialError::InvalidCrs {
        context: context.to_string(),
        reason: reason.to_string(),
    };

    let (authority, code) = if let Some(rest) = strip_prefix_ci(trimmed, "urn:ogc:def:crs:") {
        // urn:ogc:def:crs:EPSG::4326 (the version segment may be empty)
        let mut parts = rest.split(':');
        let authority = parts.next().unwrap_or_default();
        let code = parts.last().unwrap_or_default();
        (authority.to_string(), code.to_string())
    } else if let Some((authority, code)) = trimmed.split_once(':').filter(|(a, c)| {
        !a.is_empty() && a.chars().all(|ch| ch.is_ascii_alphabetic()) && !c.contains('[')
    }) {
        (authority.to_string(), code.to_string())
    } else if trimmed.contains('[') || trimmed.contains('(') {
        root_authority(trimmed).ok_or_else(|| invalid("no root AUTHORITY or ID in WKT"))?
    } else {
        return Err(invalid("unrecognised CRS definition"));
    };

    let code: u32 = code
        .trim()
        .parse()
        .map_err(|_| invalid(&format!("bad authority code {code:?}")))?;
    if authority.is_empty() {
        return Err(invalid("empty authority"));
    }
    Ok(Crs {
        authority: authority.to_ascii_uppercase(),
        code,
        definition: definition.to_string(),
    })
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &s[prefix.len()..])
}

/// Find the `AUTHORITY[..]` or `ID[..]` that is a direct child of the root
/// WKT object, skipping quoted strings.
fn root_authority(wkt: &str) -> Option<(String, String)> {
    let bytes = wkt.as_bytes();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_quotes {
            if b == b'"' {
                in_quotes = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_quotes = true,
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth = depth.saturating_sub(1),
            _ if depth == 1 && (i == 0 || matches!(bytes[i - 1], b',' | b' ' | b'\n' | b'\t')) => {
                let rest = &wkt[i..];
                for keyword in ["AUTHORITY", "ID"] {
                    if let Some(args) = strip_prefix_ci(rest, keyword)
                        .and_then(|r| r.strip_prefix('[').or_else(|| r.strip_prefix('(')))
                    {
                        if let Some(parsed) = parse_authority_args(args) {
                            found = Some(parsed);
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    found
}

/// Parse `"EPSG","4326"]` or `"EPSG",4326]`.
fn parse_authority_args(args: &str) -> Option<(String, String)> {
    let end = args.find([']', ')'])?;
    let mut parts = args[..end].split(',');
    let authority = parts.next()?.trim().trim_matches('"').to_string();
    let code = parts.next()?.trim().trim_matches('"').to_string();
    Some((authority, code))
}
