//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile `/gallery/:id` style patterns into literal and parameter segments
//! - Match a concrete path segment-by-segment, binding parameters
//!
//! # Design Decisions
//! - Literal segments are case-sensitive
//! - A parameter matches exactly one non-empty segment
//! - No regex or wildcard segments; matching is O(segments)
//! - One trailing slash is insignificant: `/todos/` matches `/todos`

use std::collections::HashMap;

use crate::routing::RouteError;

/// Parameters bound by a successful match.
pub type PathParams = HashMap<String, String>;

/// One piece of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut segments = Vec::new();
        for part in split_path(pattern) {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid("parameter names must be [A-Za-z0-9_]+"));
                }
                if segments.contains(&Segment::Param(name.to_string())) {
                    return Err(invalid("duplicate parameter name"));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                if part.contains([':', '*', '?', '{', '}', '(', ')', '[', ']']) {
                    return Err(invalid("literal segments may not contain pattern characters"));
                }
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    /// Pattern with parameter names erased; two routes whose normalized
    /// forms are equal can never be told apart.
    pub fn normalized(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => format!("/{lit}"),
                Segment::Param(_) => "/:".to_string(),
            })
            .collect()
    }

    /// Match pre-split path segments, returning bound parameters.
    pub fn matches(&self, path: &[&str]) -> Option<PathParams> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = PathParams::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(lit) if lit == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if actual.is_empty() => return None,
                Segment::Param(name) => {
                    let value = urlencoding::decode(actual)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| actual.to_string());
                    params.insert(name.clone(), value);
                }
            }
        }
        Some(params)
    }
}

/// Split a path into segments, dropping the leading slash and one trailing
/// slash. The root path has no segments.
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}
