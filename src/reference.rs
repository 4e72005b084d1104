//! Reference Paths
//!
//! A reference string points at a sibling key's resolved value, optionally
//! descending into nested fields:
//!
//! ```text
//! reference := ["/"] segment ("/" segment)*
//! ```
//!
//! The first segment names a top-level request key; every following segment
//! names a field inside the value produced so far. `"/User/id"` and
//! `"User/id"` are the same path.

use std::fmt;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// A parsed, non-empty reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    segments: Vec<String>,
}

impl ReferencePath {
    /// Parse a reference string.
    ///
    /// Returns `None` for an empty path or one containing an empty segment
    /// (`"a//b"`, `"a/"`, `"/"`).
    pub fn parse(reference: &str) -> Option<Self> {
        let trimmed = reference.trim();
        let body = trimmed.strip_prefix(SEPARATOR).unwrap_or(trimmed);
        if body.is_empty() {
            return None;
        }

        let segments: Vec<String> = body.split(SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some(Self { segments })
    }

    /// The top-level key this path starts from.
    pub fn key(&self) -> &str {
        &self.segments[0]
    }

    /// Field names navigated after the key.
    pub fn fields(&self) -> &[String] {
        &self.segments[1..]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The path up to and including segment `index`, rendered with a leading
    /// separator. Used in "not found" messages to point at the failing step.
    pub fn prefix(&self, index: usize) -> String {
        let end = (index + 1).min(self.segments.len());
        let mut out = String::new();
        for segment in &self.segments[..end] {
            out.push(SEPARATOR);
            out.push_str(segment);
        }
        out
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix(self.segments.len()))
    }
}
