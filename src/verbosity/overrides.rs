//! Call-path verbosity overrides and their textual form.
//!
//! The textual form is a semicolon-separated list of `pattern:level` pairs,
//! for example `Orders.Import*:8;*Cache:-1;*:2`. A pattern may carry a
//! leading and/or trailing `*`. The bare pattern `*` is the fallback entry.

use crate::error::{ControlError, Result};
use std::fmt;
use std::str::FromStr;

/// How a pattern is compared against a normalized call path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `*` on its own
    Fallback,
    /// `*needle*`
    Contains,
    /// `*needle`
    Suffix,
    /// `needle*`
    Prefix,
    /// `needle`: exact match, or containment
    Literal,
}

/// A single `pattern:level` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbosityOverride {
    pattern: String,
    level: i32,
    kind: PatternKind,
    needle: String,
}

impl VerbosityOverride {
    /// Build an override from a pattern and level.
    pub fn new(pattern: impl Into<String>, level: i32) -> Self {
        let pattern = pattern.into();
        let (kind, needle) = classify(&pattern);
        Self {
            pattern,
            level,
            kind,
            needle,
        }
    }

    /// The pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The override level.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// How the pattern matches.
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Whether this is the `*` fallback entry.
    pub fn is_fallback(&self) -> bool {
        self.kind == PatternKind::Fallback
    }

    /// Test a normalized (lower-cased, dot-joined) call path.
    ///
    /// The fallback entry never matches here; it is consulted separately.
    pub fn matches(&self, path: &str) -> bool {
        let needle = self.needle.as_str();
        match self.kind {
            PatternKind::Fallback => false,
            PatternKind::Contains => path.contains(needle),
            PatternKind::Suffix => path.ends_with(needle),
            PatternKind::Prefix => path.starts_with(needle),
            PatternKind::Literal => path == needle || path.contains(needle),
        }
    }
}

fn classify(pattern: &str) -> (PatternKind, String) {
    let trimmed = pattern.trim();
    if trimmed.chars().all(|c| c == '*') {
        return (PatternKind::Fallback, String::new());
    }

    let lead = trimmed.starts_with('*');
    let trail = trimmed.len() > 1 && trimmed.ends_with('*');
    let needle = trimmed.trim_matches('*').to_lowercase();
    let kind = match (lead, trail) {
        (true, true) => PatternKind::Contains,
        (true, false) => PatternKind::Suffix,
        (false, true) => PatternKind::Prefix,
        (false, false) => PatternKind::Literal,
    };
    (kind, needle)
}

/// An ordered, immutable set of overrides.
///
/// Tables are never edited in place. A reload parses a fresh table and the
/// resolver swaps it in as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    entries: Vec<VerbosityOverride>,
}

impl OverrideTable {
    /// An empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from entries in order.
    pub fn from_entries(entries: Vec<VerbosityOverride>) -> Self {
        Self { entries }
    }

    /// Parse the `name:level;name:level` form.
    ///
    /// Empty segments are ignored. Any malformed segment rejects the whole
    /// string so that a half-valid table is never published.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for segment in text.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, level) = segment.rsplit_once(':').ok_or_else(|| {
                ControlError::InvalidOverride(format!("'{}' is not in name:level form", segment))
            })?;

            let name = name.trim();
            if name.is_empty() {
                return Err(ControlError::InvalidOverride(format!(
                    "'{}' has an empty pattern",
                    segment
                )));
            }
            if name != "*" && name.trim_matches('*').is_empty() {
                return Err(ControlError::InvalidOverride(format!(
                    "'{}' has no text between its wildcards",
                    segment
                )));
            }

            let level = level.trim().parse::<i32>().map_err(|e| {
                ControlError::InvalidOverride(format!("'{}' has an invalid level: {}", segment, e))
            })?;

            entries.push(VerbosityOverride::new(name, level));
        }
        Ok(Self { entries })
    }

    /// Entries in table order, including the fallback.
    pub fn entries(&self) -> &[VerbosityOverride] {
        &self.entries
    }

    /// Whether the table holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Level of the `*` entry, if present.
    pub fn fallback(&self) -> Option<i32> {
        self.entries
            .iter()
            .find(|e| e.is_fallback())
            .map(|e| e.level)
    }

    /// First non-fallback entry whose pattern matches `path`.
    pub fn find_match(&self, path: &str) -> Option<&VerbosityOverride> {
        self.entries
            .iter()
            .filter(|e| !e.is_fallback())
            .find(|e| e.matches(path))
    }
}

impl fmt::Display for OverrideTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}:{}", entry.pattern, entry.level)?;
        }
        Ok(())
    }
}

impl FromStr for OverrideTable {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
