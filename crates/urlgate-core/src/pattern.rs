//! Pattern compilation and matching.
//!
//! A raw pattern string is classified into a [`PatternKind`] and compiled into
//! an immutable [`Pattern`] with a precomputed specificity score.
//!
//! # Pattern Syntax
//!
//! | Kind | Example | Matches |
//! |------|---------|---------|
//! | Exact | `/admin/settings` | the identical URL |
//! | Parameterized | `/clients/:clientId/*/reports/**` | `:name` captures one segment, `*` skips one segment, `**` spans the remainder |
//! | Regex | `^/reports/(?P<year>\d{4})$` | whatever the expression matches |
//! | Wildcard | `/docs/*` | any URL starting with `/docs/` |
//!
//! Kind detection runs in that priority order: regex metacharacters first,
//! then `:` (or an interior `*` / `**` segment), then a trailing `*`.
//!
//! # Specificity
//!
//! `base[kind] + len(raw) - 10 * count('*' | ':')` with bases
//! Exact 1000, Parameterized 500, Regex 250, Wildcard 100. Higher wins.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::CompileError;
use crate::resource::{PatternRecord, Resource, ResourceMetadata};

/// Characters whose presence marks a pattern as a regular expression.
const REGEX_METACHARACTERS: [char; 12] =
    ['(', ')', '?', '+', '[', ']', '{', '}', '^', '$', '|', '\\'];

/// Penalty applied per dynamic token (`*` or `:`).
const DYNAMIC_TOKEN_PENALTY: i64 = 10;

// =============================================================================
// Pattern Kind
// =============================================================================

/// Syntax family of a pattern. Assigned once at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// Literal string equality.
    Exact,
    /// Segment template with `:name`, `*` and `**` segments.
    Parameterized,
    /// Raw regular expression.
    Regex,
    /// Literal prefix followed by a trailing `*`.
    Wildcard,
}

impl PatternKind {
    /// Classifies a raw pattern string.
    #[must_use]
    pub fn detect(raw: &str) -> Self {
        if raw.contains(REGEX_METACHARACTERS) || raw.contains(".*") {
            Self::Regex
        } else if raw.contains(':') || has_template_wildcard(raw) {
            Self::Parameterized
        } else if raw.ends_with('*') {
            Self::Wildcard
        } else {
            Self::Exact
        }
    }

    /// Base specificity score for the kind.
    #[must_use]
    pub const fn base_score(self) -> i64 {
        match self {
            Self::Exact => 1000,
            Self::Parameterized => 500,
            Self::Regex => 250,
            Self::Wildcard => 100,
        }
    }

    /// Returns the kind as a lowercase string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Parameterized => "parameterized",
            Self::Regex => "regex",
            Self::Wildcard => "wildcard",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when a `*` appears as a whole segment anywhere except as a single
/// trailing `*` (which is plain prefix syntax), or when `**` appears at all.
fn has_template_wildcard(raw: &str) -> bool {
    let segments: Vec<&str> = raw.split('/').collect();
    let last = segments.len() - 1;
    segments
        .iter()
        .enumerate()
        .any(|(index, segment)| *segment == "**" || (*segment == "*" && index != last))
}

/// Computes the specificity score of a raw pattern of the given kind.
#[must_use]
pub fn specificity(kind: PatternKind, raw: &str) -> i64 {
    let length = raw.chars().count() as i64;
    let dynamic_tokens = raw.chars().filter(|c| matches!(c, '*' | ':')).count() as i64;
    kind.base_score() + length - DYNAMIC_TOKEN_PENALTY * dynamic_tokens
}

// =============================================================================
// Matcher
// =============================================================================

/// Compiled matcher state. Private to the compiler.
#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Template { regex: Regex, params: Vec<String> },
    Expression { regex: Regex, params: Vec<String> },
    Prefix(String),
    Never,
}

fn compile_template(raw: &str) -> Result<Matcher, CompileError> {
    let mut source = String::from("^");
    let mut params: Vec<String> = Vec::new();

    for (position, segment) in raw.split('/').enumerate() {
        let separator = if position == 0 { "" } else { "/" };
        match segment {
            "**" if position == 0 => source.push_str(".*"),
            "**" => source.push_str("(?:/.*)?"),
            "*" => {
                source.push_str(separator);
                source.push_str("[^/]+");
            }
            _ if segment.starts_with(':') => {
                let name = &segment[1..];
                if name.is_empty() {
                    return Err(CompileError::EmptyParameterName {
                        pattern: raw.to_string(),
                        position,
                    });
                }
                if params.iter().any(|p| p == name) {
                    return Err(CompileError::DuplicateParameter {
                        pattern: raw.to_string(),
                        name: name.to_string(),
                    });
                }
                source.push_str(separator);
                source.push_str("([^/]+)");
                params.push(name.to_string());
            }
            literal => {
                source.push_str(separator);
                source.push_str(&regex::escape(literal));
            }
        }
    }
    source.push('$');

    let regex =
        Regex::new(&source).map_err(|e| CompileError::invalid_regex(raw, e.to_string()))?;
    Ok(Matcher::Template { regex, params })
}

fn compile_expression(raw: &str) -> Result<Matcher, CompileError> {
    let regex = Regex::new(raw).map_err(|e| CompileError::invalid_regex(raw, e.to_string()))?;
    let params = regex.capture_names().flatten().map(String::from).collect();
    Ok(Matcher::Expression { regex, params })
}

// =============================================================================
// Pattern
// =============================================================================

/// An immutable compiled pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    id: String,
    kind: PatternKind,
    specificity: i64,
    metadata: ResourceMetadata,
    matcher: Matcher,
}

impl Pattern {
    /// Compiles a pattern record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The pattern is empty
    /// - A regex pattern is not a valid expression
    /// - A parameterized pattern has an unnamed or duplicated `:` segment
    pub fn compile(record: &PatternRecord) -> Result<Self, CompileError> {
        let raw = record.pattern.as_str();
        if raw.trim().is_empty() {
            return Err(CompileError::EmptyPattern);
        }

        let kind = PatternKind::detect(raw);
        let matcher = match kind {
            PatternKind::Exact => Matcher::Exact(raw.to_string()),
            PatternKind::Parameterized => compile_template(raw)?,
            PatternKind::Regex => compile_expression(raw)?,
            PatternKind::Wildcard => Matcher::Prefix(raw[..raw.len() - 1].to_string()),
        };

        Ok(Self::assemble(record, kind, matcher))
    }

    /// Compiles a pattern record, degrading to a match-nothing pattern on error.
    ///
    /// The error is logged as a warning. Used by registry loads, which must
    /// never fail because of a single bad pattern.
    #[must_use]
    pub fn compile_lenient(record: &PatternRecord) -> Self {
        match Self::compile(record) {
            Ok(pattern) => pattern,
            Err(error) => {
                tracing::warn!(
                    pattern = %record.pattern,
                    error = %error,
                    "Pattern failed to compile; it will match nothing"
                );
                let kind = PatternKind::detect(&record.pattern);
                Self::assemble(record, kind, Matcher::Never)
            }
        }
    }

    fn assemble(record: &PatternRecord, kind: PatternKind, matcher: Matcher) -> Self {
        let raw = record.pattern.clone();
        let id = record
            .metadata
            .resource_id
            .clone()
            .unwrap_or_else(|| raw.clone());
        Self {
            specificity: specificity(kind, &raw),
            raw,
            id,
            kind,
            metadata: record.metadata.clone(),
            matcher,
        }
    }

    /// Original pattern text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Identifier reported as `Resource::pattern_id`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Syntax family of the pattern.
    #[must_use]
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Precomputed ranking score.
    #[must_use]
    pub fn specificity(&self) -> i64 {
        self.specificity
    }

    /// Metadata copied into resolutions.
    #[must_use]
    pub fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }

    /// Declared parameter names in declaration order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        match &self.matcher {
            Matcher::Template { params, .. } | Matcher::Expression { params, .. } => params,
            Matcher::Exact(_) | Matcher::Prefix(_) | Matcher::Never => &[],
        }
    }

    /// Whether compilation failed and the pattern never matches.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.matcher, Matcher::Never)
    }

    /// Matches a normalized URL, returning the extracted parameters.
    ///
    /// The returned map holds exactly the declared parameter names. Named
    /// regex groups that did not participate in the match map to `""`.
    #[must_use]
    pub fn matches(&self, url: &str) -> Option<HashMap<String, String>> {
        match &self.matcher {
            Matcher::Exact(literal) => (url == literal).then(HashMap::new),
            Matcher::Prefix(prefix) => url.starts_with(prefix.as_str()).then(HashMap::new),
            Matcher::Template { regex, params } => {
                let captures = regex.captures(url)?;
                Some(
                    params
                        .iter()
                        .zip(captures.iter().skip(1))
                        .map(|(name, value)| {
                            (
                                name.clone(),
                                value.map_or_else(String::new, |m| m.as_str().to_string()),
                            )
                        })
                        .collect(),
                )
            }
            Matcher::Expression { regex, params } => {
                let captures = regex.captures(url)?;
                Some(
                    params
                        .iter()
                        .map(|name| {
                            (
                                name.clone(),
                                captures
                                    .name(name)
                                    .map_or_else(String::new, |m| m.as_str().to_string()),
                            )
                        })
                        .collect(),
                )
            }
            Matcher::Never => None,
        }
    }

    /// Matches a normalized URL and builds the resolved resource.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<Resource> {
        self.matches(url)
            .map(|params| Resource::from_metadata(url, &self.id, params, &self.metadata))
    }

    /// Builds the persisted record this pattern was compiled from.
    #[must_use]
    pub fn to_record(&self) -> PatternRecord {
        PatternRecord {
            pattern: self.raw.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Compiles records and sorts them by specificity, descending.
///
/// The sort is stable, so equally specific patterns keep registration order.
#[must_use]
pub fn compile_all(records: &[PatternRecord]) -> Vec<Pattern> {
    let mut patterns: Vec<Pattern> = records.iter().map(Pattern::compile_lenient).collect();
    patterns.sort_by(|a, b| b.specificity.cmp(&a.specificity));
    patterns
}
