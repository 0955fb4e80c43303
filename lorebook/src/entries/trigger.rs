//! Trigger conditions - keyword lists compiled into structured form.
//!
//! The storage layer keeps trigger logic as plain keyword strings (a phrase,
//! a `/pattern/flags` literal, a `word*` wildcard, or a logical-set directive
//! such as `NOT_ANY:[a, b]`). Those strings are parsed exactly once, when an
//! entry is first scanned, into a [`Trigger`] that the matcher evaluates
//! without re-parsing.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::MatchType;

/// Errors raised while compiling an entry's keyword list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TriggerError {
    /// A regex or wildcard keyword failed to compile.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A logical-set directive was not of the form `OP:[a, b, ...]`.
    #[error("malformed directive `{0}`")]
    MalformedDirective(String),

    /// The keyword list was empty (an entry that can never fire).
    #[error("entry has no keywords")]
    EmptyKeywords,
}

/// Logical operator applied to a group of plain-text terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermOp {
    /// At least one term must be present (the default for bare keywords).
    AnyOf,
    /// Every term must be present (`AND_ALL:[...]`).
    AllOf,
    /// No term may be present (`NOT_ANY:[...]`).
    NoneOf,
}

/// A group of terms joined under one operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermGroup {
    pub op: TermOp,
    pub terms: Vec<String>,
}

/// A compiled regex alongside the keyword string it came from, so match
/// reporting can name the original keyword.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    pub regex: Regex,
}

/// A parsed trigger condition, decided at load time.
///
/// Mixed keyword lists (bare terms plus directives) become multiple
/// [`TermGroup`]s; a trigger matches only when every group is satisfied.
#[derive(Debug, Clone)]
pub enum Trigger {
    Contains {
        groups: Vec<TermGroup>,
        case_sensitive: bool,
        whole_word: bool,
    },
    Regex {
        patterns: Vec<CompiledPattern>,
    },
    Wildcard {
        patterns: Vec<CompiledPattern>,
    },
}

impl Trigger {
    /// Compile a keyword list into a trigger.
    pub fn parse(
        keywords: &[String],
        match_type: MatchType,
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Self, TriggerError> {
        if keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(TriggerError::EmptyKeywords);
        }

        match match_type {
            MatchType::Contains => {
                Self::parse_contains(keywords, case_sensitive, whole_word)
            }
            MatchType::Regex => {
                let patterns = keywords
                    .iter()
                    .filter(|k| !k.trim().is_empty())
                    .map(|k| compile_regex_literal(k, case_sensitive, whole_word))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Trigger::Regex { patterns })
            }
            MatchType::Wildcard => {
                let patterns = keywords
                    .iter()
                    .filter(|k| !k.trim().is_empty())
                    .map(|k| compile_wildcard(k, case_sensitive))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Trigger::Wildcard { patterns })
            }
        }
    }

    fn parse_contains(
        keywords: &[String],
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Self, TriggerError> {
        let mut groups = Vec::new();
        let mut any_terms = Vec::new();

        for keyword in keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }

            if let Some(rest) = keyword.strip_prefix("AND_ALL:") {
                groups.push(TermGroup {
                    op: TermOp::AllOf,
                    terms: parse_directive_terms(keyword, rest, case_sensitive)?,
                });
            } else if let Some(rest) = keyword.strip_prefix("NOT_ANY:") {
                groups.push(TermGroup {
                    op: TermOp::NoneOf,
                    terms: parse_directive_terms(keyword, rest, case_sensitive)?,
                });
            } else {
                any_terms.push(fold_case(keyword, case_sensitive));
            }
        }

        if !any_terms.is_empty() {
            groups.push(TermGroup {
                op: TermOp::AnyOf,
                terms: any_terms,
            });
        }

        if groups.is_empty() {
            return Err(TriggerError::EmptyKeywords);
        }

        Ok(Trigger::Contains {
            groups,
            case_sensitive,
            whole_word,
        })
    }

    /// All keyword strings this trigger was compiled from, for reporting.
    pub fn keyword_sources(&self) -> Vec<&str> {
        match self {
            Trigger::Contains { groups, .. } => groups
                .iter()
                .flat_map(|g| g.terms.iter().map(String::as_str))
                .collect(),
            Trigger::Regex { patterns } | Trigger::Wildcard { patterns } => {
                patterns.iter().map(|p| p.source.as_str()).collect()
            }
        }
    }
}

/// Parse the `[a, b, c]` payload of a logical-set directive.
fn parse_directive_terms(
    full: &str,
    payload: &str,
    case_sensitive: bool,
) -> Result<Vec<String>, TriggerError> {
    let payload = payload.trim();
    let inner = payload
        .strip_prefix('[')
        .and_then(|p| p.strip_suffix(']'))
        .ok_or_else(|| TriggerError::MalformedDirective(full.to_string()))?;

    let terms: Vec<String> = inner
        .split(',')
        .map(|t| fold_case(t.trim(), case_sensitive))
        .filter(|t| !t.is_empty())
        .collect();

    if terms.is_empty() {
        return Err(TriggerError::MalformedDirective(full.to_string()));
    }
    Ok(terms)
}

fn fold_case(term: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        term.to_string()
    } else {
        term.to_lowercase()
    }
}

/// Compile a `/pattern/flags` literal (or a bare pattern) into a regex.
///
/// Supported flags: `i` (case-insensitive), `s` (dot matches newline),
/// `m` (multi-line), `x` (ignore whitespace). Unknown flags are rejected.
fn compile_regex_literal(
    keyword: &str,
    case_sensitive: bool,
    whole_word: bool,
) -> Result<CompiledPattern, TriggerError> {
    let keyword = keyword.trim();
    let (pattern, flags) = match split_regex_literal(keyword) {
        Some((pat, flags)) => (pat.to_string(), flags.to_string()),
        None => (keyword.to_string(), String::new()),
    };

    let mut builder_pattern = pattern;
    if whole_word {
        builder_pattern = format!(r"\b(?:{})\b", builder_pattern);
    }

    let mut builder = RegexBuilder::new(&builder_pattern);
    builder.case_insensitive(!case_sensitive);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            other => {
                return Err(TriggerError::MalformedDirective(format!(
                    "unknown regex flag `{}` in `{}`",
                    other, keyword
                )));
            }
        }
    }

    let regex = builder.build().map_err(|e| TriggerError::InvalidPattern {
        pattern: keyword.to_string(),
        message: e.to_string(),
    })?;

    Ok(CompiledPattern {
        source: keyword.to_string(),
        regex,
    })
}

/// Split `/pattern/flags` into its parts; `None` if not slash-delimited.
fn split_regex_literal(keyword: &str) -> Option<(&str, &str)> {
    let rest = keyword.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    Some((&rest[..end], &rest[end + 1..]))
}

/// Compile a `word*` wildcard into a regex: `*` matches any run of
/// characters, `?` matches a single character, everything else is literal.
/// The pattern is anchored to word boundaries, so `cat*` fires on "cats"
/// but not mid-word inside "concatenate"; `whole_word` adds nothing beyond
/// the anchoring this mode already has.
fn compile_wildcard(keyword: &str, case_sensitive: bool) -> Result<CompiledPattern, TriggerError> {
    let keyword = keyword.trim();
    let mut pattern = String::new();
    for ch in keyword.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    let pattern = format!(r"\b(?:{})\b", pattern);

    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| TriggerError::InvalidPattern {
            pattern: keyword.to_string(),
            message: e.to_string(),
        })?;

    Ok(CompiledPattern {
        source: keyword.to_string(),
        regex,
    })
}
