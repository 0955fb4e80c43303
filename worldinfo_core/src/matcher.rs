//! Keyword Matcher - evaluates one entry's trigger condition against text.
//!
//! Every function here is a pure function of (text, entry); there is no
//! hidden state, so concurrent scan passes may call in freely.

use lorebook::{TermOp, Trigger, WorldInfoEntry};

/// Evaluate an entry's trigger against a text window.
///
/// Returns the keywords that matched, or `None` if the trigger is not
/// satisfied. A malformed trigger never matches.
pub fn evaluate(text: &str, entry: &WorldInfoEntry) -> Option<Vec<String>> {
    let trigger = entry.trigger().ok()?;

    match trigger {
        Trigger::Contains {
            groups,
            case_sensitive,
            whole_word,
        } => {
            let folded;
            let haystack = if *case_sensitive {
                text
            } else {
                folded = text.to_lowercase();
                &folded
            };

            let mut matched = Vec::new();
            for group in groups {
                match group.op {
                    TermOp::AnyOf => {
                        let present: Vec<&str> = group
                            .terms
                            .iter()
                            .map(String::as_str)
                            .filter(|t| term_present(haystack, t, *whole_word))
                            .collect();
                        if present.is_empty() {
                            return None;
                        }
                        matched.extend(present.iter().map(|s| s.to_string()));
                    }
                    TermOp::AllOf => {
                        if !group
                            .terms
                            .iter()
                            .all(|t| term_present(haystack, t, *whole_word))
                        {
                            return None;
                        }
                        matched.extend(group.terms.iter().cloned());
                    }
                    TermOp::NoneOf => {
                        if group
                            .terms
                            .iter()
                            .any(|t| term_present(haystack, t, *whole_word))
                        {
                            return None;
                        }
                    }
                }
            }
            Some(matched)
        }
        Trigger::Regex { patterns } | Trigger::Wildcard { patterns } => {
            let matched: Vec<String> = patterns
                .iter()
                .filter(|p| p.regex.is_match(text))
                .map(|p| p.source.clone())
                .collect();
            if matched.is_empty() {
                None
            } else {
                Some(matched)
            }
        }
    }
}

/// Whether an entry's trigger is satisfied by the given text.
pub fn matches(text: &str, entry: &WorldInfoEntry) -> bool {
    evaluate(text, entry).is_some()
}

/// Substring presence check; with `whole_word`, the occurrence must not be
/// flanked by alphanumeric characters.
fn term_present(haystack: &str, term: &str, whole_word: bool) -> bool {
    if term.is_empty() {
        return false;
    }
    if !whole_word {
        return haystack.contains(term);
    }

    haystack.match_indices(term).any(|(start, found)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[start + found.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
