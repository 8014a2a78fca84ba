//! Path-pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile a route pattern (`seg/evs/:method`, `seg/next-integrations/*`)
//!   into a token list at construction time
//! - Match absolute request paths against the compiled tokens
//! - Capture named parameters into a string map
//!
//! # Design Decisions
//! - Tokenizer instead of regex string-surgery; same external behavior,
//!   no escaping rules to get wrong
//! - Matching anchors the full path and is case-sensitive
//! - A `:name` parameter captures exactly one segment (never crosses `/`);
//!   dots inside the segment are literal, so `bundle.umd.min.js` is
//!   captured whole
//! - A trailing `*` matches a possibly-empty remainder, so both
//!   `/next-integrations` and `/next-integrations/a/b.js.gz` match

use std::collections::HashMap;

/// Captured `:name` parameters, keyed by parameter name.
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Literal path segment, compared byte-for-byte.
    Literal(String),
    /// Named single-segment capture.
    Param(String),
    /// Trailing wildcard; matches any (possibly empty) remainder.
    Wildcard,
}

/// A compiled path pattern. Immutable once compiled, safe to share.
#[derive(Debug, Clone)]
pub struct PathPattern {
    tokens: Vec<Token>,
}

impl PathPattern {
    /// Compile a pattern. Segments starting with `:` become named captures,
    /// a bare `*` segment becomes a wildcard. Leading/trailing slashes and
    /// empty segments are ignored, so `seg/reset` and `/seg/reset/` compile
    /// identically.
    pub fn compile(pattern: &str) -> Self {
        let tokens = pattern
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                if segment == "*" {
                    Token::Wildcard
                } else if let Some(name) = segment.strip_prefix(':') {
                    Token::Param(name.to_string())
                } else {
                    Token::Literal(segment.to_string())
                }
            })
            .collect();

        Self { tokens }
    }

    /// Match an absolute request path. Returns the captured parameters on
    /// success, `None` when the path does not match.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = PathParams::new();
        let mut cursor = 0;

        for token in &self.tokens {
            match token {
                Token::Wildcard => {
                    // Wildcard is always terminal; it swallows whatever is
                    // left, including nothing.
                    return Some(params);
                }
                Token::Literal(literal) => {
                    if segments.get(cursor).copied() != Some(literal.as_str()) {
                        return None;
                    }
                    cursor += 1;
                }
                Token::Param(name) => {
                    let segment = segments.get(cursor)?;
                    params.insert(name.clone(), (*segment).to_string());
                    cursor += 1;
                }
            }
        }

        // Anchored match: the path must be fully consumed.
        if cursor == segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_is_anchored() {
        let pattern = PathPattern::compile("seg/personas");
        assert!(pattern.matches("/seg/personas").is_some());
        assert!(pattern.matches("/seg/personas/extra").is_none());
        assert!(pattern.matches("/seg").is_none());
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let pattern = PathPattern::compile("seg/reset");
        assert!(pattern.matches("/seg/reset/").is_some());
    }

    #[test]
    fn matching_is_case_sensitive() {
        let pattern = PathPattern::compile("seg/personas");
        assert!(pattern.matches("/seg/Personas").is_none());
    }

    #[test]
    fn param_captures_one_segment() {
        let pattern = PathPattern::compile("seg/evs/:method");
        let params = pattern.matches("/seg/evs/t").unwrap();
        assert_eq!(params.get("method").map(String::as_str), Some("t"));
        assert!(pattern.matches("/seg/evs/t/extra").is_none());
        assert!(pattern.matches("/seg/evs").is_none());
    }

    #[test]
    fn param_captures_dotted_bundle_names_whole() {
        let pattern = PathPattern::compile("seg/analytics-next/bundles/:bundleName");
        let params = pattern
            .matches("/seg/analytics-next/bundles/schemaFilter.bundle.a1b2c3.js")
            .unwrap();
        assert_eq!(
            params.get("bundleName").map(String::as_str),
            Some("schemaFilter.bundle.a1b2c3.js")
        );
    }

    #[test]
    fn wildcard_matches_nested_remainder() {
        let pattern = PathPattern::compile("seg/next-integrations/*");
        assert!(pattern
            .matches("/seg/next-integrations/actions/amplitude/abc123.js")
            .is_some());
        assert!(pattern
            .matches("/seg/next-integrations/integrations/braze/2.1/braze.js.gz")
            .is_some());
    }

    #[test]
    fn wildcard_matches_empty_remainder() {
        let pattern = PathPattern::compile("seg/next-integrations/*");
        assert!(pattern.matches("/seg/next-integrations").is_some());
        assert!(pattern.matches("/seg/next-integrations/").is_some());
    }

    #[test]
    fn bare_wildcard_matches_anything() {
        let pattern = PathPattern::compile("*");
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/any/path/at/all").is_some());
    }
}
