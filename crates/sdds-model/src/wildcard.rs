use globset::{GlobBuilder, GlobMatcher};

use crate::error::SchemaError;

/// Whether `text` contains any glob metacharacter.
pub fn has_wildcards(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// A shell-style name pattern (`*`, `?`, `[...]`, `\` escapes).
///
/// Patterns without metacharacters compare by plain equality.
#[derive(Clone, Debug)]
pub struct WildcardPattern {
    pattern: String,
    case_insensitive: bool,
    matcher: Option<GlobMatcher>,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Result<Self, SchemaError> {
        Self::build(pattern, false)
    }

    pub fn case_insensitive(pattern: &str) -> Result<Self, SchemaError> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self, SchemaError> {
        if !has_wildcards(pattern) && !pattern.contains('\\') {
            return Ok(Self {
                pattern: pattern.to_string(),
                case_insensitive,
                matcher: None,
            });
        }
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|source| SchemaError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            case_insensitive,
            matcher: Some(glob.compile_matcher()),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_literal(&self) -> bool {
        self.matcher.is_none()
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.matcher {
            Some(m) => m.is_match(text),
            None if self.case_insensitive => self.pattern.eq_ignore_ascii_case(text),
            None => self.pattern == text,
        }
    }

    /// Names from `names` matching this pattern, in their original order.
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        names.into_iter().filter(|n| self.is_match(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_forms() {
        let p = WildcardPattern::new("x*").expect("pattern");
        assert!(p.is_match("x"));
        assert!(p.is_match("x/y"));
        assert!(!p.is_match("yx"));

        let ranged = WildcardPattern::new("BPM[1-3]").expect("pattern");
        assert!(ranged.is_match("BPM2"));
        assert!(!ranged.is_match("BPM4"));

        let one = WildcardPattern::new("a?c").expect("pattern");
        assert!(one.is_match("abc"));
        assert!(!one.is_match("ac"));
    }

    #[test]
    fn escapes_and_case() {
        let p = WildcardPattern::new(r"a\*").expect("pattern");
        assert!(p.is_match("a*"));
        assert!(!p.is_match("ab"));

        let ci = WildcardPattern::case_insensitive("Ab*").expect("pattern");
        assert!(ci.is_match("abc"));
        assert!(WildcardPattern::case_insensitive("Name").expect("literal").is_match("NAME"));
        assert!(!WildcardPattern::new("Name").expect("literal").is_match("NAME"));
    }

    #[test]
    fn invalid_class_is_reported() {
        let err = WildcardPattern::new("a[").expect_err("unclosed class");
        assert!(matches!(err, SchemaError::InvalidPattern { .. }), "{err}");
    }
}
