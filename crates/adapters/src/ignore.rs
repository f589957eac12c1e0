//! Glob ignore matcher with deterministic normalization.
//!
//! The rule grammar is a gitignore subset:
//! - a pattern ending in `/` matches any path segment equal to the prefix
//! - a pattern containing `/` matches the whole relative path
//! - anything else matches the final path segment
//!
//! `*` matches a run of non-separator characters; matching is anchored at
//! both ends.

use codeatlas_ports::{IgnoreMatchInput, IgnorePort};

/// Ignore matcher over normalized forward-slash paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobIgnoreMatcher;

impl GlobIgnoreMatcher {
    /// Build a matcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Match one path against one pattern (both normalized).
    #[must_use]
    pub fn matches_pattern(relative_path: &str, pattern: &str) -> bool {
        let path = normalize_path(relative_path);
        let pattern = pattern.trim();
        if pattern.is_empty() || path.is_empty() {
            return false;
        }

        if let Some(prefix) = pattern.strip_suffix('/') {
            return path
                .split('/')
                .any(|segment| glob_match(prefix, segment));
        }

        if pattern.contains('/') {
            return glob_match(pattern.trim_start_matches("./"), &path);
        }

        let basename = path.rsplit('/').next().unwrap_or(path.as_str());
        glob_match(pattern, basename)
    }
}

impl IgnorePort for GlobIgnoreMatcher {
    fn is_ignored(&self, input: &IgnoreMatchInput) -> bool {
        input
            .ignore_patterns
            .iter()
            .any(|pattern| Self::matches_pattern(&input.relative_path, pattern))
    }
}

fn normalize_path(input: &str) -> String {
    let replaced = input.trim().replace('\\', "/");
    let trimmed = replaced.trim_start_matches("./");
    trimmed.trim_matches('/').to_owned()
}

/// Anchored glob match where `*` never crosses a separator.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest_pattern)) => {
            // Zero or more non-separator characters.
            let mut consumed = 0;
            loop {
                if match_from(rest_pattern, &text[consumed..]) {
                    return true;
                }
                match text.get(consumed) {
                    Some(&ch) if ch != '/' => consumed += 1,
                    _ => return false,
                }
            }
        },
        Some((&expected, rest_pattern)) => match text.split_first() {
            Some((&actual, rest_text)) if actual == expected => {
                match_from(rest_pattern, rest_text)
            },
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_ignored(path: &str, patterns: &[&str]) -> bool {
        let matcher = GlobIgnoreMatcher::new();
        matcher.is_ignored(&IgnoreMatchInput {
            ignore_patterns: patterns.iter().map(|pattern| Box::from(*pattern)).collect(),
            relative_path: path.into(),
        })
    }

    #[test]
    fn directory_pattern_matches_any_segment() {
        assert!(is_ignored("node_modules/foo.js", &["node_modules/"]));
        assert!(is_ignored("src/node_modules/pkg/index.js", &["node_modules/"]));
        assert!(!is_ignored("src/node_modules_backup/x.js", &["node_modules/"]));
    }

    #[test]
    fn basename_pattern_is_anchored() {
        assert!(is_ignored("a/b/x.min.js", &["*.min.js"]));
        assert!(!is_ignored("x.min.jsx", &["*.min.js"]));
        assert!(!is_ignored("a/min.js.txt", &["*.min.js"]));
    }

    #[test]
    fn path_pattern_matches_whole_path() {
        assert!(is_ignored("src/generated/code.rs", &["src/generated/*.rs"]));
        assert!(!is_ignored("src/generated/deep/code.rs", &["src/generated/*.rs"]));
        assert!(!is_ignored("other/generated/code.rs", &["src/generated/*.rs"]));
    }

    #[test]
    fn star_does_not_cross_separators() {
        assert!(!is_ignored("src/deep/code.rs", &["src/*.rs"]));
        assert!(is_ignored("src/code.rs", &["src/*.rs"]));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(is_ignored("a+b.txt", &["a+b.txt"]));
        assert!(!is_ignored("aab.txt", &["a+b.txt"]));
        assert!(is_ignored("notes.(draft).md", &["*.(draft).md"]));
    }

    #[test]
    fn windows_separators_normalize() {
        assert!(is_ignored("target\\debug\\out.o", &["target/"]));
    }

    #[test]
    fn directory_prefix_may_contain_glob() {
        assert!(is_ignored("build-x64/obj.o", &["build-*/"]));
        assert!(!is_ignored("builds/obj.o", &["build-*/"]));
    }
}
