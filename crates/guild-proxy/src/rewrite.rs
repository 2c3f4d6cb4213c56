//! Ordered regex path rewriting

use regex::Regex;

/// A single `pattern -> replacement` rule.
///
/// The replacement may reference capture groups (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Applies rules in declaration order, each to the output of the previous one.
#[derive(Debug, Clone, Default)]
pub struct PathRewriter {
    rules: Vec<RewriteRule>,
}

impl PathRewriter {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// Rewrite `path`, substituting the first match of each rule.
    pub fn rewrite(&self, path: &str) -> String {
        self.rules.iter().fold(path.to_string(), |acc, rule| {
            rule.pattern
                .replace(&acc, rule.replacement.as_str())
                .into_owned()
        })
    }
}
