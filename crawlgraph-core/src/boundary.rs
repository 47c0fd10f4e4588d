use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use tracing::warn;

use crate::graph::Diagnostic;

const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Compile a boundary pattern. Patterns must match at the start of the URL,
/// the same rule the crawler uses when deciding what to enqueue.
///
/// The syntax is the `regex` crate's. Lookaround and backreferences are not
/// supported, so patterns using them fail to compile and are treated as
/// invalid: they match nothing and surface as `InvalidBoundaryPattern`.
pub fn compile_boundary(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{})", pattern))
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
}

/// One-off check. An invalid pattern never matches.
pub fn matches(url: &str, pattern: &str) -> bool {
    match compile_boundary(pattern) {
        Ok(re) => re.is_match(url),
        Err(e) => {
            warn!("Invalid boundary pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// Boundary checks for one build pass. Each distinct pattern is compiled once
/// and an invalid one is reported once.
#[derive(Debug, Default)]
pub struct BoundaryMatcher {
    compiled: HashMap<String, Option<Regex>>,
    diagnostics: Vec<Diagnostic>,
}

impl BoundaryMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&mut self, url: &str, pattern: &str) -> bool {
        if !self.compiled.contains_key(pattern) {
            let compiled = match compile_boundary(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Invalid boundary pattern '{}': {}", pattern, e);
                    self.diagnostics.push(Diagnostic::InvalidBoundaryPattern {
                        pattern: pattern.to_string(),
                        error: e.to_string(),
                    });
                    None
                }
            };
            self.compiled.insert(pattern.to_string(), compiled);
        }

        self.compiled
            .get(pattern)
            .and_then(Option::as_ref)
            .is_some_and(|re| re.is_match(url))
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
