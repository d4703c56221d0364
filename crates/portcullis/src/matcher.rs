//! Decide whether security applies to a request at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use http::Method;
use regex::Regex;

use crate::config::MatcherRule;
use crate::context::WebContext;
use crate::error::{Error, Result};

/// `true` means the request is subject to security.
pub trait Matcher: Send + Sync + 'static {
    /// Whether security applies.
    fn matches(&self, ctx: &WebContext) -> bool;
}

/// Excludes paths from security.
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    excluded_paths: BTreeSet<String>,
    excluded_patterns: Vec<Regex>,
}

impl PathMatcher {
    /// A matcher that excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude an exact path.
    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.excluded_paths.insert(path.into());
        self
    }

    /// Exclude paths fully matching a regular expression.
    pub fn exclude_pattern(mut self, pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored)
            .map_err(|e| Error::config(format!("invalid path pattern '{pattern}': {e}")))?;
        self.excluded_patterns.push(regex);
        Ok(self)
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, ctx: &WebContext) -> bool {
        let path = ctx.path();
        !(self.excluded_paths.contains(path)
            || self.excluded_patterns.iter().any(|re| re.is_match(path)))
    }
}

/// Applies security only to listed methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    /// Match the given methods.
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, ctx: &WebContext) -> bool {
        self.methods.contains(ctx.method())
    }
}

/// Instantiate a configured rule.
pub fn from_rule(rule: &MatcherRule) -> Result<Arc<dyn Matcher>> {
    match rule {
        MatcherRule::Path {
            exclude_paths,
            exclude_patterns,
        } => {
            let mut matcher = exclude_paths
                .iter()
                .fold(PathMatcher::new(), |m, p| m.exclude_path(p.clone()));
            for pattern in exclude_patterns {
                matcher = matcher.exclude_pattern(pattern)?;
            }
            Ok(Arc::new(matcher))
        }
        MatcherRule::Method { methods } => {
            let methods = methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                        .map_err(|e| Error::config(format!("invalid method '{m}': {e}")))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Arc::new(MethodMatcher::new(methods)))
        }
    }
}
