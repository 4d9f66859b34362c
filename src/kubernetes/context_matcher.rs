// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Context pattern matching and resolution
//!
//! Turns `--context` values and per-table `contexts` lists into concrete
//! context names known to the source connector.

use glob::Pattern;

use crate::error::{QueryError, Result};

/// Selects every known context
pub const ALL_CONTEXTS: &str = "all";

/// Resolves context specifications to concrete context names
///
/// Supports:
/// - Exact names: "prod"
/// - Glob patterns: "prod-*", "staging-?", "eu-[ab]"
/// - Comma-separated lists: "prod, staging"
/// - The literal `all`
///
/// Matches keep the order of the specification; glob matches follow the
/// order of the available contexts. Duplicates are dropped.
pub struct ContextMatcher<'a> {
    available_contexts: &'a [String],
}

impl<'a> ContextMatcher<'a> {
    pub fn new(available_contexts: &'a [String]) -> Self {
        Self { available_contexts }
    }

    /// Resolve a set of (possibly comma-joined) specifications
    pub fn resolve_all<S: AsRef<str>>(&self, specs: &[S]) -> Result<Vec<String>> {
        let mut matched = Vec::new();
        for spec in specs {
            for ctx in self.resolve(spec.as_ref())? {
                if !matched.contains(&ctx) {
                    matched.push(ctx);
                }
            }
        }
        Ok(matched)
    }

    /// Resolve one specification
    ///
    /// Fails when an exact name is unknown or when nothing matches at all.
    pub fn resolve(&self, spec: &str) -> Result<Vec<String>> {
        let mut matched_contexts: Vec<String> = Vec::new();

        for part in spec.split(',') {
            let pattern = part.trim();
            if pattern.is_empty() {
                continue;
            }

            if pattern == ALL_CONTEXTS {
                for ctx in self.available_contexts {
                    if !matched_contexts.contains(ctx) {
                        matched_contexts.push(ctx.clone());
                    }
                }
            } else if is_glob(pattern) {
                let glob = Pattern::new(pattern).map_err(|e| {
                    QueryError::config("contexts", format!("bad pattern '{}': {}", pattern, e))
                })?;
                for ctx in self.available_contexts {
                    if glob.matches(ctx) && !matched_contexts.contains(ctx) {
                        matched_contexts.push(ctx.clone());
                    }
                }
            } else if self.available_contexts.iter().any(|c| c == pattern) {
                if !matched_contexts.iter().any(|c| c == pattern) {
                    matched_contexts.push(pattern.to_string());
                }
            } else {
                return Err(QueryError::config(
                    "contexts",
                    format!("context '{}' not found", pattern),
                ));
            }
        }

        if matched_contexts.is_empty() {
            return Err(QueryError::config(
                "contexts",
                format!("no contexts matched pattern '{}'", spec),
            ));
        }

        Ok(matched_contexts)
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}
