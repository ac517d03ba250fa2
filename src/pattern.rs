// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Compilation of the rewrite pattern and discovery of its capture groups.

use regex::Regex;
use thiserror::Error;

/// Error returned when the configured rewrite pattern is not a valid regular
/// expression
///
/// This is fatal for handler creation, no partially compiled pattern is ever
/// handed out.
#[derive(Debug, Error)]
#[error("invalid rewrite pattern {pattern:?}: {source}")]
pub struct InvalidPatternError {
    pattern: String,
    source: regex::Error,
}

impl InvalidPatternError {
    /// Returns the pattern source that failed to compile.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// A rewrite pattern compiled once at handler creation
///
/// Next to the compiled regular expression this keeps everything the rewrite
/// engine needs to bind capture groups for a match: the number of capturing
/// groups and the identifiers of the named groups declared in the pattern.
/// Instances are immutable and can be shared freely between concurrent
/// responses.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    group_count: usize,
    named_groups: Vec<String>,
}

impl CompiledPattern {
    /// Compiles the given pattern source.
    ///
    /// The named capture groups declared in the pattern are enumerated here,
    /// ordered by identifier and deduplicated. Compiling the same source
    /// twice always produces the same group set, regardless of where the
    /// groups appear in the pattern.
    pub fn compile(pattern: &str) -> Result<Self, InvalidPatternError> {
        let regex = Regex::new(pattern).map_err(|source| InvalidPatternError {
            pattern: pattern.to_owned(),
            source,
        })?;

        let mut named_groups: Vec<_> = regex
            .capture_names()
            .flatten()
            .map(str::to_owned)
            .collect();
        named_groups.sort();
        named_groups.dedup();

        // captures_len() counts the implicit group 0 spanning the whole match
        let group_count = regex.captures_len() - 1;

        Ok(Self {
            regex,
            group_count,
            named_groups,
        })
    }

    /// Returns the pattern source this instance was compiled from.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns the number of capturing groups in the pattern, not counting
    /// the implicit group spanning the whole match.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    /// Iterates over the named capture groups declared in the pattern,
    /// ordered by identifier.
    pub fn named_groups(&self) -> impl Iterator<Item = &str> {
        self.named_groups.iter().map(String::as_str)
    }

    pub(crate) fn regex(&self) -> &Regex {
        &self.regex
    }
}
