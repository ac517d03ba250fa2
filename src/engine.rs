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

//! The scan/replace loop applied to a single text value.

use regex::Captures;
use std::borrow::Cow;
use std::error::Error as StdError;
use thiserror::Error;

use crate::pattern::CompiledPattern;

/// Error returned when the template evaluator fails to render the
/// replacement for a match
///
/// The rewrite of the affected value is aborted as a whole, no partially
/// rewritten output is produced.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TemplateError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TemplateError {
    /// Creates a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new error wrapping the underlying evaluator failure.
    pub fn because(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// The capture groups of one pattern match, as handed to the template
/// evaluator
///
/// Positional groups are indexed from 1 like in the pattern itself; every
/// index up to [`group_count()`](Self::group_count) is valid. A group that
/// did not participate in the match is `None` rather than an error. The
/// binding only lives for the duration of one evaluator call; the next
/// match gets a fresh one, nothing carries over.
#[derive(Debug)]
pub struct MatchBinding<'p, 't> {
    positional: Vec<Option<&'t str>>,
    named: Vec<(&'p str, Option<&'t str>)>,
}

impl<'p, 't> MatchBinding<'p, 't> {
    fn new(pattern: &'p CompiledPattern, captures: &Captures<'t>) -> Self {
        let positional = (1..=pattern.group_count())
            .map(|index| captures.get(index).map(|group| group.as_str()))
            .collect();
        let named = pattern
            .named_groups()
            .map(|name| (name, captures.name(name).map(|group| group.as_str())))
            .collect();
        Self { positional, named }
    }

    /// Returns the value of the capturing group with the given 1-based
    /// index, `None` if the group did not participate in the match or the
    /// index is out of range.
    pub fn group(&self, index: usize) -> Option<&'t str> {
        index
            .checked_sub(1)
            .and_then(|index| self.positional.get(index))
            .copied()
            .flatten()
    }

    /// Returns the number of capturing groups in the pattern.
    pub fn group_count(&self) -> usize {
        self.positional.len()
    }

    /// Iterates over all positional group values in pattern order, starting
    /// with group 1.
    pub fn groups(&self) -> impl Iterator<Item = Option<&'t str>> + '_ {
        self.positional.iter().copied()
    }

    /// Returns the value the named capture group with the given identifier
    /// captured in the current match.
    pub fn named_group(&self, name: &str) -> Option<&'t str> {
        self.named
            .iter()
            .find(|(group_name, _)| *group_name == name)
            .and_then(|(_, value)| *value)
    }

    /// Iterates over the named capture groups in identifier order.
    pub fn named_groups(&self) -> impl Iterator<Item = (&'p str, Option<&'t str>)> + '_ {
        self.named.iter().copied()
    }
}

/// Renders the replacement template for one match
///
/// This crate deliberately implements no template language of its own. The
/// hosting gateway supplies the evaluator, typically backed by whatever
/// expression engine it already uses; a plain function or closure works as
/// well.
pub trait TemplateEvaluator {
    /// Renders `template` against the capture groups of the current match.
    fn evaluate(
        &self,
        template: &str,
        binding: &MatchBinding<'_, '_>,
    ) -> Result<String, TemplateError>;
}

impl<F> TemplateEvaluator for F
where
    F: Fn(&str, &MatchBinding<'_, '_>) -> Result<String, TemplateError>,
{
    fn evaluate(
        &self,
        template: &str,
        binding: &MatchBinding<'_, '_>,
    ) -> Result<String, TemplateError> {
        self(template, binding)
    }
}

/// Rewrites every match of `pattern` in `value`, replacing it with the
/// evaluator's rendering of `template`.
///
/// Matches are found left to right and never overlap; the text between
/// matches is copied through verbatim. A value without any match is returned
/// unchanged and borrowed. A zero-width match is replaced like any other but
/// the scan continues behind the following character, so patterns that can
/// match the empty string still terminate. If the evaluator fails, the whole
/// value's rewrite is abandoned.
pub fn rewrite<'v, E>(
    pattern: &CompiledPattern,
    template: &str,
    value: &'v str,
    evaluator: &E,
) -> Result<Cow<'v, str>, TemplateError>
where
    E: TemplateEvaluator + ?Sized,
{
    if value.is_empty() {
        return Ok(Cow::Borrowed(value));
    }

    let regex = pattern.regex();
    let mut captures = match regex.captures(value) {
        Some(captures) => captures,
        None => return Ok(Cow::Borrowed(value)),
    };

    let mut output = String::with_capacity(value.len());
    let mut cursor = 0;

    loop {
        // Group 0 spans the whole match and always participates
        let matched = captures.get(0).unwrap();

        output.push_str(&value[cursor..matched.start()]);

        let binding = MatchBinding::new(pattern, &captures);
        output.push_str(&evaluator.evaluate(template, &binding)?);

        cursor = matched.end();
        if matched.start() == matched.end() {
            // A zero-width match would be found at this offset again. Copy
            // the following character through and continue behind it.
            match value[cursor..].chars().next() {
                Some(next) => {
                    output.push(next);
                    cursor += next.len_utf8();
                }
                None => break,
            }
        }

        captures = match regex.captures_at(value, cursor) {
            Some(captures) => captures,
            None => break,
        };
    }

    output.push_str(&value[cursor..]);
    Ok(Cow::Owned(output))
}
