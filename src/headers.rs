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

//! Applying the rewrite engine to response header values.

use http::header::{Entry, HeaderMap, HeaderName, HeaderValue};
use log::{trace, warn};
use std::borrow::Cow;

use crate::engine::{self, TemplateError, TemplateEvaluator};
use crate::pattern::CompiledPattern;

/// Rewrites every value of every header in the map.
///
/// Each value is rewritten independently with its own sequence of match
/// bindings, so repeated headers like `Set-Cookie` keep their multiplicity
/// and order. The set of header names is captured up front, rewriting
/// changes values but never which names exist. Values that aren't valid header
/// text are left alone; a failing template evaluation aborts immediately and
/// the response should not be sent.
pub fn rewrite_headers<E>(
    headers: &mut HeaderMap,
    pattern: &CompiledPattern,
    template: &str,
    evaluator: &E,
) -> Result<(), TemplateError>
where
    E: TemplateEvaluator + ?Sized,
{
    let names: Vec<HeaderName> = headers.keys().cloned().collect();

    for name in names {
        let mut rewritten = Vec::new();
        let mut changed = false;

        for value in headers.get_all(&name) {
            let text = match value.to_str() {
                Ok(text) => text,
                Err(_) => {
                    // Opaque bytes, nothing the pattern could match on
                    trace!("Leaving non-text value of header {name} unchanged");
                    rewritten.push(value.clone());
                    continue;
                }
            };

            match engine::rewrite(pattern, template, text, evaluator)? {
                Cow::Borrowed(_) => rewritten.push(value.clone()),
                Cow::Owned(new_text) => match HeaderValue::from_str(&new_text) {
                    Ok(new_value) => {
                        trace!("Rewrote value of header {name} into {new_text:?}");
                        changed = true;
                        rewritten.push(new_value);
                    }
                    Err(_) => {
                        warn!(
                            "Rewritten value {new_text:?} of header {name} is not a valid \
                             header value, keeping the original"
                        );
                        rewritten.push(value.clone());
                    }
                },
            }
        }

        if !changed {
            continue;
        }

        // Replacing the values through the entry keeps the name's position
        // in the map, the entry is never vacated.
        if let Entry::Occupied(mut entry) = headers.entry(name) {
            let mut values = rewritten.into_iter();
            if let Some(first) = values.next() {
                entry.insert(first);
                for value in values {
                    entry.append(value);
                }
            }
        }
    }

    Ok(())
}
