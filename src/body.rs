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

//! Buffering of the response body and the end-of-stream rewrite.

use bytes::{Bytes, BytesMut};
use log::{trace, warn};
use std::borrow::Cow;

use crate::engine::{self, TemplateError, TemplateEvaluator};
use crate::pattern::CompiledPattern;

/// Collects the chunks of one response body until the stream ends
///
/// The pattern is applied to the body as a whole: a match can span chunk
/// boundaries, so no output can be produced before the body was received
/// completely. Memory use is proportional to the body size; that is the
/// price of rewriting across chunk boundaries, not an accident. The buffer
/// belongs to exactly one in-flight response and is consumed exactly once;
/// if the response is cancelled it is dropped without ever flushing.
#[derive(Debug, Default)]
pub struct BodyBuffer {
    buffer: BytesMut,
}

impl BodyBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a body chunk to the buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns `true` if no body bytes were received so far.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the buffer, rewriting the accumulated body in one pass.
    ///
    /// Returns the single chunk to be sent in place of the original body.
    /// `None` means there is no chunk to send at all: an empty body stays
    /// empty instead of being run through the template. A body that isn't
    /// valid UTF-8 is passed through unchanged.
    pub fn finish<E>(
        self,
        pattern: &CompiledPattern,
        template: &str,
        evaluator: &E,
    ) -> Result<Option<Bytes>, TemplateError>
    where
        E: TemplateEvaluator + ?Sized,
    {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let body = self.buffer.freeze();
        let text = match std::str::from_utf8(&body) {
            Ok(text) => text,
            Err(err) => {
                warn!("Response body is not valid UTF-8 ({err}), passing it through unchanged");
                return Ok(Some(body));
            }
        };

        let rewritten = match engine::rewrite(pattern, template, text, evaluator)? {
            Cow::Owned(rewritten) => Some(rewritten),
            Cow::Borrowed(_) => None,
        };

        match rewritten {
            Some(rewritten) => {
                trace!(
                    "Rewrote response body of {} bytes into {} bytes",
                    body.len(),
                    rewritten.len()
                );
                Ok(Some(rewritten.into()))
            }
            None => {
                trace!("No matches in response body, passing it through unchanged");
                Ok(Some(body))
            }
        }
    }
}
