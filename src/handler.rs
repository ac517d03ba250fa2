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

//! Handler wiring the rewrite engine into the response processing phases of
//! the hosting server.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use log::debug;

use crate::body::BodyBuffer;
use crate::configuration::RewriteConf;
use crate::engine::{TemplateError, TemplateEvaluator};
use crate::headers::rewrite_headers;
use crate::pattern::{CompiledPattern, InvalidPatternError};

/// Handler rewriting response headers and bodies
///
/// One instance is created per configuration and shared by all in-flight
/// responses; it only holds immutable state, the pattern is compiled once at
/// creation. Everything that changes per response lives in
/// [`ResponseRewriteCtx`].
#[derive(Debug)]
pub struct ResponseRewriteHandler<E> {
    pattern: CompiledPattern,
    template: String,
    rewrite_headers: bool,
    rewrite_body: bool,
    evaluator: E,
}

/// Per-response state of [`ResponseRewriteHandler`]
///
/// Owned exclusively by one response, never shared or pooled. If the
/// response is cancelled, dropping the context discards any buffered body
/// without flushing it.
#[derive(Debug, Default)]
pub struct ResponseRewriteCtx {
    buffer: Option<BodyBuffer>,
}

impl<E: TemplateEvaluator> ResponseRewriteHandler<E> {
    /// Creates a handler from its configuration and the host's template
    /// evaluator.
    ///
    /// The pattern is compiled here, once. An invalid pattern fails handler
    /// creation, there is no handler to retry with.
    pub fn new(conf: RewriteConf, evaluator: E) -> Result<Self, InvalidPatternError> {
        debug!("Response rewrite configuration received: {conf:#?}");

        let pattern = CompiledPattern::compile(&conf.from_regex)?;
        Ok(Self {
            pattern,
            template: conf.to_replacement,
            rewrite_headers: conf.rewrite_response_headers,
            rewrite_body: conf.rewrite_response_body,
            evaluator,
        })
    }

    /// Creates the state for a new response.
    pub fn new_ctx() -> ResponseRewriteCtx {
        ResponseRewriteCtx::default()
    }

    /// Handler for the `response_filter` phase, to be called with the
    /// response headers before they are sent downstream.
    ///
    /// Rewrites the header values if enabled. If body rewriting is enabled,
    /// the response is re-framed here: the body length after rewriting isn't
    /// known in advance, so the original `Content-Length` no longer applies
    /// and the transfer becomes chunked. This has to happen before any body
    /// chunk passes through
    /// [`response_body_filter`](Self::response_body_filter).
    pub fn response_filter(&self, headers: &mut HeaderMap) -> Result<(), TemplateError> {
        if self.rewrite_headers {
            rewrite_headers(headers, &self.pattern, &self.template, &self.evaluator)?;
        }

        if self.rewrite_body {
            headers.remove(header::CONTENT_LENGTH);
            headers.insert(
                header::TRANSFER_ENCODING,
                HeaderValue::from_static("chunked"),
            );
        }

        Ok(())
    }

    /// Handler for the `response_body_filter` phase, to be called for every
    /// body chunk with `end_of_stream` set on the last call.
    ///
    /// Buffers all chunks without emitting anything. When the stream ends,
    /// the complete body is rewritten in one pass and emitted as a single
    /// chunk; an empty body produces no chunk, only the end of the stream
    /// propagates.
    pub fn response_body_filter(
        &self,
        body: &mut Option<Bytes>,
        end_of_stream: bool,
        ctx: &mut ResponseRewriteCtx,
    ) -> Result<(), TemplateError> {
        if !self.rewrite_body {
            return Ok(());
        }

        let buffer = ctx.buffer.get_or_insert_with(BodyBuffer::new);
        if let Some(chunk) = body.take() {
            buffer.push(&chunk);
        }

        if end_of_stream {
            if let Some(buffer) = ctx.buffer.take() {
                *body = buffer.finish(&self.pattern, &self.template, &self.evaluator)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::MatchBinding;
    use http::header::HeaderName;
    use test_log::test;

    fn eval(template: &str, binding: &MatchBinding<'_, '_>) -> Result<String, TemplateError> {
        Ok(template.replace("{group[1]}", binding.group(1).unwrap_or("")))
    }

    type Handler =
        ResponseRewriteHandler<fn(&str, &MatchBinding<'_, '_>) -> Result<String, TemplateError>>;

    fn make_handler(conf: &str) -> Handler {
        let evaluator: fn(&str, &MatchBinding<'_, '_>) -> Result<String, TemplateError> = eval;
        ResponseRewriteHandler::new(serde_yaml::from_str(conf).unwrap(), evaluator).unwrap()
    }

    fn make_headers(entries: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for &(name, value) in entries {
            headers.append(
                HeaderName::try_from(name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn invalid_pattern_fails_creation() {
        let conf: RewriteConf = serde_yaml::from_str(r#"from_regex: "(unclosed""#).unwrap();
        assert!(ResponseRewriteHandler::new(conf, eval).is_err());
    }

    #[test]
    fn rewrites_location_header() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/]*/(.*)"
                to_replacement: "https://apis.example.com/{group[1]}"
                rewrite_response_headers: true
            "#,
        );

        let mut headers = make_headers(&[
            ("Location", "https://localgateway/mypath"),
            ("Content-Type", "text/html"),
        ]);
        handler.response_filter(&mut headers).unwrap();

        assert_eq!(
            headers.get("Location").unwrap(),
            "https://apis.example.com/mypath"
        );
        assert_eq!(headers.get("Content-Type").unwrap(), "text/html");
        assert!(headers.get("Transfer-Encoding").is_none());
    }

    #[test]
    fn header_rewriting_disabled() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/]*/(.*)"
                to_replacement: "https://apis.example.com/{group[1]}"
            "#,
        );

        let mut headers = make_headers(&[("Location", "https://localgateway/mypath")]);
        handler.response_filter(&mut headers).unwrap();

        assert_eq!(
            headers.get("Location").unwrap(),
            "https://localgateway/mypath"
        );
    }

    #[test]
    fn body_rewriting_reframes_response() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/]*/(.*)"
                to_replacement: "https://apis.example.com/{group[1]}"
                rewrite_response_body: true
            "#,
        );

        let mut headers = make_headers(&[
            ("Content-Type", "application/json"),
            ("Content-Length", "42"),
        ]);
        handler.response_filter(&mut headers).unwrap();

        assert!(headers.get("Content-Length").is_none());
        assert_eq!(headers.get("Transfer-Encoding").unwrap(), "chunked");
        assert_eq!(headers.get("Content-Type").unwrap(), "application/json");
    }

    #[test]
    fn body_buffered_until_end_of_stream() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/ ]*/([^ ]*)"
                to_replacement: "https://apis.example.com/{group[1]}"
                rewrite_response_body: true
            "#,
        );
        let mut ctx = Handler::new_ctx();

        let mut chunk = Some(Bytes::from_static(b"response from backend url "));
        handler
            .response_body_filter(&mut chunk, false, &mut ctx)
            .unwrap();
        assert!(chunk.is_none());

        let mut chunk = Some(Bytes::from_static(b"https://mycompany.com/here or "));
        handler
            .response_body_filter(&mut chunk, false, &mut ctx)
            .unwrap();
        assert!(chunk.is_none());

        let mut chunk = Some(Bytes::from_static(b"https://mycompany.com/there"));
        handler
            .response_body_filter(&mut chunk, true, &mut ctx)
            .unwrap();
        assert_eq!(
            chunk.unwrap(),
            "response from backend url https://apis.example.com/here \
             or https://apis.example.com/there"
        );
    }

    #[test]
    fn end_of_stream_without_chunk() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/ ]*/([^ ]*)"
                to_replacement: "https://apis.example.com/{group[1]}"
                rewrite_response_body: true
            "#,
        );
        let mut ctx = Handler::new_ctx();

        let mut chunk = Some(Bytes::from_static(b"see https://localgateway/mypath"));
        handler
            .response_body_filter(&mut chunk, false, &mut ctx)
            .unwrap();
        assert!(chunk.is_none());

        let mut last = None;
        handler
            .response_body_filter(&mut last, true, &mut ctx)
            .unwrap();
        assert_eq!(last.unwrap(), "see https://apis.example.com/mypath");
    }

    #[test]
    fn empty_body_stays_empty() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/]*/(.*)"
                to_replacement: "https://apis.example.com/{group[1]}"
                rewrite_response_body: true
            "#,
        );
        let mut ctx = Handler::new_ctx();

        let mut body = None;
        handler
            .response_body_filter(&mut body, true, &mut ctx)
            .unwrap();
        assert!(body.is_none());
    }

    #[test]
    fn body_rewriting_disabled_passes_chunks_through() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/]*/(.*)"
                to_replacement: "https://apis.example.com/{group[1]}"
            "#,
        );
        let mut ctx = Handler::new_ctx();

        let mut chunk = Some(Bytes::from_static(b"https://localgateway/mypath"));
        handler
            .response_body_filter(&mut chunk, false, &mut ctx)
            .unwrap();
        assert_eq!(chunk.unwrap(), "https://localgateway/mypath");
    }

    #[test]
    fn json_body_without_match_flushed_unchanged() {
        let handler = make_handler(
            r#"
                from_regex: "https?://[^/]*/(.*)"
                to_replacement: "https://apis.example.com/{group[1]}"
                rewrite_response_body: true
            "#,
        );
        let mut ctx = Handler::new_ctx();

        let mut chunk = Some(Bytes::from_static(b"{\"name\":1}"));
        handler
            .response_body_filter(&mut chunk, true, &mut ctx)
            .unwrap();
        assert_eq!(chunk.unwrap(), "{\"name\":1}");
    }

    #[test]
    fn evaluator_failure_fails_response() {
        fn failing(
            _template: &str,
            _binding: &MatchBinding<'_, '_>,
        ) -> Result<String, TemplateError> {
            Err(TemplateError::new("no such variable"))
        }

        let conf: RewriteConf = serde_yaml::from_str(
            r#"
                from_regex: "https?://[^/]*/(.*)"
                rewrite_response_headers: true
            "#,
        )
        .unwrap();
        let handler = ResponseRewriteHandler::new(conf, failing).unwrap();

        let mut headers = make_headers(&[("Location", "https://localgateway/mypath")]);
        assert!(handler.response_filter(&mut headers).is_err());
    }
}
