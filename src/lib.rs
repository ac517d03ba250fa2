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

//! # Response Rewrite Module
//!
//! This crate rewrites occurrences of a configured regular expression in the
//! header values and the body of a response, replacing every match with a
//! templated value that can refer to the match's capture groups. The typical
//! use is reverse-proxy URL mangling similar to Apache's `ProxyPassReverse`:
//! upstream servers produce absolute URLs pointing to themselves, and the
//! `Location` headers and body links need to point at the gateway instead.
//! A configuration could look like this:
//!
//! ```yaml
//! from_regex: "https?://internal[^/]*/(.*)"
//! to_replacement: "https://apis.example.com/{group[1]}"
//! rewrite_response_headers: true
//! rewrite_response_body: true
//! ```
//!
//! The replacement template is *not* interpreted by this crate. Rendering is
//! delegated to the hosting gateway's template engine through the
//! [`TemplateEvaluator`] trait; for every match the evaluator receives the
//! template along with a [`MatchBinding`] exposing the positional capture
//! groups (indexed from 1) and the named capture groups declared in the
//! pattern. The placeholder syntax above is merely what such an engine might
//! accept.
//!
//! ## Header rewriting
//!
//! With `rewrite_response_headers` enabled, every value of every response
//! header is rewritten independently. Headers that legitimately repeat, such
//! as `Set-Cookie`, keep their multiplicity and order; which header names
//! exist never changes.
//!
//! ## Body rewriting
//!
//! With `rewrite_response_body` enabled, the response body is buffered in
//! full and rewritten in a single pass when the upstream stream ends. This
//! is deliberate: a match and its capture groups can span chunk boundaries,
//! so no correct output can be produced earlier. The memory cost is
//! proportional to the body size. Because the rewritten length isn't known
//! while the headers are being sent, the handler drops `Content-Length` and
//! switches the response to chunked transfer encoding up front.
//!
//! ## Code example
//!
//! ```rust
//! use http::header::{HeaderMap, HeaderValue, LOCATION};
//! use response_rewrite_module::{
//!     MatchBinding, ResponseRewriteHandler, RewriteConf, TemplateError,
//! };
//!
//! fn evaluate(template: &str, binding: &MatchBinding<'_, '_>) -> Result<String, TemplateError> {
//!     Ok(template.replace("{group[1]}", binding.group(1).unwrap_or("")))
//! }
//!
//! let conf = RewriteConf {
//!     from_regex: "https?://[^/]*/(.*)".to_owned(),
//!     to_replacement: "https://apis.example.com/{group[1]}".to_owned(),
//!     rewrite_response_headers: true,
//!     rewrite_response_body: false,
//! };
//! let handler = ResponseRewriteHandler::new(conf, evaluate).unwrap();
//!
//! let mut headers = HeaderMap::new();
//! headers.insert(
//!     LOCATION,
//!     HeaderValue::from_static("https://localgateway/mypath"),
//! );
//! handler.response_filter(&mut headers).unwrap();
//!
//! assert_eq!(
//!     headers.get(LOCATION).unwrap(),
//!     "https://apis.example.com/mypath"
//! );
//! ```
//!
//! The handler itself is immutable and shared by all in-flight responses;
//! per-response state is confined to the context created by
//! [`ResponseRewriteHandler::new_ctx`]. Body chunks go through
//! [`ResponseRewriteHandler::response_body_filter`] the way the hosting
//! server's body filter phase delivers them.

pub mod body;
pub mod configuration;
pub mod engine;
mod handler;
pub mod headers;
pub mod pattern;

pub use configuration::RewriteConf;
pub use engine::{rewrite, MatchBinding, TemplateError, TemplateEvaluator};
pub use handler::{ResponseRewriteCtx, ResponseRewriteHandler};
pub use pattern::{CompiledPattern, InvalidPatternError};
