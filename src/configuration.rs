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

//! Structures required to deserialize Response Rewrite Module configuration
//! from YAML configuration files.

use serde::Deserialize;

/// Configuration file settings of the response rewrite module
///
/// Constructed once when the policy instance is set up and read-only
/// afterwards. The pattern is kept as source text here; it is compiled when
/// the handler is created, so that an invalid pattern fails initialization
/// rather than the first response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteConf {
    /// Regular expression locating the text to rewrite in header values and
    /// the response body.
    ///
    /// Capturing groups are made available to the replacement template:
    /// positional groups by index starting at 1, named groups `(?P<name>…)`
    /// by identifier.
    pub from_regex: String,

    /// Replacement template evaluated for every match of `from_regex`.
    ///
    /// The template is rendered by the template engine of the hosting
    /// gateway with the capture groups of the current match bound; its
    /// placeholder syntax is the engine's business, not this module's.
    #[serde(default)]
    pub to_replacement: String,

    /// If `true`, every response header value is rewritten.
    #[serde(default)]
    pub rewrite_response_headers: bool,

    /// If `true`, the response body is buffered completely and rewritten
    /// once the upstream stream ends. The response is re-framed as chunked
    /// because the rewritten length isn't known up front.
    #[serde(default)]
    pub rewrite_response_body: bool,
}
