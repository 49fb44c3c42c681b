// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reverse proxy rules
//!
//! Rules are checked in lexicographic key order before any other routing. A
//! key wrapped in slashes (`/^\/api\/v\d+/`) is a regular expression
//! matched against the request path, any other key is a literal path
//! prefix. Matching requests are forwarded with their full path and query
//! appended to the target URL.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Request, StatusCode};
use axum::response::Response;
use futures::TryStreamExt;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::config::{proxy_rule_pattern, ConfigError};
use crate::presentation::response::failure;

/// Largest request body buffered for forwarding
const MAX_PROXY_BODY: usize = 64 * 1024 * 1024;

static HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error(transparent)]
    Upstream(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
enum Matcher {
    Prefix(String),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Matcher::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Matcher::Pattern(regex) => regex.is_match(path),
        }
    }
}

#[derive(Debug, Clone)]
struct ProxyRule {
    matcher: Matcher,
    target: String,
}

#[derive(Debug, Clone)]
pub struct ProxyTable {
    rules: Vec<ProxyRule>,
    client: reqwest::Client,
}

impl ProxyTable {
    pub fn from_config(proxies: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(proxies.len());
        for (rule, target) in proxies {
            let matcher = match proxy_rule_pattern(rule) {
                Some(pattern) => Matcher::Pattern(Regex::new(pattern).map_err(|e| {
                    ConfigError::InvalidProxyRule {
                        rule: rule.clone(),
                        reason: e.to_string(),
                    }
                })?),
                None => Matcher::Prefix(rule.clone()),
            };
            rules.push(ProxyRule {
                matcher,
                target: target.trim_end_matches('/').to_string(),
            });
        }

        Ok(Self {
            rules,
            client: reqwest::Client::new(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Upstream URL for a request, `None` when no rule matches
    pub fn upstream_for(&self, path: &str, path_and_query: &str) -> Option<String> {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(path))
            .map(|rule| format!("{}{}", rule.target, path_and_query))
    }

    pub async fn forward(&self, upstream: &str, request: Request<Body>) -> Response {
        match self.try_forward(upstream, request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(upstream = %upstream, error = %e, "Proxy request failed");
                failure(StatusCode::BAD_GATEWAY.as_u16(), format!("Proxy error: {}", e))
            }
        }
    }

    async fn try_forward(&self, upstream: &str, request: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, MAX_PROXY_BODY).await?;
        debug!(method = %parts.method, upstream = %upstream, "Proxying request");

        let upstream_response = self
            .client
            .request(parts.method, upstream)
            .headers(strip_hop_by_hop(parts.headers))
            .body(body)
            .send()
            .await?;

        let status = upstream_response.status();
        let headers = strip_hop_by_hop(upstream_response.headers().clone());
        let stream = upstream_response
            .bytes_stream()
            .map_err(std::io::Error::other);

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers
}
