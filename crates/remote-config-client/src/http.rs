// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTPS transport for the remote configuration service.
//!
//! Handles header construction, conditional polling with `If-None-Match`, and
//! maps HTTP statuses and reqwest failures onto [`TransportError`].

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, IF_NONE_MATCH, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};

use crate::endpoint::{ConfigEndpoint, ConfigSnapshot, EndpointConnector, PollRequest, PollResponse};
use crate::error::TransportError;
use crate::policy::TlsMode;

/// Endpoint used for configuration polling.
pub const CONFIG_ENDPOINT: &str = "/api/v0.1/configurations";

/// Options governing how the HTTP client is constructed.
#[derive(Debug, Clone, Copy)]
pub struct HttpClientOptions {
    /// Whether plaintext (HTTP) endpoints are allowed.
    pub allow_plaintext: bool,
    /// Whether TLS certificate and hostname validation should be skipped.
    pub accept_invalid_certs: bool,
    /// Upper bound for a single request, connection included.
    pub request_timeout: Duration,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            allow_plaintext: false,
            accept_invalid_certs: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Builds [`HttpEndpoint`]s for the client.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    api_key: Option<String>,
    agent_version: String,
    allow_plaintext: bool,
    request_timeout: Duration,
}

impl HttpConnector {
    /// `api_key` is sent as `DD-API-KEY` when present. `allow_plaintext` permits
    /// `http://` base URLs.
    #[must_use]
    pub fn new(
        api_key: Option<String>,
        agent_version: impl Into<String>,
        allow_plaintext: bool,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            agent_version: agent_version.into(),
            allow_plaintext,
            request_timeout,
        }
    }
}

impl EndpointConnector for HttpConnector {
    fn connect(
        &self,
        url: &Url,
        tls_mode: TlsMode,
    ) -> Result<Arc<dyn ConfigEndpoint>, TransportError> {
        let endpoint = HttpEndpoint::new(
            url.as_str(),
            self.api_key.as_deref(),
            &self.agent_version,
            HttpClientOptions {
                allow_plaintext: self.allow_plaintext,
                accept_invalid_certs: tls_mode.accepts_invalid_certs(),
                request_timeout: self.request_timeout,
            },
        )?;
        Ok(Arc::new(endpoint))
    }
}

/// HTTP transport wrapping a reusable `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    /// Base URL (scheme + host), without a trailing slash.
    base_url: String,
    headers: HeaderMap,
    request_timeout: Duration,
}

impl HttpEndpoint {
    /// Builds the client with the default headers and the certificate handling
    /// from `options`.
    ///
    /// # Errors
    ///
    /// [`TransportError::InsecureUrl`] for an `http://` base URL without
    /// `allow_plaintext`, and [`TransportError::Builder`] for header values
    /// or a client that cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        agent_version: &str,
        options: HttpClientOptions,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !options.allow_plaintext && base_url.starts_with("http://") {
            return Err(TransportError::InsecureUrl(base_url));
        }

        let mut headers = HeaderMap::new();
        let user_agent = format!("remote-config-agent/{agent_version}");
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|_| TransportError::Builder(format!("invalid user agent {user_agent}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        // Anonymous polling is allowed against local or self-hosted services.
        if let Some(api_key) = api_key {
            headers.insert(
                "DD-API-KEY",
                HeaderValue::from_str(api_key)
                    .map_err(|_| TransportError::Builder("invalid API key header".to_string()))?,
            );
        }

        let client = Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .danger_accept_invalid_hostnames(options.accept_invalid_certs)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| TransportError::from_reqwest(&e, options.request_timeout))?;

        Ok(Self {
            client,
            base_url,
            headers,
            request_timeout: options.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attaches headers, sends the request, and classifies the HTTP status.
    /// `304 Not Modified` is passed through to the caller.
    async fn send_request(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        cached_version: Option<&str>,
    ) -> Result<reqwest::Response, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let mut headers = self.headers.clone();
        if let Some(version) = cached_version {
            if let Ok(value) = HeaderValue::from_str(version) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }

        tracing::debug!(
            method = %method,
            url = %url,
            headers = ?redact_headers(&headers),
            body_len = body.len(),
            body = %request_body_preview(&body),
            "remote-config HTTP request"
        );

        let response = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, self.request_timeout))?;

        let status = response.status();
        tracing::debug!(
            method = %method,
            url = %url,
            status = %status,
            "remote-config HTTP response"
        );

        if status == StatusCode::NOT_MODIFIED {
            return Ok(response);
        }
        classify_status(status)?;
        Ok(response)
    }
}

#[async_trait]
impl ConfigEndpoint for HttpEndpoint {
    async fn poll(&self, request: &PollRequest) -> Result<PollResponse, TransportError> {
        let body = serde_json::to_vec(request).map_err(|e| TransportError::Builder(e.to_string()))?;
        let response = self
            .send_request(
                Method::POST,
                CONFIG_ENDPOINT,
                body,
                request.cached_version.as_deref(),
            )
            .await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(PollResponse::Unchanged);
        }
        let snapshot = response
            .json::<ConfigSnapshot>()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, self.request_timeout))?;
        Ok(PollResponse::Snapshot(snapshot))
    }
}

/// Maps HTTP status codes to the transport error taxonomy.
fn classify_status(status: StatusCode) -> Result<(), TransportError> {
    if status.is_redirection() {
        // unexpected redirects usually come from a misconfigured proxy
        return Err(TransportError::Proxy(status.as_u16()));
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(TransportError::Unauthorized);
    }
    if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::GATEWAY_TIMEOUT {
        return Err(TransportError::Retryable(status.as_u16()));
    }
    if status.is_client_error() {
        return Err(TransportError::Proxy(status.as_u16()));
    }
    if status.is_server_error() {
        return Err(TransportError::Retryable(status.as_u16()));
    }
    Ok(())
}

/// Returns a redacted view of request headers suitable for debug logging.
fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    const SENSITIVE_HEADERS: [&str; 3] = ["dd-api-key", "dd-application-key", "authorization"];

    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                "<redacted>".to_string()
            } else {
                value
                    .to_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (lower, display)
        })
        .collect()
}

fn request_body_preview(body: &[u8]) -> String {
    truncate_preview_text(String::from_utf8_lossy(body))
}

fn truncate_preview_text(text: Cow<'_, str>) -> String {
    const MAX_CHARS: usize = 1024;
    let mut chars = text.chars();
    let mut preview = String::new();
    for _ in 0..MAX_CHARS {
        match chars.next() {
            Some(ch) => preview.push(ch),
            None => return preview,
        }
    }
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}
