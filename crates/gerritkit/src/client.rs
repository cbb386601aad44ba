//! Blocking Gerrit REST client.
//!
//! Gerrit prefixes every JSON response with `)]}'` to defeat cross-site
//! script inclusion; [`decode`] strips it before parsing. With credentials,
//! requests go to the authenticated `/a/` endpoints using HTTP Basic auth.

use crate::error::{Error, Result};
use crate::retry::{LogCallback, with_retry};
use crate::types::{ClientConfig, RetryConfig};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::borrow::Cow;

const XSSI_PREFIX: &str = ")]}'";

/// Request body variants used by the Gerrit API.
#[derive(Debug, Clone, Copy)]
pub enum Body<'a> {
    Empty,
    Json(&'a Value),
    Text(&'a str),
}

/// Gerrit REST client.
pub struct Client {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Base URL including the `/a` prefix when authenticated, no trailing slash.
    base: String,
    /// Precomputed `Authorization` header value.
    authorization: Option<String>,
    retry: RetryConfig,
}

impl Client {
    /// Create a client from connection settings.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let url = config.url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(Error::Config("server URL is empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server URL must start with http:// or https://, got '{url}'"
            )));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build()
            .into();

        let (base, authorization) = match &config.credentials {
            Some(creds) => {
                let token = STANDARD.encode(format!("{}:{}", creds.username, creds.password));
                (format!("{url}/a"), Some(format!("Basic {token}")))
            }
            None => (url.to_string(), None),
        };

        Ok(Self {
            agent,
            base,
            authorization,
            retry: config.retry.clone(),
        })
    }

    /// Get the base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Full URL for an API path such as `groups/Testers/detail`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// GET a path, retrying transient failures.
    pub fn get(&self, path: &str) -> Result<Value> {
        with_retry(&self.retry, Some(&LogCallback), || {
            self.send(Method::Get, path, Body::Empty)
        })
    }

    pub fn put(&self, path: &str, body: Body<'_>) -> Result<Value> {
        self.send(Method::Put, path, body)
    }

    pub fn post(&self, path: &str, body: Body<'_>) -> Result<Value> {
        self.send(Method::Post, path, body)
    }

    pub fn delete(&self, path: &str) -> Result<Value> {
        self.send(Method::Delete, path, Body::Empty)
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request
            .header("Accept", "application/json")
            .header("User-Agent", "gerritkit-rs");
        match &self.authorization {
            Some(value) => request.header("Authorization", value.as_str()),
            None => request,
        }
    }

    fn send(&self, method: Method, path: &str, body: Body<'_>) -> Result<Value> {
        let url = self.url(path);
        log::debug!("{} {url}", method.as_str());

        let response = match method {
            Method::Get => self.authorize(self.agent.get(&url)).call(),
            Method::Delete => self.authorize(self.agent.delete(&url)).call(),
            Method::Put | Method::Post => {
                let request = if matches!(method, Method::Put) {
                    self.agent.put(&url)
                } else {
                    self.agent.post(&url)
                };
                let request = self.authorize(request);
                match body {
                    Body::Empty => request.send_empty(),
                    Body::Json(value) => request.send_json(value),
                    Body::Text(text) => request
                        .header("Content-Type", "text/plain; charset=UTF-8")
                        .send(text),
                }
            }
        };

        let mut response = response?;
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        log::trace!("{} {url} -> {status}", method.as_str());
        decode(status, &text)
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// Percent-encode one path segment.
pub fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// Strip Gerrit's anti-XSSI prefix, if present.
pub fn strip_xssi(body: &str) -> &str {
    body.strip_prefix(XSSI_PREFIX).unwrap_or(body).trim_start()
}

/// Turn a status and body into a JSON value or an error.
///
/// Success bodies that are empty decode to `null`; bodies that are not JSON
/// decode to a string.
pub fn decode(status: u16, body: &str) -> Result<Value> {
    if !(200..300).contains(&status) {
        let message = body.trim();
        let message = if message.is_empty() {
            reason(status)
        } else {
            message
        };
        return Err(Error::http(status, message));
    }

    let body = strip_xssi(body).trim();
    if body.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

fn reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Request failed",
    }
}
