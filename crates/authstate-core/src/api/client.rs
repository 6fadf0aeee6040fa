//! Request handles bound to the session's bearer token.
//!
//! `ClientFactory` owns the one `reqwest::Client` (and its connection pool).
//! Every operation asks it for a fresh `SessionClient` carrying the token
//! as it is *now*, so a rotated token is picked up by the very next call.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::{header, Client};
use serde_json::Value;
use tracing::debug;

use super::ApiError;
use crate::config::Config;

/// HTTP verbs the session store dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Only POST and PUT carry a JSON body; anything passed for GET/DELETE is dropped.
    pub fn carries_body(self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl FromStr for Method {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ApiError::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing call. Built per request and thrown away afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Method,
    pub body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, method: Method, body: Option<Value>) -> Self {
        let url = url.into();
        let body = if method.carries_body() {
            body
        } else {
            if body.is_some() {
                debug!(url = %url, method = %method, "Dropping request body for bodiless method");
            }
            None
        };
        Self { url, method, body }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, Method::Get, None)
    }

    pub fn post(url: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(url, Method::Post, body)
    }
}

/// Result of a dispatched request.
///
/// A non-2xx status is not an error: callers get the bare status code back
/// and must check for it.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Decoded JSON body of a 2xx response. An empty body decodes to `Value::Null`.
    Body(Value),
    /// Status code of a non-2xx response.
    Status(u16),
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Body(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SendOutcome::Status(code) => Some(*code),
            SendOutcome::Body(_) => None,
        }
    }

    pub fn into_body(self) -> Option<Value> {
        match self {
            SendOutcome::Body(body) => Some(body),
            SendOutcome::Status(_) => None,
        }
    }
}

/// Builds `SessionClient`s. Clone is cheap - reqwest::Client uses Arc internally.
#[derive(Clone)]
pub struct ClientFactory {
    client: Client,
    base_url: String,
}

impl ClientFactory {
    /// Create the factory and its underlying HTTP client.
    /// Without `request_timeout_secs` the transport's own default applies.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.clone(),
        })
    }

    /// Create a handle for the given token, sharing the connection pool.
    /// An absent token is sent as an empty bearer credential.
    pub fn for_token(&self, token: Option<&str>) -> Result<SessionClient, ApiError> {
        let mut authorization =
            header::HeaderValue::from_str(&format!("Bearer {}", token.unwrap_or_default()))
                .map_err(ApiError::InvalidToken)?;
        authorization.set_sensitive(true);

        Ok(SessionClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            authorization,
        })
    }
}

/// Immutable request handle: base URL plus Authorization header.
pub struct SessionClient {
    client: Client,
    base_url: String,
    authorization: header::HeaderValue,
}

impl SessionClient {
    pub fn authorization(&self) -> &header::HeaderValue {
        &self.authorization
    }

    /// Resolve a request path against the base URL.
    /// Absolute URLs pass through untouched.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Issue the request exactly once.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<SendOutcome, ApiError> {
        let url = self.resolve(&request.url);
        debug!(method = %request.method, url = %url, "Dispatching request");

        let mut builder = self
            .client
            .request(request.method.to_reqwest(), &url)
            .header(header::AUTHORIZATION, self.authorization.clone())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Request returned non-success status");
            return Ok(SendOutcome::Status(status.as_u16()));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(SendOutcome::Body(Value::Null));
        }
        serde_json::from_str(&text)
            .map(SendOutcome::Body)
            .map_err(|e| ApiError::undecodable(&url, &text, &e))
    }
}
