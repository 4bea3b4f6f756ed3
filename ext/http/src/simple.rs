//! Simple `HttpRequest` for testing and basic use cases.
//!
//! This is a lightweight request view for when you don't need full `ext_proc`.

use std::collections::HashMap;

use evident::RequestView;

use crate::context::{cookie_pairs, host_only, parse_path_only, parse_query_string, query_pairs};

/// Simple HTTP request view for evidence collection.
///
/// Use this for testing or simple use cases. For production `ext_proc`
/// integration, use [`HttpMessage`](crate::HttpMessage) instead.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    method: String,
    path: String,
    authority: Option<String>,
    headers: HashMap<String, String>,
    query_params: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a builder for `HttpRequest`.
    #[must_use]
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Get the HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Get the request path, without query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host the request was addressed to, without port.
    ///
    /// Taken from the authority if set, else from the `Host` header.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.authority
            .as_deref()
            .or_else(|| self.header("host"))
            .map(host_only)
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Get a raw query parameter by name.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Get a cookie by name.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

impl RequestView for HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        HttpRequest::header(self, name)
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        HttpRequest::query_param(self, name)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        HttpRequest::cookie(self, name)
    }
}

/// Builder for `HttpRequest`.
#[derive(Debug, Default)]
pub struct HttpRequestBuilder {
    request: HttpRequest,
}

impl HttpRequestBuilder {
    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.request.method = method.into();
        self
    }

    /// Set the request path. A query string is split off into parameters;
    /// parameters set explicitly take precedence.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if let Some(query) = parse_query_string(&path) {
            for (name, value) in query_pairs(query) {
                self.request
                    .query_params
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        self.request.path = parse_path_only(&path).to_string();
        self
    }

    /// Set the authority (host and optional port).
    #[must_use]
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.request.authority = Some(authority.into());
        self
    }

    /// Add a header (name is lowercased for case-insensitive lookup).
    ///
    /// A `Cookie` header is also split into cookies.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        let value = value.into();
        if name == "cookie" {
            for (cookie, cookie_value) in cookie_pairs(&value) {
                self.request
                    .cookies
                    .entry(cookie.to_string())
                    .or_insert_with(|| cookie_value.to_string());
            }
        }
        self.request.headers.entry(name).or_insert(value);
        self
    }

    /// Add a raw (percent-encoded) query parameter.
    #[must_use]
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query_params.insert(name.into(), value.into());
        self
    }

    /// Add a cookie.
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.cookies.insert(name.into(), value.into());
        self
    }

    /// Build the `HttpRequest`.
    #[must_use]
    pub fn build(self) -> HttpRequest {
        self.request
    }
}
