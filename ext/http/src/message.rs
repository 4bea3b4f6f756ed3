//! `HttpMessage`: indexed request view over an ext_proc `ProcessingRequest`.
//!
//! Headers, pseudo-headers, query parameters and cookies are indexed once at
//! construction so evidence collection does O(1) lookups.

use envoy_grpc_ext_proc::envoy::service::ext_proc::v3::{
    processing_request::Request, ProcessingRequest,
};
use evident::RequestView;
use std::collections::HashMap;

use crate::context::{cookie_pairs, host_only, parse_path_only, parse_query_string, query_pairs};

/// Indexed view over HTTP request data for evidence collection.
///
/// Built from a `ProcessingRequest`, pre-indexing all headers into a `HashMap`
/// with lowercased keys and taking the path and host from the `:path` and
/// `:authority` pseudo-headers
/// into dedicated fields. Repeated headers keep their first value; every
/// `cookie` header contributes cookies.
///
/// # Example
///
/// ```ignore
/// let msg = HttpMessage::from(processing_request);
/// let scope = module.resolve(msg.host(), msg.path().unwrap_or("/"));
/// let report = worker.request_pass(&mut ctx, &msg, &scope);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpMessage {
    /// All headers indexed by lowercased name.
    headers: HashMap<String, String>,
    /// Raw query parameters, first occurrence wins.
    query_params: HashMap<String, String>,
    /// Cookies from all `cookie` headers, first occurrence wins.
    cookies: HashMap<String, String>,
    /// Parsed path (without query string), from `:path` pseudo-header.
    path: Option<String>,
    /// Authority, from `:authority` pseudo-header.
    authority: Option<String>,
}

impl HttpMessage {
    /// Get the request path (without query string).
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Get the authority (host).
    #[must_use]
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Host without port, from the authority or the `host` header.
    ///
    /// This is the server name used for scope resolution.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.authority
            .as_deref()
            .or_else(|| self.header("host"))
            .map(host_only)
    }

    /// Get a header value by name. Names are case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Get a raw (percent-encoded) query parameter value by name.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Get a cookie value by name.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

impl RequestView for HttpMessage {
    fn header(&self, name: &str) -> Option<&str> {
        HttpMessage::header(self, name)
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        HttpMessage::query_param(self, name)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        HttpMessage::cookie(self, name)
    }
}

/// Index a request-headers message. Other message kinds give an empty view.
impl From<ProcessingRequest> for HttpMessage {
    fn from(req: ProcessingRequest) -> Self {
        from_request_headers(req.request.as_ref())
    }
}

/// Index a borrowed request-headers message.
impl From<&ProcessingRequest> for HttpMessage {
    fn from(req: &ProcessingRequest) -> Self {
        from_request_headers(req.request.as_ref())
    }
}

/// Walk the header map once, splitting pseudo-headers, query and cookies out.
fn from_request_headers(request: Option<&Request>) -> HttpMessage {
    let mut msg = HttpMessage::default();

    let http_headers = match request {
        Some(Request::RequestHeaders(h)) => h.headers.as_ref(),
        _ => None,
    };

    let Some(header_map) = http_headers else {
        return msg;
    };
    msg.headers.reserve(header_map.headers.len());

    for hv in &header_map.headers {
        let key = hv.key.to_ascii_lowercase();
        let value = if hv.raw_value.is_empty() {
            hv.value.clone()
        } else {
            String::from_utf8_lossy(&hv.raw_value).into_owned()
        };

        // Extract pseudo-headers into dedicated fields
        match key.as_str() {
            ":path" => {
                if let Some(query) = parse_query_string(&value) {
                    for (name, param) in query_pairs(query) {
                        msg.query_params
                            .entry(name.to_string())
                            .or_insert_with(|| param.to_string());
                    }
                }
                msg.path = Some(parse_path_only(&value).to_string());
            }
            ":authority" => msg.authority = Some(value.clone()),
            "cookie" => {
                for (name, cookie) in cookie_pairs(&value) {
                    msg.cookies
                        .entry(name.to_string())
                        .or_insert_with(|| cookie.to_string());
                }
            }
            _ => {}
        }

        msg.headers.entry(key).or_insert(value);
    }

    msg
}
