//! Request-line and header parsing helpers.
//!
//! Values are returned raw: query parameters stay percent-encoded, since
//! decoding is the evidence collector's job.

/// Parse query string from path.
///
/// Returns the query string portion after '?' or None if no query string.
#[must_use]
pub fn parse_query_string(path: &str) -> Option<&str> {
    path.split_once('?').map(|(_, query)| query)
}

/// Parse path without query string.
///
/// Returns the path portion before '?' or the full path if no query string.
#[must_use]
pub fn parse_path_only(path: &str) -> &str {
    path.split_once('?').map_or(path, |(p, _)| p)
}

/// Get a query parameter value from a query string.
///
/// The first occurrence wins. A key without `=` has an empty value.
#[must_use]
pub fn get_query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query_pairs(query).find_map(|(key, value)| (key == name).then_some(value))
}

/// Iterate `key=value` pairs of a query string.
pub fn query_pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
}

/// Iterate `name=value` pairs of a `Cookie` header.
pub fn cookie_pairs(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim();
        Some((name, value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value)))
    })
}

/// Get a cookie value from a `Cookie` header.
#[must_use]
pub fn get_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    cookie_pairs(header).find_map(|(key, value)| (key == name).then_some(value))
}

/// Host part of an authority, without port.
#[must_use]
pub fn host_only(authority: &str) -> &str {
    if authority.starts_with('[') {
        // IPv6 literal
        return authority
            .split_once(']')
            .map_or(authority, |(host, _)| &authority[..=host.len()]);
    }
    authority.rsplit_once(':').map_or(authority, |(host, _)| host)
}
