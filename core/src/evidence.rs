//! Evidence collection.
//!
//! Extracts evidence from one request through [`RequestView`]. Nothing here
//! allocates beyond the returned values.
//!
//! - Single-source mode yields one string: the directive's source variable
//!   if set, otherwise the `User-Agent` header, otherwise `""`.
//! - Multi-header modes yield an [`EvidenceSet`]: one header item per engine
//!   evidence header present, a query item for each such name when a
//!   same-named parameter is present, and override items for every
//!   engine-declared overridable property.
//!
//! Query values are percent-decoded. `+` is kept as-is.

use std::borrow::Cow;

use crate::directive::{MatchDirective, Mode, SourceVariable, VariableKind};
use crate::engine::{DetectionEngine, EvidenceKind, EvidenceSet};

/// Read-only view of an HTTP request.
pub trait RequestView {
    /// First value of a header. Names compare case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;

    /// Raw, still percent-encoded query parameter value.
    fn query_param(&self, name: &str) -> Option<&str>;

    /// Cookie value.
    fn cookie(&self, name: &str) -> Option<&str>;
}

impl<T: RequestView + ?Sized> RequestView for &T {
    fn header(&self, name: &str) -> Option<&str> {
        (**self).header(name)
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        (**self).query_param(name)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        (**self).cookie(name)
    }
}

/// Evidence gathered for one directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Single-source string.
    Source(String),
    /// Multi-header evidence.
    Set(EvidenceSet),
}

/// Collect the evidence `directive` needs.
pub fn collect<R, E>(request: &R, directive: &MatchDirective, engine: &E) -> Evidence
where
    R: RequestView + ?Sized,
    E: DetectionEngine + ?Sized,
{
    match directive.mode() {
        Mode::UserAgent => Evidence::Source(source_string(request, directive.source())),
        mode => Evidence::Set(evidence_set(request, engine, mode)),
    }
}

/// Single-source string: the variable if set, else `User-Agent`, else `""`.
///
/// A set variable never falls back to the header.
pub fn source_string<R>(request: &R, source: Option<&SourceVariable>) -> String
where
    R: RequestView + ?Sized,
{
    match source {
        Some(variable) => variable_value(request, variable).unwrap_or_default(),
        None => request.header("User-Agent").unwrap_or_default().to_string(),
    }
}

/// Decoded value of a source variable, `None` when absent or empty.
pub fn variable_value<R>(request: &R, variable: &SourceVariable) -> Option<String>
where
    R: RequestView + ?Sized,
{
    let raw = match variable.kind() {
        VariableKind::Query => request.query_param(variable.name()),
        VariableKind::Header => request.header(variable.name()),
        VariableKind::Cookie => request.cookie(variable.name()),
    }?;
    if raw.is_empty() {
        return None;
    }
    Some(decode(raw).into_owned())
}

/// Decoded query parameter, `None` when absent or empty.
pub fn query_value<R>(request: &R, name: &str) -> Option<String>
where
    R: RequestView + ?Sized,
{
    request
        .query_param(name)
        .filter(|raw| !raw.is_empty())
        .map(|raw| decode(raw).into_owned())
}

/// Whether a header belongs to the client-hints subset.
#[must_use]
pub fn is_client_hint(name: &str) -> bool {
    name.eq_ignore_ascii_case("User-Agent")
        || name
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("Sec-CH-"))
}

/// Fresh evidence set for a multi-header mode, overrides included.
pub fn evidence_set<R, E>(request: &R, engine: &E, mode: Mode) -> EvidenceSet
where
    R: RequestView + ?Sized,
    E: DetectionEngine + ?Sized,
{
    let mut set = EvidenceSet::new();
    collect_headers(request, engine, mode, &mut set);
    collect_overrides(request, engine, &mut set);
    set
}

/// Header and same-named query evidence for the engine's unique headers.
pub fn collect_headers<R, E>(request: &R, engine: &E, mode: Mode, set: &mut EvidenceSet)
where
    R: RequestView + ?Sized,
    E: DetectionEngine + ?Sized,
{
    for name in engine.unique_headers() {
        if mode == Mode::ClientHints && !is_client_hint(name) {
            continue;
        }
        if let Some(value) = request.header(name).filter(|v| !v.is_empty()) {
            set.push(EvidenceKind::Header, name.as_str(), value);
        }
        if let Some(value) = query_value(request, name) {
            set.push(EvidenceKind::Query, name.as_str(), value);
        }
    }
}

/// Cookie and query evidence for the engine's overridable properties.
pub fn collect_overrides<R, E>(request: &R, engine: &E, set: &mut EvidenceSet)
where
    R: RequestView + ?Sized,
    E: DetectionEngine + ?Sized,
{
    for property in engine.overridable_properties() {
        let key = property.evidence_key();
        if let Some(value) = request.cookie(&key).filter(|v| !v.is_empty()) {
            set.push(EvidenceKind::Cookie, key.as_str(), value);
        }
        if let Some(value) = query_value(request, &key) {
            set.push(EvidenceKind::Query, key.as_str(), value);
        }
    }
}

fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}
