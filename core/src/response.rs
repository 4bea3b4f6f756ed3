//! Response-side outputs: engine-declared response headers and body
//! replacement.

use std::sync::Arc;

use crate::directive::{MatchDirective, Mode};
use crate::render::RenderedValue;
use crate::{JAVASCRIPT_NOT_AVAILABLE, NO_MATCH, SET_HEADER_PREFIX};

/// Header name declared by a `SetHeader<Component><Header>` property.
///
/// The component is one uppercase ASCII letter followed by lowercase ASCII
/// letters; everything after it is the header name.
#[must_use]
pub fn set_header_name(property: &str) -> Option<&str> {
    let rest = property.strip_prefix(SET_HEADER_PREFIX)?;
    let mut chars = rest.char_indices();
    let (_, first) = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    let start = chars
        .find(|(_, c)| !c.is_ascii_lowercase())
        .map_or(rest.len(), |(i, _)| i);
    let header = &rest[start..];
    if header.is_empty() {
        None
    } else {
        Some(header)
    }
}

/// Response headers the engine asks to set, one all-mode directive per
/// header name.
///
/// Built once per worker from the dataset's available properties. Headers
/// keep first-seen order; each collects its properties in dataset order.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaderPlan {
    directives: Vec<Arc<MatchDirective>>,
}

impl ResponseHeaderPlan {
    /// Group `SetHeader*` properties by the header they declare.
    #[must_use]
    pub fn from_properties(available: &[String]) -> Self {
        let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
        for property in available {
            let Some(header) = set_header_name(property) else {
                continue;
            };
            match groups.iter_mut().find(|(name, _)| *name == header) {
                Some((_, properties)) => properties.push(property.clone()),
                None => groups.push((header, vec![property.clone()])),
            }
        }
        Self {
            directives: groups
                .into_iter()
                .map(|(header, properties)| Arc::new(MatchDirective::header(Mode::All, header, properties)))
                .collect(),
        }
    }

    /// One directive per response header.
    #[must_use]
    pub fn directives(&self) -> &[Arc<MatchDirective>] {
        &self.directives
    }

    /// Whether the engine declares no response headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Number of response headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directives.len()
    }
}

/// Replacement response produced by a body directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyReplacement {
    /// HTTP status of the replaced response.
    pub status: u16,
    /// New payload.
    pub body: String,
    /// Byte length of `body`.
    pub content_length: usize,
}

impl BodyReplacement {
    /// Payload for a rendered body value. Empty output and [`NO_MATCH`]
    /// become [`JAVASCRIPT_NOT_AVAILABLE`].
    #[must_use]
    pub fn from_rendered(rendered: RenderedValue) -> Self {
        let body = if rendered.is_empty() || rendered.as_str() == NO_MATCH {
            JAVASCRIPT_NOT_AVAILABLE.to_string()
        } else {
            rendered.into_string()
        };
        Self {
            status: 200,
            content_length: body.len(),
            body,
        }
    }
}
