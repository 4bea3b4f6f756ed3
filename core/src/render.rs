//! Value rendering.
//!
//! Turns a [`MatchResult`] and a list of property names into one delimited,
//! bounded string.
//!
//! # Rules
//!
//! - Metadata pseudo-properties ([`MetadataProperty`]) come straight from
//!   result fields and are always rendered.
//! - A property without values renders [`NO_MATCH`] when unavailable values
//!   are included, otherwise nothing.
//! - A multi-valued property joins its values with [`INNER_SEPARATOR`].
//!   [`UNKNOWN`] tokens are dropped when unavailable values are excluded.
//! - Contributions are joined with the renderer's separator. Empty
//!   contributions add no separator.
//! - Output never exceeds the buffer limit. Overflow keeps the longest
//!   prefix that fits and sets [`RenderedValue::is_truncated`].

use crate::engine::MatchResult;
use crate::{DEFAULT_VALUE_SEPARATOR, INNER_SEPARATOR, MAX_VALUE_LENGTH, NO_MATCH, UNKNOWN};

/// Properties rendered from result fields instead of engine values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataProperty {
    /// Graph iterations.
    Iterations,
    /// Drift of the match.
    Drift,
    /// Difference of the match.
    Difference,
    /// Match method label.
    Method,
    /// Matched user agent substrings.
    UserAgents,
    /// Matched node count.
    MatchedNodes,
    /// Device id.
    DeviceId,
}

impl MetadataProperty {
    /// Recognise a metadata name. Names compare case-sensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Iterations" => Some(Self::Iterations),
            "Drift" => Some(Self::Drift),
            "Difference" => Some(Self::Difference),
            "Method" => Some(Self::Method),
            "UserAgents" => Some(Self::UserAgents),
            "MatchedNodes" => Some(Self::MatchedNodes),
            "DeviceId" => Some(Self::DeviceId),
            _ => None,
        }
    }

    fn render(self, result: &MatchResult) -> String {
        match self {
            Self::Iterations => result.iterations().to_string(),
            Self::Drift => result.drift().to_string(),
            Self::Difference => result.difference().to_string(),
            Self::Method => result.method().label().to_string(),
            Self::UserAgents => result.user_agents().join(INNER_SEPARATOR),
            Self::MatchedNodes => result.matched_nodes().to_string(),
            Self::DeviceId => result.device_id().to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bounded buffer
// ═══════════════════════════════════════════════════════════════════════════════

/// Growable string with a hard byte limit.
///
/// Writes past the limit keep the longest prefix that fits on a `char`
/// boundary and mark the buffer truncated. Once truncated, further writes
/// are ignored.
#[derive(Debug, Clone)]
pub struct ValueBuffer {
    buf: String,
    max: usize,
    truncated: bool,
}

impl ValueBuffer {
    /// Create a buffer holding at most `max` bytes.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            buf: String::new(),
            max,
            truncated: false,
        }
    }

    /// Append `s`. Returns `false` when it did not fit whole.
    pub fn push_str(&mut self, s: &str) -> bool {
        if self.truncated {
            return false;
        }
        let remaining = self.max - self.buf.len();
        if s.len() <= remaining {
            self.buf.push_str(s);
            return true;
        }
        let mut cut = remaining;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buf.push_str(&s[..cut]);
        self.truncated = true;
        false
    }

    /// Bytes written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether a write overflowed.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Finish into a [`RenderedValue`].
    #[must_use]
    pub fn finish(self) -> RenderedValue {
        RenderedValue {
            value: self.buf,
            truncated: self.truncated,
        }
    }
}

/// A rendered, bounded value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedValue {
    value: String,
    truncated: bool,
}

impl RenderedValue {
    /// The rendered text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Whether the output was cut at the buffer limit.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether nothing was rendered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Take the rendered text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.value
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Renderer
// ═══════════════════════════════════════════════════════════════════════════════

/// Renders property lists with a fixed outer separator and size limit.
#[derive(Debug, Clone)]
pub struct Renderer {
    separator: String,
    max_len: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_VALUE_SEPARATOR)
    }
}

impl Renderer {
    /// Renderer joining contributions with `separator`, bounded by
    /// [`MAX_VALUE_LENGTH`].
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            max_len: MAX_VALUE_LENGTH,
        }
    }

    /// Override the size limit.
    #[must_use]
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Outer separator.
    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Render `properties` from `result`.
    pub fn render(
        &self,
        result: &MatchResult,
        properties: &[String],
        include_unavailable: bool,
    ) -> RenderedValue {
        let mut out = ValueBuffer::new(self.max_len);

        for property in properties {
            let contribution = contribution(result, property, include_unavailable);
            if contribution.is_empty() {
                continue;
            }
            if !out.is_empty() && !out.push_str(&self.separator) {
                break;
            }
            if !out.push_str(&contribution) {
                break;
            }
        }

        if out.is_truncated() {
            tracing::warn!(
                max = self.max_len,
                properties = properties.len(),
                "rendered value is bigger than the available buffer, truncated"
            );
        }
        out.finish()
    }
}

/// Text one property contributes before joining.
fn contribution(result: &MatchResult, property: &str, include_unavailable: bool) -> String {
    if let Some(meta) = MetadataProperty::parse(property) {
        return meta.render(result);
    }
    if !result.has_values(property) {
        return if include_unavailable {
            NO_MATCH.to_string()
        } else {
            String::new()
        };
    }
    let values = result.values(property);
    if include_unavailable {
        values.join(INNER_SEPARATOR)
    } else {
        values
            .iter()
            .map(String::as_str)
            .filter(|v| *v != UNKNOWN)
            .collect::<Vec<_>>()
            .join(INNER_SEPARATOR)
    }
}

/// JSON string escaping of a rendered value, without surrounding quotes.
///
/// Quotes, backslashes and control characters are escaped so a value cannot
/// break out of a header line or a JSON payload. The returned string's
/// capacity equals its length.
#[must_use]
pub fn escape_value(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    let inner = quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(&quoted);
    let mut escaped = String::with_capacity(inner.len());
    escaped.push_str(inner);
    escaped
}
