//! Match directives and the combined engine property list.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::render::MetadataProperty;
use crate::{ConfigError, MAX_PROPERTIES_LENGTH};

// ═══════════════════════════════════════════════════════════════════════════════
// Mode
// ═══════════════════════════════════════════════════════════════════════════════

/// Which evidence a directive gathers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// One source string: the User-Agent header or a source variable.
    UserAgent,
    /// Every engine evidence header present, plus overrides.
    All,
    /// The client-hints subset of [`Mode::All`].
    ClientHints,
}

impl Mode {
    /// Bit of this mode in a [`ModeSet`].
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::UserAgent => 1 << 0,
            Self::All => 1 << 1,
            Self::ClientHints => 1 << 2,
        }
    }

    /// Whether this mode builds an [`EvidenceSet`](crate::EvidenceSet).
    #[must_use]
    pub fn is_multi(self) -> bool {
        !matches!(self, Self::UserAgent)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserAgent => "user-agent",
            Self::All => "all",
            Self::ClientHints => "client-hints",
        })
    }
}

/// Bit mask of [`Mode`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeSet(u8);

impl ModeSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Add a mode.
    pub fn insert(&mut self, mode: Mode) {
        self.0 |= mode.bit();
    }

    /// Whether the set contains `mode`.
    #[must_use]
    pub fn contains(self, mode: Mode) -> bool {
        self.0 & mode.bit() != 0
    }

    /// Whether no mode is set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two sets.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl FromIterator<Mode> for ModeSet {
    fn from_iter<I: IntoIterator<Item = Mode>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for mode in iter {
            set.insert(mode);
        }
        set
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Source variable
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of request value a [`SourceVariable`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// `$arg_<name>`: a query parameter.
    Query,
    /// `$http_<name>`: a request header, `_` read as `-`.
    Header,
    /// `$cookie_<name>`: a cookie.
    Cookie,
}

/// Evidence source overriding the User-Agent header of a single-source
/// directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVariable {
    kind: VariableKind,
    name: String,
    raw: String,
}

impl SourceVariable {
    /// Parse a `$arg_`, `$http_`, or `$cookie_` reference.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidVariable`] for anything else, including
    /// an empty name after the prefix.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidVariable {
            variable: raw.to_string(),
        };
        let body = raw.strip_prefix('$').ok_or_else(invalid)?;
        let (kind, name) = if let Some(name) = body.strip_prefix("arg_") {
            (VariableKind::Query, name.to_string())
        } else if let Some(name) = body.strip_prefix("http_") {
            (VariableKind::Header, name.replace('_', "-"))
        } else if let Some(name) = body.strip_prefix("cookie_") {
            (VariableKind::Cookie, name.to_string())
        } else {
            return Err(invalid());
        };
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            kind,
            name,
            raw: raw.to_string(),
        })
    }

    /// Kind of value read.
    #[must_use]
    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Parameter, header, or cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference as written in configuration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Directive
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a directive's rendered value goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A header, by name.
    Header {
        /// Name as configured.
        name: String,
        /// Lowercased name.
        lower_name: String,
    },
    /// The response body.
    Body,
}

/// One configured rule: evidence mode, target, and requested properties.
///
/// Immutable once built; scopes hold it behind `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDirective {
    mode: Mode,
    target: Target,
    properties: Vec<String>,
    source: Option<SourceVariable>,
}

impl MatchDirective {
    /// Directive rendering `properties` into header `name`.
    pub fn header<I, S>(mode: Mode, name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        Self {
            mode,
            target: Target::Header {
                lower_name: name.to_ascii_lowercase(),
                name,
            },
            properties: properties.into_iter().map(Into::into).collect(),
            source: None,
        }
    }

    /// Directive replacing the response body with `property`.
    pub fn body(mode: Mode, property: impl Into<String>) -> Self {
        Self {
            mode,
            target: Target::Body,
            properties: vec![property.into()],
            source: None,
        }
    }

    /// Read single-source evidence from `source` instead of the User-Agent.
    #[must_use]
    pub fn with_source(mut self, source: SourceVariable) -> Self {
        self.source = Some(source);
        self
    }

    /// Evidence mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Output target.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Target header name, `None` for body directives.
    #[must_use]
    pub fn header_name(&self) -> Option<&str> {
        match &self.target {
            Target::Header { name, .. } => Some(name),
            Target::Body => None,
        }
    }

    /// Whether this directive writes the response body.
    #[must_use]
    pub fn is_body(&self) -> bool {
        matches!(self.target, Target::Body)
    }

    /// Requested properties in configured order.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Source variable, if any.
    #[must_use]
    pub fn source(&self) -> Option<&SourceVariable> {
        self.source.as_ref()
    }

    /// Check the directive in isolation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty property list, a body directive
    /// naming more than one property, or an invalid header name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.target {
            Target::Header { name, .. } => {
                if !is_valid_header_name(name) {
                    return Err(ConfigError::InvalidHeaderName { name: name.clone() });
                }
                if self.properties.is_empty() {
                    return Err(ConfigError::EmptyProperties {
                        header: name.clone(),
                    });
                }
            }
            Target::Body => {
                if self.properties.len() != 1 {
                    return Err(ConfigError::BodyProperties {
                        count: self.properties.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn header_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    // RFC 9110 token characters
    TOKEN.get_or_init(|| Regex::new(r"^[!#$%&'*+.^_`|~0-9A-Za-z-]+$").expect("header token pattern is valid"))
}

/// Whether `name` is a valid HTTP header field name.
#[must_use]
pub fn is_valid_header_name(name: &str) -> bool {
    header_token().is_match(name)
}

/// Split a comma-separated property list, trimming whitespace and dropping
/// empty entries.
#[must_use]
pub fn split_properties(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Property list
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-wide, deduplicated list of properties the engine is initialised
/// with.
///
/// Metadata pseudo-properties are never added: the engine does not know them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyList {
    names: Vec<String>,
}

impl PropertyList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property unless it is metadata or already present (whole-name,
    /// case-sensitive comparison). Returns whether it was added.
    pub fn add(&mut self, name: &str) -> bool {
        if MetadataProperty::parse(name).is_some() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// Add every property of a directive.
    pub fn extend_from(&mut self, directive: &MatchDirective) {
        for name in directive.properties() {
            self.add(name);
        }
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Names in insertion order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Comma-joined form handed to the engine.
    #[must_use]
    pub fn joined(&self) -> String {
        self.names.join(",")
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check the joined length.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PropertiesTooLong`] past [`MAX_PROPERTIES_LENGTH`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let len = self.joined().len();
        if len > MAX_PROPERTIES_LENGTH {
            return Err(ConfigError::PropertiesTooLong {
                len,
                max: MAX_PROPERTIES_LENGTH,
            });
        }
        Ok(())
    }
}
