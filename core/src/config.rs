//! Module configuration.
//!
//! [`ModuleConfig`] is the serde-deserializable document; [`ModuleConfig::load`]
//! validates it into a [`Module`]: the settings, the combined property list,
//! and the scope tree.
//!
//! ```yaml
//! global:
//!   file_path: /data/device.hash
//!   value_separator: ","
//!   set_resp_headers: "on"
//!   directives:
//!     - { directive: match_ua, header: X-Device, properties: "IsMobile,BrowserName" }
//! servers:
//!   - name: example.com
//!     locations:
//!       - path: /js
//!         directives:
//!           - { directive: get_javascript_all, property: JavascriptHardwareProfile }
//! ```
//!
//! # Relationship to runtime types
//!
//! | Config type | Runtime type |
//! |-------------|-------------|
//! | [`ModuleConfig`] | [`Module`] |
//! | [`GlobalConfig`] | [`Settings`] + global [`ScopeConfig`] |
//! | [`ServerConfig`] | [`ServerScope`] |
//! | [`LocationConfig`] | [`LocationScope`] |
//! | [`DirectiveConfig`] | [`MatchDirective`] |

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::directive::{split_properties, MatchDirective, Mode, PropertyList, SourceVariable};
use crate::engine::PerformanceProfile;
use crate::scope::{EffectiveScope, ScopeConfig, ScopeLevel};
use crate::{ConfigError, DEFAULT_VALUE_SEPARATOR};

// ═══════════════════════════════════════════════════════════════════════════════
// Document
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Global settings and directives.
    #[serde(default)]
    pub global: GlobalConfig,

    /// Virtual servers. The first is the default.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Global block: engine settings plus global-scope directives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Dataset file. Unset leaves the module inactive.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Performance profile name, e.g. `IN_MEMORY`.
    #[serde(default)]
    pub performance_profile: Option<String>,
    /// Maximum drift.
    #[serde(default)]
    pub drift: Option<u32>,
    /// Maximum difference.
    #[serde(default)]
    pub difference: Option<u32>,
    /// Expected concurrent detections.
    #[serde(default)]
    pub max_concurrency: Option<u16>,
    /// Return a default profile instead of no match.
    #[serde(default)]
    pub allow_unmatched: Option<bool>,
    /// Evaluate the performance graph.
    #[serde(default)]
    pub use_performance_graph: Option<bool>,
    /// Evaluate the predictive graph.
    #[serde(default)]
    pub use_predictive_graph: Option<bool>,
    /// Separator between rendered property contributions.
    #[serde(default)]
    pub value_separator: Option<String>,
    /// `on` or `off`.
    #[serde(default)]
    pub set_resp_headers: Option<String>,
    /// Global-scope directives.
    #[serde(default)]
    pub directives: Vec<DirectiveConfig>,
}

/// Virtual-server block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name.
    pub name: String,
    /// `on` or `off`.
    #[serde(default)]
    pub set_resp_headers: Option<String>,
    /// Server-scope directives.
    #[serde(default)]
    pub directives: Vec<DirectiveConfig>,
    /// Locations, matched by longest path prefix.
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

/// Location block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    /// Path prefix.
    pub path: String,
    /// `on` or `off`.
    #[serde(default)]
    pub set_resp_headers: Option<String>,
    /// Location-scope directives.
    #[serde(default)]
    pub directives: Vec<DirectiveConfig>,
}

/// One directive occurrence.
///
/// Uses `#[serde(tag = "directive")]`:
///
/// ```yaml
/// - { directive: match_ua, header: X-Device, properties: "IsMobile", variable: $arg_ua }
/// - { directive: match_all, header: X-Device, properties: "IsMobile" }
/// - { directive: get_javascript_all, property: JavascriptHardwareProfile }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case", deny_unknown_fields)]
pub enum DirectiveConfig {
    /// Alias of `match_ua`.
    MatchSingle {
        /// Target request header.
        header: String,
        /// Comma-separated properties.
        properties: String,
        /// Source variable replacing the User-Agent.
        #[serde(default)]
        variable: Option<String>,
    },
    /// Single-source detection.
    MatchUa {
        /// Target request header.
        header: String,
        /// Comma-separated properties.
        properties: String,
        /// Source variable replacing the User-Agent.
        #[serde(default)]
        variable: Option<String>,
    },
    /// Client-hints detection.
    MatchClientHints {
        /// Target request header.
        header: String,
        /// Comma-separated properties.
        properties: String,
    },
    /// Detection over every evidence header.
    MatchAll {
        /// Target request header.
        header: String,
        /// Comma-separated properties.
        properties: String,
    },
    /// Body from single-source detection.
    GetJavascriptSingle {
        /// JavaScript property.
        property: String,
        /// Source variable replacing the User-Agent.
        #[serde(default)]
        variable: Option<String>,
    },
    /// Body from detection over every evidence header.
    GetJavascriptAll {
        /// JavaScript property.
        property: String,
    },
}

impl DirectiveConfig {
    /// Build the runtime directive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidVariable`] for a malformed variable.
    pub fn build(&self) -> Result<MatchDirective, ConfigError> {
        let (directive, variable) = match self {
            Self::MatchSingle {
                header,
                properties,
                variable,
            }
            | Self::MatchUa {
                header,
                properties,
                variable,
            } => (
                MatchDirective::header(Mode::UserAgent, header, split_properties(properties)),
                variable.as_deref(),
            ),
            Self::MatchClientHints { header, properties } => (
                MatchDirective::header(Mode::ClientHints, header, split_properties(properties)),
                None,
            ),
            Self::MatchAll { header, properties } => (
                MatchDirective::header(Mode::All, header, split_properties(properties)),
                None,
            ),
            Self::GetJavascriptSingle { property, variable } => (
                MatchDirective::body(Mode::UserAgent, property.trim()),
                variable.as_deref(),
            ),
            Self::GetJavascriptAll { property } => {
                (MatchDirective::body(Mode::All, property.trim()), None)
            }
        };
        match variable {
            Some(raw) => Ok(directive.with_source(SourceVariable::parse(raw)?)),
            None => Ok(directive),
        }
    }
}

impl ModuleConfig {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or unknown fields.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Validate into a [`Module`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: bad flag, profile, variable,
    /// header name, body placement, or an oversized property list.
    pub fn load(&self) -> Result<Module, ConfigError> {
        let settings = Settings::from_global(&self.global)?;
        let mut properties = PropertyList::new();

        let global = build_scope(
            ScopeLevel::Global,
            &self.global.directives,
            self.global.set_resp_headers.as_deref(),
            &mut properties,
        )?;

        let mut servers = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let scope = build_scope(
                ScopeLevel::Server,
                &server.directives,
                server.set_resp_headers.as_deref(),
                &mut properties,
            )?;
            let mut locations = Vec::with_capacity(server.locations.len());
            for location in &server.locations {
                locations.push(LocationScope {
                    path: location.path.clone(),
                    scope: build_scope(
                        ScopeLevel::Location,
                        &location.directives,
                        location.set_resp_headers.as_deref(),
                        &mut properties,
                    )?,
                });
            }
            servers.push(ServerScope {
                name: server.name.clone(),
                scope,
                locations,
            });
        }

        properties.validate()?;

        Ok(Module {
            settings,
            properties,
            global,
            servers,
        })
    }
}

fn build_scope(
    level: ScopeLevel,
    directives: &[DirectiveConfig],
    set_resp_headers: Option<&str>,
    properties: &mut PropertyList,
) -> Result<ScopeConfig, ConfigError> {
    let mut scope = ScopeConfig::new(level);
    for config in directives {
        let directive = config.build()?;
        properties.extend_from(&directive);
        scope.push(directive)?;
    }
    if let Some(value) = set_resp_headers {
        scope.set_emit_headers(parse_flag("set_resp_headers", value)?);
    }
    Ok(scope)
}

/// Parse an `on`/`off` flag.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidFlag`] for anything else.
pub fn parse_flag(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            field,
            value: value.to_string(),
        }),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runtime
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated global settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Dataset file. `None` leaves the module inactive.
    pub file_path: Option<PathBuf>,
    /// Requested performance profile.
    pub performance_profile: PerformanceProfile,
    /// Maximum drift.
    pub drift: Option<u32>,
    /// Maximum difference.
    pub difference: Option<u32>,
    /// Expected concurrent detections.
    pub max_concurrency: Option<u16>,
    /// Return a default profile instead of no match.
    pub allow_unmatched: Option<bool>,
    /// Evaluate the performance graph.
    pub use_performance_graph: Option<bool>,
    /// Evaluate the predictive graph.
    pub use_predictive_graph: Option<bool>,
    /// Separator between rendered property contributions.
    pub value_separator: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            file_path: None,
            performance_profile: PerformanceProfile::default(),
            drift: None,
            difference: None,
            max_concurrency: None,
            allow_unmatched: None,
            use_performance_graph: None,
            use_predictive_graph: None,
            value_separator: DEFAULT_VALUE_SEPARATOR.to_string(),
        }
    }
}

impl Settings {
    fn from_global(global: &GlobalConfig) -> Result<Self, ConfigError> {
        let performance_profile = match global.performance_profile.as_deref() {
            None => PerformanceProfile::default(),
            Some(name) => {
                PerformanceProfile::from_name(name).ok_or_else(|| ConfigError::UnknownProfile {
                    name: name.to_string(),
                    available: PerformanceProfile::NAMES.join(", "),
                })?
            }
        };

        let value_separator = match global.value_separator.as_deref() {
            Some("") => {
                warn!(default = DEFAULT_VALUE_SEPARATOR, "empty value separator, using default");
                DEFAULT_VALUE_SEPARATOR.to_string()
            }
            Some(separator) => separator.to_string(),
            None => DEFAULT_VALUE_SEPARATOR.to_string(),
        };

        Ok(Self {
            file_path: global.file_path.clone(),
            performance_profile,
            drift: global.drift,
            difference: global.difference,
            max_concurrency: global.max_concurrency,
            allow_unmatched: global.allow_unmatched,
            use_performance_graph: global.use_performance_graph,
            use_predictive_graph: global.use_predictive_graph,
            value_separator,
        })
    }
}

/// A location and its scope.
#[derive(Debug, Clone)]
pub struct LocationScope {
    /// Path prefix.
    pub path: String,
    /// Location-scope directives and flags.
    pub scope: ScopeConfig,
}

/// A virtual server, its scope, and its locations.
#[derive(Debug, Clone)]
pub struct ServerScope {
    /// Server name.
    pub name: String,
    /// Server-scope directives and flags.
    pub scope: ScopeConfig,
    /// Locations in configured order.
    pub locations: Vec<LocationScope>,
}

impl ServerScope {
    /// Location with the longest path prefix of `path`.
    #[must_use]
    pub fn location(&self, path: &str) -> Option<&LocationScope> {
        self.locations
            .iter()
            .filter(|l| path.starts_with(&l.path))
            .max_by_key(|l| l.path.len())
    }
}

/// Validated configuration: settings, combined property list, scope tree.
#[derive(Debug, Clone)]
pub struct Module {
    settings: Settings,
    properties: PropertyList,
    global: ScopeConfig,
    servers: Vec<ServerScope>,
}

impl Module {
    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns the parse or validation [`ConfigError`].
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        ModuleConfig::from_yaml(yaml)?.load()
    }

    /// Global settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Combined engine property list.
    #[must_use]
    pub fn properties(&self) -> &PropertyList {
        &self.properties
    }

    /// Global scope.
    #[must_use]
    pub fn global(&self) -> &ScopeConfig {
        &self.global
    }

    /// Servers in configured order.
    #[must_use]
    pub fn servers(&self) -> &[ServerScope] {
        &self.servers
    }

    /// Server named `name`, else the first server.
    #[must_use]
    pub fn server(&self, name: Option<&str>) -> Option<&ServerScope> {
        name.and_then(|n| self.servers.iter().find(|s| s.name == n))
            .or_else(|| self.servers.first())
    }

    /// Effective scope for a request to `server` at `path`.
    #[must_use]
    pub fn resolve(&self, server: Option<&str>, path: &str) -> EffectiveScope {
        let empty_server = ScopeConfig::new(ScopeLevel::Server);
        let empty_location = ScopeConfig::new(ScopeLevel::Location);

        let server = self.server(server);
        let location = server.and_then(|s| s.location(path));

        EffectiveScope::resolve(
            location.map_or(&empty_location, |l| &l.scope),
            server.map_or(&empty_server, |s| &s.scope),
            &self.global,
        )
    }

    /// Total configured directives across all scopes.
    #[must_use]
    pub fn directive_count(&self) -> usize {
        let count = |scope: &ScopeConfig| scope.directives().len() + usize::from(scope.body().is_some());
        count(&self.global)
            + self
                .servers
                .iter()
                .map(|s| count(&s.scope) + s.locations.iter().map(|l| count(&l.scope)).sum::<usize>())
                .sum::<usize>()
    }
}
