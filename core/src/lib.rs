//! evident - device-detection evidence pipeline
//!
//! Sits inside an HTTP request/response pipeline. For each request it decides
//! which configured *match directives* apply, gathers the evidence they need,
//! invokes a detection engine at most once per distinct evidence set, renders
//! the resulting property values, and injects or merges them into request
//! headers, response headers, or the response body.
//!
//! # Architecture
//!
//! Components, leaves first:
//!
//! - [`evidence`]: Evidence Collector. Extracts normalized evidence items from
//!   one request through the [`RequestView`] trait.
//! - [`ResultCache`]: Detection Invoker & Result Cache. At most one engine
//!   invocation per distinct [`Fingerprint`] within a request.
//! - [`EffectiveScope`]: Scope Resolver. Merges location, server, and global
//!   [`ScopeConfig`]s into one ordered view.
//! - [`Worker`]: Directive Dispatcher. Runs the per-request pass.
//! - [`Renderer`]: Value Renderer. Property names to one bounded string.
//! - [`HeaderList`]: Header Merger. Create-or-append with `,`.
//!
//! The detection engine itself is an external collaborator behind the
//! [`DetectionEngine`] and [`EngineLoader`] traits.
//!
//! # Example
//!
//! ```
//! use evident::prelude::*;
//!
//! let directive = MatchDirective::header(Mode::UserAgent, "X-Device", ["IsMobile", "BrowserName"]);
//!
//! let result = MatchResult::builder()
//!     .value("IsMobile", "True")
//!     .value("BrowserName", "Chrome")
//!     .build();
//!
//! let rendered = Renderer::new("|").render(&result, directive.properties(), true);
//! assert_eq!(rendered.as_str(), "True|Chrome");
//! ```

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

mod cache;
pub mod config;
mod dataset;
mod directive;
mod dispatch;
mod engine;
pub mod evidence;
mod headers;
mod render;
mod response;
mod scope;

#[cfg(test)]
mod testing;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

pub use cache::{Fingerprint, ResultCache};
pub use config::{Module, ModuleConfig, Settings};
pub use dataset::{Dataset, DatasetCell};
pub use directive::{MatchDirective, Mode, ModeSet, PropertyList, SourceVariable, Target, VariableKind};
pub use dispatch::{DirectiveFailure, PassReport, Phase, RequestContext, ResponseReport, Worker};
pub use engine::{
    DetectionEngine, EngineConfig, EngineLoader, EngineStatus, EvidenceItem, EvidenceKind,
    EvidenceSet, MatchMethod, MatchResult, MatchResultBuilder, OverridableProperty,
    PerformanceProfile,
};
pub use evidence::{Evidence, RequestView};
pub use headers::{Header, HeaderList};
pub use render::{escape_value, MetadataProperty, RenderedValue, Renderer, ValueBuffer};
pub use response::{BodyReplacement, ResponseHeaderPlan};
pub use scope::{EffectiveScope, ScopeConfig, ScopeLevel};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use evident::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Engine contract
        DetectionEngine,
        EngineError,
        EvidenceKind,
        EvidenceSet,
        MatchResult,
        // Directives and scopes
        EffectiveScope,
        MatchDirective,
        Mode,
        ScopeConfig,
        // Per-request pipeline
        HeaderList,
        RenderedValue,
        Renderer,
        RequestContext,
        RequestView,
        ResultCache,
        Worker,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Sentinel rendered for a property without a value when unavailable
/// properties are included.
pub const NO_MATCH: &str = "NoMatch";

/// Engine token stripped from multi-valued output when unavailable
/// properties are excluded.
pub const UNKNOWN: &str = "Unknown";

/// Separator between the values of one multi-valued property.
pub const INNER_SEPARATOR: &str = "|";

/// Default separator between the contributions of different properties.
pub const DEFAULT_VALUE_SEPARATOR: &str = ",";

/// Separator used when appending to an existing response header.
pub const HEADER_MERGE_SEPARATOR: &str = ",";

/// Maximum size in bytes of one rendered value.
pub const MAX_VALUE_LENGTH: usize = 20_000;

/// Maximum size in bytes of the combined, comma-joined engine property list.
pub const MAX_PROPERTIES_LENGTH: usize = 2048;

/// Body written when a body directive renders nothing usable.
pub const JAVASCRIPT_NOT_AVAILABLE: &str = "/* JavaScript not available. */";

/// Prefix of engine properties that declare response headers.
pub const SET_HEADER_PREFIX: &str = "SetHeader";

/// Prefix applied to override evidence names when the engine requires it.
pub const OVERRIDE_PREFIX: &str = "51D_";

/// Reserve factor applied to the dataset size reported by the engine.
pub const DATASET_RESERVE_FACTOR: f64 = 1.1;

/// Attempts made to decrement the shared worker counter on detach.
pub const WORKER_RELEASE_ATTEMPTS: usize = 5;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration errors.
///
/// Raised while loading a [`ModuleConfig`] or building scopes. These are
/// start-up failures: fix the configuration and reload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A scope already holds a body directive.
    #[error("{scope} scope already has a body directive for \"{existing}\" - only one is allowed per scope")]
    DuplicateBody {
        /// Scope that rejected the second directive.
        scope: ScopeLevel,
        /// Property of the directive already registered.
        existing: String,
    },
    /// Body directives are only valid inside a location.
    #[error("body directive for \"{property}\" is in the {scope} scope - move it into a location")]
    BodyOutsideLocation {
        /// Property of the misplaced directive.
        property: String,
        /// Scope it was found in.
        scope: ScopeLevel,
    },
    /// Body directives render exactly one property.
    #[error("body directive names {count} properties, but exactly one is allowed")]
    BodyProperties {
        /// Number of properties named.
        count: usize,
    },
    /// A source variable does not reference a recognised evidence variable.
    #[error("invalid source variable \"{variable}\" - expected $arg_<name>, $http_<name> or $cookie_<name>")]
    InvalidVariable {
        /// The rejected reference.
        variable: String,
    },
    /// A header directive with no properties.
    #[error("directive for header \"{header}\" has no properties")]
    EmptyProperties {
        /// Target header.
        header: String,
    },
    /// A target header name is not a valid HTTP token.
    #[error("invalid header name \"{name}\"")]
    InvalidHeaderName {
        /// The rejected name.
        name: String,
    },
    /// The combined property list exceeds [`MAX_PROPERTIES_LENGTH`].
    #[error("combined property list is {len} bytes, but maximum allowed is {max} - request fewer properties")]
    PropertiesTooLong {
        /// Joined length in bytes.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// A flag value that is not `on` or `off`.
    #[error("invalid value \"{value}\" for {field} - expected \"on\" or \"off\"")]
    InvalidFlag {
        /// Setting name.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
    /// Unknown performance profile name.
    #[error("unknown performance profile \"{name}\" - expected one of {available}")]
    UnknownProfile {
        /// The rejected name.
        name: String,
        /// Accepted names.
        available: String,
    },
    /// The data file path is set but empty.
    #[error("data file path is empty")]
    EmptyDataFile,
    /// The configuration document failed to deserialize.
    #[error("invalid config: {message}")]
    Parse {
        /// The underlying error message.
        message: String,
    },
    /// The dataset could not be sized or loaded.
    #[error("failed to load data file \"{path}\": {source}")]
    Dataset {
        /// Data file path.
        path: String,
        /// Engine error.
        source: EngineError,
    },
}

/// Error returned by a [`DetectionEngine`] or [`EngineLoader`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct EngineError {
    /// Engine status code.
    pub status: EngineStatus,
    /// Engine message.
    pub message: String,
}

impl EngineError {
    /// Create an engine error.
    pub fn new(status: EngineStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Errors that abort a request or response phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The engine ran out of memory while building the response.
    #[error("insufficient memory while processing {phase}")]
    ResourceExhausted {
        /// Phase that was aborted.
        phase: Phase,
    },
    /// Detection for the body directive failed.
    #[error("body directive for \"{property}\" could not be rendered: {source}")]
    Body {
        /// Property of the body directive.
        property: String,
        /// Engine error.
        source: EngineError,
    },
}
