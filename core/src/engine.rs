//! Detection engine contract.
//!
//! The engine is a black box: it accepts a single source string or an
//! [`EvidenceSet`] and returns a [`MatchResult`]. Everything here is the
//! interface the pipeline consumes; how a match is computed is the engine's
//! business.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::config::Settings;
use crate::directive::PropertyList;
use crate::EngineError;

// ═══════════════════════════════════════════════════════════════════════════════
// Status and match method
// ═══════════════════════════════════════════════════════════════════════════════

/// Status reported by a failed engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    /// The engine could not allocate working memory.
    InsufficientMemory,
    /// The data file is malformed.
    CorruptData,
    /// The data file version is not supported by the engine.
    IncorrectVersion,
    /// The data file does not exist.
    FileNotFound,
    /// The data file exists but cannot be read.
    FileAccessError,
    /// The evidence handed to the engine is unusable.
    InvalidEvidence,
    /// Any other engine status code.
    Other(i32),
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientMemory => f.write_str("insufficient memory"),
            Self::CorruptData => f.write_str("corrupt data"),
            Self::IncorrectVersion => f.write_str("incorrect data file version"),
            Self::FileNotFound => f.write_str("data file not found"),
            Self::FileAccessError => f.write_str("data file not readable"),
            Self::InvalidEvidence => f.write_str("invalid evidence"),
            Self::Other(code) => write!(f, "engine status {code}"),
        }
    }
}

/// How the engine arrived at a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMethod {
    /// No match was found.
    #[default]
    None,
    /// Matched through the performance graph.
    Performance,
    /// Matched through both graphs.
    Combined,
    /// Matched through the predictive graph.
    Predictive,
}

impl MatchMethod {
    /// Map an engine method code. Unrecognised codes map to [`MatchMethod::None`].
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Performance,
            2 => Self::Combined,
            3 => Self::Predictive,
            _ => Self::None,
        }
    }

    /// Textual label rendered for the `Method` metadata property.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Performance => "PERFORMANCE",
            Self::Combined => "COMBINED",
            Self::Predictive => "PREDICTIVE",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evidence
// ═══════════════════════════════════════════════════════════════════════════════

/// Where an evidence item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceKind {
    /// A request header.
    Header,
    /// A query-string parameter.
    Query,
    /// A cookie.
    Cookie,
}

impl EvidenceKind {
    /// Prefix the engine uses for this kind of evidence key.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Cookie => "cookie",
        }
    }
}

/// One `(kind, key, value)` evidence triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceItem {
    /// Source of the item.
    pub kind: EvidenceKind,
    /// Header, parameter, or cookie name.
    pub key: String,
    /// Value, already percent-decoded for query parameters.
    pub value: String,
}

/// Ordered evidence handed to [`DetectionEngine::match_evidence`].
///
/// Built fresh for every invocation and dropped with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceSet {
    items: Vec<EvidenceItem>,
}

impl EvidenceSet {
    /// Create an empty evidence set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Items are kept in insertion order.
    pub fn push(&mut self, kind: EvidenceKind, key: impl Into<String>, value: impl Into<String>) {
        self.items.push(EvidenceItem {
            kind,
            key: key.into(),
            value: value.into(),
        });
    }

    /// First value recorded for `kind` and `key`. Keys compare case-insensitively.
    #[must_use]
    pub fn get(&self, kind: EvidenceKind, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.kind == kind && item.key.eq_ignore_ascii_case(key))
            .map(|item| item.value.as_str())
    }

    /// Iterate over items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items.iter()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a EvidenceItem;
    type IntoIter = std::slice::Iter<'a, EvidenceItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// An engine property whose value a caller may supply through evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridableProperty {
    /// Property name.
    pub name: String,
    /// Whether cookie and query keys carry the [`OVERRIDE_PREFIX`](crate::OVERRIDE_PREFIX).
    pub requires_prefix: bool,
}

impl OverridableProperty {
    /// Create an overridable property.
    pub fn new(name: impl Into<String>, requires_prefix: bool) -> Self {
        Self {
            name: name.into(),
            requires_prefix,
        }
    }

    /// Cookie or query-parameter name carrying an override for this property.
    #[must_use]
    pub fn evidence_key(&self) -> String {
        if self.requires_prefix {
            format!("{}{}", crate::OVERRIDE_PREFIX, self.name)
        } else {
            self.name.clone()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Match result
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of one engine invocation.
///
/// Shared through `Arc` between directives in the same request whose
/// evidence is identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    values: HashMap<String, Vec<String>>,
    method: MatchMethod,
    iterations: i32,
    drift: i32,
    difference: i32,
    matched_nodes: i32,
    user_agents: Vec<String>,
    device_id: String,
}

impl MatchResult {
    /// Create a builder for `MatchResult`.
    #[must_use]
    pub fn builder() -> MatchResultBuilder {
        MatchResultBuilder::default()
    }

    /// Values of a property, in engine order. Empty when it has none.
    #[must_use]
    pub fn values(&self, property: &str) -> &[String] {
        self.values.get(property).map_or(&[], Vec::as_slice)
    }

    /// Whether the property resolved to at least one value.
    #[must_use]
    pub fn has_values(&self, property: &str) -> bool {
        self.values.get(property).is_some_and(|v| !v.is_empty())
    }

    /// Identifier of the matched device profile combination.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Match method.
    #[must_use]
    pub fn method(&self) -> MatchMethod {
        self.method
    }

    /// Graph iterations performed.
    #[must_use]
    pub fn iterations(&self) -> i32 {
        self.iterations
    }

    /// Drift used for the match.
    #[must_use]
    pub fn drift(&self) -> i32 {
        self.drift
    }

    /// Difference of the match.
    #[must_use]
    pub fn difference(&self) -> i32 {
        self.difference
    }

    /// Nodes matched in the evidence.
    #[must_use]
    pub fn matched_nodes(&self) -> i32 {
        self.matched_nodes
    }

    /// Matched substrings of the evaluated user agents.
    #[must_use]
    pub fn user_agents(&self) -> &[String] {
        &self.user_agents
    }
}

/// Builder for `MatchResult`.
#[derive(Debug, Default)]
pub struct MatchResultBuilder {
    result: MatchResult,
}

impl MatchResultBuilder {
    /// Append one value to a property.
    #[must_use]
    pub fn value(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.result
            .values
            .entry(property.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Set all values of a property.
    #[must_use]
    pub fn values<I, S>(mut self, property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.result
            .values
            .insert(property.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the match method.
    #[must_use]
    pub fn method(mut self, method: MatchMethod) -> Self {
        self.result.method = method;
        self
    }

    /// Set the iteration, drift, and difference counters.
    #[must_use]
    pub fn counters(mut self, iterations: i32, drift: i32, difference: i32) -> Self {
        self.result.iterations = iterations;
        self.result.drift = drift;
        self.result.difference = difference;
        self
    }

    /// Set the matched-node count.
    #[must_use]
    pub fn matched_nodes(mut self, matched_nodes: i32) -> Self {
        self.result.matched_nodes = matched_nodes;
        self
    }

    /// Append a matched user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.result.user_agents.push(user_agent.into());
        self
    }

    /// Set the device id.
    #[must_use]
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.result.device_id = device_id.into();
        self
    }

    /// Build the `MatchResult`.
    #[must_use]
    pub fn build(self) -> MatchResult {
        self.result
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Dataset performance profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceProfile {
    /// Whole dataset in memory.
    #[default]
    InMemory,
    /// Large caches, most data in memory.
    HighPerformance,
    /// Minimal memory, streamed from disk.
    LowMemory,
    /// Balance of memory and speed.
    Balanced,
    /// Balanced, with a temporary copy of the data file.
    BalancedTemp,
    /// Engine default.
    Default,
}

impl PerformanceProfile {
    /// Accepted configuration names.
    pub const NAMES: [&'static str; 6] = [
        "IN_MEMORY",
        "HIGH_PERFORMANCE",
        "LOW_MEMORY",
        "BALANCED",
        "BALANCED_TEMP",
        "DEFAULT",
    ];

    /// Parse a configuration name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "IN_MEMORY" => Some(Self::InMemory),
            "HIGH_PERFORMANCE" => Some(Self::HighPerformance),
            "LOW_MEMORY" => Some(Self::LowMemory),
            "BALANCED" => Some(Self::Balanced),
            "BALANCED_TEMP" => Some(Self::BalancedTemp),
            "DEFAULT" => Some(Self::Default),
            _ => None,
        }
    }

    /// Configuration name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::InMemory => "IN_MEMORY",
            Self::HighPerformance => "HIGH_PERFORMANCE",
            Self::LowMemory => "LOW_MEMORY",
            Self::Balanced => "BALANCED",
            Self::BalancedTemp => "BALANCED_TEMP",
            Self::Default => "DEFAULT",
        }
    }
}

/// Configuration handed to the [`EngineLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Always [`PerformanceProfile::InMemory`]; other profiles need memory
    /// shared outside the worker.
    pub profile: PerformanceProfile,
    /// Maximum drift, when set.
    pub drift: Option<u32>,
    /// Maximum difference, when set.
    pub difference: Option<u32>,
    /// Expected concurrent detections.
    pub concurrency: u16,
    /// Return a default profile instead of no match.
    pub allow_unmatched: Option<bool>,
    /// Evaluate the performance graph.
    pub use_performance_graph: Option<bool>,
    /// Evaluate the predictive graph.
    pub use_predictive_graph: Option<bool>,
}

impl EngineConfig {
    /// Map module settings onto engine configuration.
    ///
    /// Unsupported profiles fall back to in-memory with a warning. Drift and
    /// difference apply only when positive. Concurrency defaults to
    /// `workers`.
    #[must_use]
    pub fn from_settings(settings: &Settings, workers: u16) -> Self {
        if settings.performance_profile != PerformanceProfile::InMemory {
            tracing::warn!(
                profile = settings.performance_profile.name(),
                "performance profile is not supported, using IN_MEMORY"
            );
        }
        Self {
            profile: PerformanceProfile::InMemory,
            drift: settings.drift.filter(|d| *d > 0),
            difference: settings.difference.filter(|d| *d > 0),
            concurrency: settings.max_concurrency.unwrap_or(workers).max(1),
            allow_unmatched: settings.allow_unmatched,
            use_performance_graph: settings.use_performance_graph,
            use_predictive_graph: settings.use_predictive_graph,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine traits
// ═══════════════════════════════════════════════════════════════════════════════

/// A loaded detection engine.
///
/// Shared read-only across workers, so implementations must be
/// `Send + Sync`. Calls are synchronous and assumed to complete promptly.
pub trait DetectionEngine: Send + Sync {
    /// Detect from a single source string such as a User-Agent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the engine reports a non-success status.
    fn match_source(&self, source: &str) -> Result<MatchResult, EngineError>;

    /// Detect from a multi-item evidence set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the engine reports a non-success status.
    fn match_evidence(&self, evidence: &EvidenceSet) -> Result<MatchResult, EngineError>;

    /// Properties whose values callers may override through evidence.
    fn overridable_properties(&self) -> &[OverridableProperty];

    /// Distinct request header names the engine consumes as evidence.
    fn unique_headers(&self) -> &[String];

    /// Every property the loaded dataset can return.
    fn available_properties(&self) -> &[String];
}

/// Sizes and loads a dataset into a [`DetectionEngine`].
pub trait EngineLoader {
    /// Engine produced by this loader.
    type Engine: DetectionEngine;

    /// Bytes needed to hold the dataset for `properties`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the data file cannot be read.
    fn size_from_file(
        &self,
        config: &EngineConfig,
        properties: &PropertyList,
        path: &Path,
    ) -> Result<usize, EngineError>;

    /// Load the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the data file cannot be loaded.
    fn init_from_file(
        &self,
        config: &EngineConfig,
        properties: &PropertyList,
        path: &Path,
    ) -> Result<Self::Engine, EngineError>;
}
