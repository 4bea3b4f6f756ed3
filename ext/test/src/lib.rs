//! evident-test: deterministic engine and request doubles for conformance
//! testing.
//!
//! [`FixtureEngine`] answers from a fixed device table keyed by User-Agent and
//! counts every call, so tests can assert how often the pipeline reached the
//! engine. [`TestRequest`] is a plain map-backed [`RequestView`].
//!
//! # Example
//!
//! ```
//! use evident_test::prelude::*;
//!
//! let engine = FixtureEngine::new().with_device(
//!     "Mozilla/5.0 (iPhone)",
//!     DeviceSpec::new().value("IsMobile", "True"),
//! );
//!
//! let result = engine.match_source("Mozilla/5.0 (iPhone)").unwrap();
//! assert_eq!(result.values("IsMobile"), ["True".to_string()]);
//! assert_eq!(engine.calls(), 1);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use evident::prelude::*;
use evident::{EngineStatus, MatchMethod, OverridableProperty};
use serde::Deserialize;

#[cfg(feature = "fixtures")]
use evident::{EngineConfig, EngineLoader, PropertyList};
#[cfg(feature = "fixtures")]
use std::path::Path;


/// Evidence headers used when a description names none.
pub const DEFAULT_UNIQUE_HEADERS: [&str; 6] = [
    "User-Agent",
    "Sec-CH-UA",
    "Sec-CH-UA-Mobile",
    "Sec-CH-UA-Platform",
    "Device-Stock-UA",
    "X-Operamini-Phone-UA",
];

// ═══════════════════════════════════════════════════════════════════════════════
// Engine description
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable description of a [`FixtureEngine`].
///
/// ```yaml
/// available: [IsMobile, SetHeaderBrowserAccept-CH]
/// overridable:
///   - { name: ScreenPixelsWidth, requires_prefix: true }
/// devices:
///   - user_agent: "Mozilla/5.0 (iPhone)"
///     device_id: "12280-48866-24305-18092"
///     values: { IsMobile: "True", SetHeaderBrowserAccept-CH: [Sec-CH-UA, Sec-CH-UA-Mobile] }
/// failures:
///   - { source: broken, status: corrupt_data, message: bad node offset }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSpec {
    /// Evidence header names.
    #[serde(default = "default_unique_headers")]
    pub unique_headers: Vec<String>,
    /// Overridable properties.
    #[serde(default)]
    pub overridable: Vec<OverrideSpec>,
    /// Properties the dataset exposes.
    #[serde(default)]
    pub available: Vec<String>,
    /// Known devices.
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    /// Sources that make the engine fail.
    #[serde(default)]
    pub failures: Vec<FailureSpec>,
}

impl Default for EngineSpec {
    fn default() -> Self {
        Self {
            unique_headers: default_unique_headers(),
            overridable: Vec::new(),
            available: Vec::new(),
            devices: Vec::new(),
            failures: Vec::new(),
        }
    }
}

fn default_unique_headers() -> Vec<String> {
    DEFAULT_UNIQUE_HEADERS.map(String::from).to_vec()
}

/// An overridable property.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideSpec {
    /// Property name.
    pub name: String,
    /// Whether evidence keys carry the `51D_` prefix.
    #[serde(default)]
    pub requires_prefix: bool,
}

/// One or several property values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    /// A single value.
    One(String),
    /// Several values.
    Many(Vec<String>),
}

impl ValueSpec {
    fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(v) => vec![v.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// A known device.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSpec {
    /// Exact User-Agent matched. Filled in by the builder API.
    #[serde(default)]
    pub user_agent: String,
    /// Device id.
    #[serde(default)]
    pub device_id: String,
    /// Match method code: 1 performance, 2 combined, 3 predictive.
    #[serde(default = "default_method")]
    pub method: i32,
    /// Property values.
    #[serde(default)]
    pub values: BTreeMap<String, ValueSpec>,
}

fn default_method() -> i32 {
    1
}

impl DeviceSpec {
    /// Device with no values and the performance method.
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: default_method(),
            ..Self::default()
        }
    }

    /// Set one property value.
    #[must_use]
    pub fn value(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(property.into(), ValueSpec::One(value.into()));
        self
    }

    /// Set a multi-valued property.
    #[must_use]
    pub fn values<I, S>(mut self, property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.insert(
            property.into(),
            ValueSpec::Many(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Set the device id.
    #[must_use]
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }
}

/// A source string the engine fails on.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureSpec {
    /// User-Agent that triggers the failure.
    pub source: String,
    /// Reported status.
    pub status: StatusSpec,
    /// Reported message.
    #[serde(default)]
    pub message: String,
}

/// Serializable [`EngineStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSpec {
    /// [`EngineStatus::InsufficientMemory`].
    InsufficientMemory,
    /// [`EngineStatus::CorruptData`].
    CorruptData,
    /// [`EngineStatus::InvalidEvidence`].
    InvalidEvidence,
}

impl From<StatusSpec> for EngineStatus {
    fn from(spec: StatusSpec) -> Self {
        match spec {
            StatusSpec::InsufficientMemory => Self::InsufficientMemory,
            StatusSpec::CorruptData => Self::CorruptData,
            StatusSpec::InvalidEvidence => Self::InvalidEvidence,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Deterministic in-memory [`DetectionEngine`].
///
/// Single-source detection looks the source up in the device table.
/// Evidence detection uses the `User-Agent` header item (falling back to a
/// `User-Agent` query item), then applies any override evidence for the
/// engine's overridable properties. Unknown sources produce an empty result
/// with [`MatchMethod::None`].
#[derive(Debug)]
pub struct FixtureEngine {
    unique_headers: Vec<String>,
    overridable: Vec<OverridableProperty>,
    available: Vec<String>,
    devices: HashMap<String, DeviceSpec>,
    failures: HashMap<String, EngineError>,
    source_calls: AtomicUsize,
    evidence_calls: AtomicUsize,
}

impl Default for FixtureEngine {
    fn default() -> Self {
        Self::from_spec(EngineSpec::default())
    }
}

impl FixtureEngine {
    /// Engine with the default evidence headers and no devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a spec.
    #[must_use]
    pub fn from_spec(spec: EngineSpec) -> Self {
        Self {
            unique_headers: spec.unique_headers,
            overridable: spec
                .overridable
                .into_iter()
                .map(|o| OverridableProperty::new(o.name, o.requires_prefix))
                .collect(),
            available: spec.available,
            devices: spec
                .devices
                .into_iter()
                .map(|d| (d.user_agent.clone(), d))
                .collect(),
            failures: spec
                .failures
                .into_iter()
                .map(|f| (f.source, EngineError::new(f.status.into(), f.message)))
                .collect(),
            source_calls: AtomicUsize::new(0),
            evidence_calls: AtomicUsize::new(0),
        }
    }

    /// Parse a YAML [`EngineSpec`].
    ///
    /// # Errors
    ///
    /// Returns the YAML error for a malformed document.
    #[cfg(feature = "fixtures")]
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml).map(Self::from_spec)
    }

    /// Parse a JSON [`EngineSpec`].
    ///
    /// # Errors
    ///
    /// Returns the JSON error for a malformed document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::from_spec)
    }

    /// Add a device matched by exact User-Agent.
    #[must_use]
    pub fn with_device(mut self, user_agent: impl Into<String>, mut device: DeviceSpec) -> Self {
        device.user_agent = user_agent.into();
        self.devices.insert(device.user_agent.clone(), device);
        self
    }

    /// Declare available properties.
    #[must_use]
    pub fn with_available<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare an overridable property.
    #[must_use]
    pub fn with_override(mut self, name: impl Into<String>, requires_prefix: bool) -> Self {
        self.overridable.push(OverridableProperty::new(name, requires_prefix));
        self
    }

    /// Fail with `status` whenever `source` is matched.
    #[must_use]
    pub fn with_failure(mut self, source: impl Into<String>, status: EngineStatus, message: impl Into<String>) -> Self {
        self.failures.insert(source.into(), EngineError::new(status, message));
        self
    }

    /// Single-source calls so far.
    #[must_use]
    pub fn source_calls(&self) -> usize {
        self.source_calls.load(Ordering::SeqCst)
    }

    /// Evidence calls so far.
    #[must_use]
    pub fn evidence_calls(&self) -> usize {
        self.evidence_calls.load(Ordering::SeqCst)
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.source_calls() + self.evidence_calls()
    }

    fn detect(&self, source: &str, overrides: &[(&str, &str)]) -> Result<MatchResult, EngineError> {
        if let Some(err) = self.failures.get(source) {
            return Err(err.clone());
        }
        let Some(device) = self.devices.get(source) else {
            return Ok(MatchResult::default());
        };

        let mut builder = MatchResult::builder()
            .method(MatchMethod::from_code(device.method))
            .counters(1, 0, 0)
            .matched_nodes(1)
            .user_agent(device.user_agent.as_str())
            .device_id(device.device_id.as_str());
        for (property, value) in &device.values {
            builder = builder.values(property.as_str(), value.to_vec());
        }
        for (property, value) in overrides {
            builder = builder.values(*property, [*value]);
        }
        Ok(builder.build())
    }
}

impl DetectionEngine for FixtureEngine {
    fn match_source(&self, source: &str) -> Result<MatchResult, EngineError> {
        self.source_calls.fetch_add(1, Ordering::SeqCst);
        self.detect(source, &[])
    }

    fn match_evidence(&self, evidence: &EvidenceSet) -> Result<MatchResult, EngineError> {
        self.evidence_calls.fetch_add(1, Ordering::SeqCst);
        let source = evidence
            .get(EvidenceKind::Header, "User-Agent")
            .or_else(|| evidence.get(EvidenceKind::Query, "User-Agent"))
            .unwrap_or_default();

        // Later items win, so a query override beats a cookie.
        let mut overrides: Vec<(&str, &str)> = Vec::new();
        for property in &self.overridable {
            let key = property.evidence_key();
            for kind in [EvidenceKind::Cookie, EvidenceKind::Query] {
                if let Some(value) = evidence.get(kind, &key) {
                    overrides.retain(|(name, _)| *name != property.name);
                    overrides.push((property.name.as_str(), value));
                }
            }
        }
        self.detect(source, &overrides)
    }

    fn overridable_properties(&self) -> &[OverridableProperty] {
        &self.overridable
    }

    fn unique_headers(&self) -> &[String] {
        &self.unique_headers
    }

    fn available_properties(&self) -> &[String] {
        &self.available
    }
}

/// [`EngineLoader`] reading an [`EngineSpec`] from the data file path.
///
/// Files ending in `.json` are parsed as JSON, anything else as YAML.
#[cfg(feature = "fixtures")]
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureLoader;

#[cfg(feature = "fixtures")]
impl EngineLoader for FixtureLoader {
    type Engine = FixtureEngine;

    fn size_from_file(&self, _: &EngineConfig, _: &PropertyList, path: &Path) -> Result<usize, EngineError> {
        let meta = std::fs::metadata(path).map_err(|e| EngineError::new(EngineStatus::FileNotFound, e.to_string()))?;
        usize::try_from(meta.len()).map_err(|e| EngineError::new(EngineStatus::InsufficientMemory, e.to_string()))
    }

    fn init_from_file(&self, _: &EngineConfig, _: &PropertyList, path: &Path) -> Result<FixtureEngine, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::new(EngineStatus::FileAccessError, e.to_string()))?;
        let corrupt = |message: String| EngineError::new(EngineStatus::CorruptData, message);

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            FixtureEngine::from_json(&content).map_err(|e| corrupt(e.to_string()))
        } else {
            FixtureEngine::from_yaml(&content).map_err(|e| corrupt(e.to_string()))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════════════════════════

/// Map-backed [`RequestView`]. Header names compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TestRequest {
    headers: Vec<(String, String)>,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl TestRequest {
    /// Empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header (builder pattern).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a raw, still percent-encoded query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

impl RequestView for TestRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{DeviceSpec, EngineSpec, FixtureEngine, TestRequest};
    pub use evident::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";

    fn engine() -> FixtureEngine {
        FixtureEngine::new()
            .with_device(
                IPHONE,
                DeviceSpec::new()
                    .value("IsMobile", "True")
                    .value("ScreenPixelsWidth", "1170")
                    .device_id("12280-48866-24305-18092"),
            )
            .with_override("ScreenPixelsWidth", true)
    }

    #[test]
    fn test_source_lookup() {
        let engine = engine();
        let result = engine.match_source(IPHONE).unwrap();
        assert_eq!(result.values("IsMobile"), ["True".to_string()]);
        assert_eq!(result.device_id(), "12280-48866-24305-18092");
        assert_eq!(result.method(), MatchMethod::Performance);
        assert_eq!(engine.source_calls(), 1);
    }

    #[test]
    fn test_unknown_source_is_empty() {
        let result = engine().match_source("curl/8.0").unwrap();
        assert!(!result.has_values("IsMobile"));
        assert_eq!(result.method(), MatchMethod::None);
    }

    #[test]
    fn test_evidence_overrides_apply() {
        let engine = engine();
        let mut evidence = EvidenceSet::new();
        evidence.push(EvidenceKind::Header, "User-Agent", IPHONE);
        evidence.push(EvidenceKind::Cookie, "51D_ScreenPixelsWidth", "800");
        evidence.push(EvidenceKind::Query, "51D_ScreenPixelsWidth", "640");

        let result = engine.match_evidence(&evidence).unwrap();
        assert_eq!(result.values("ScreenPixelsWidth"), ["640".to_string()]);
        assert_eq!(engine.evidence_calls(), 1);
    }

    #[test]
    fn test_failure_reported() {
        let engine = engine().with_failure("broken", EngineStatus::CorruptData, "bad node offset");
        let err = engine.match_source("broken").unwrap_err();
        assert_eq!(err.status, EngineStatus::CorruptData);
        assert_eq!(engine.calls(), 1);
    }

    #[test]
    fn test_request_headers_case_insensitive() {
        let request = TestRequest::new()
            .with_header("user-agent", IPHONE)
            .with_query("ua", "x%20y")
            .with_cookie("id", "1");
        assert_eq!(request.header("User-Agent"), Some(IPHONE));
        assert_eq!(request.query_param("ua"), Some("x%20y"));
        assert_eq!(request.cookie("id"), Some("1"));
    }

    #[test]
    fn test_spec_from_yaml() {
        let spec: EngineSpec = serde_yaml::from_str(
            r"
available: [IsMobile]
devices:
  - user_agent: test-ua
    values: { IsMobile: 'True', HardwareName: [iPhone, iPhone 15] }
failures:
  - { source: oom, status: insufficient_memory }
",
        )
        .unwrap();
        let engine = FixtureEngine::from_spec(spec);
        let result = engine.match_source("test-ua").unwrap();
        assert_eq!(result.values("HardwareName").len(), 2);
        assert_eq!(
            engine.match_source("oom").unwrap_err().status,
            EngineStatus::InsufficientMemory
        );
        assert_eq!(engine.unique_headers().len(), DEFAULT_UNIQUE_HEADERS.len());
    }

    #[test]
    fn test_spec_from_json() {
        let engine = FixtureEngine::from_json(
            r#"{
                "overridable": [{ "name": "ScreenPixelsWidth", "requires_prefix": true }],
                "devices": [
                    { "user_agent": "test-ua", "method": 3, "values": { "PlatformName": "Android" } }
                ]
            }"#,
        )
        .unwrap();
        let result = engine.match_source("test-ua").unwrap();
        assert_eq!(result.values("PlatformName"), ["Android".to_string()]);
        assert_eq!(result.method(), MatchMethod::Predictive);
        assert_eq!(engine.overridable_properties().len(), 1);
    }

    #[test]
    fn test_spec_from_json_rejects_unknown_fields() {
        assert!(FixtureEngine::from_json(r#"{ "devices": [], "profile": "x" }"#).is_err());
    }

    #[cfg(feature = "fixtures")]
    #[test]
    fn test_loader_reads_json_and_yaml_data_files() {
        let dir = std::env::temp_dir().join(format!("evident-test-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let json_path = dir.join("engine.json");
        let yaml_path = dir.join("engine.yaml");
        std::fs::write(&json_path, r#"{ "devices": [{ "user_agent": "json-ua", "values": { "IsMobile": "True" } }] }"#)
            .unwrap();
        std::fs::write(&yaml_path, "devices:\n  - { user_agent: yaml-ua, values: { IsMobile: 'False' } }\n").unwrap();

        let config = EngineConfig::from_settings(&evident::Settings::default(), 1);
        let properties = PropertyList::new();

        let from_json = FixtureLoader.init_from_file(&config, &properties, &json_path).unwrap();
        assert_eq!(from_json.match_source("json-ua").unwrap().values("IsMobile"), ["True".to_string()]);
        let from_yaml = FixtureLoader.init_from_file(&config, &properties, &yaml_path).unwrap();
        assert_eq!(from_yaml.match_source("yaml-ua").unwrap().values("IsMobile"), ["False".to_string()]);

        std::fs::write(&json_path, "devices: []").unwrap();
        let err = FixtureLoader.init_from_file(&config, &properties, &json_path).unwrap_err();
        assert_eq!(err.status, EngineStatus::CorruptData);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
