//! Unit-test doubles shared across modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::{DetectionEngine, EngineStatus, EvidenceKind, EvidenceSet, MatchResult, OverridableProperty};
use crate::evidence::RequestView;
use crate::EngineError;

#[derive(Debug, Default)]
pub(crate) struct Request {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl Request {
    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub(crate) fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub(crate) fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

impl RequestView for Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Engine answering from fixed tables and counting calls.
///
/// Single-source results are looked up by exact source string. Evidence
/// results are looked up by the `User-Agent` header item. A source equal to
/// `fail` or `oom` fails with the matching status.
#[derive(Debug)]
pub(crate) struct Engine {
    headers: Vec<String>,
    overrides: Vec<OverridableProperty>,
    available: Vec<String>,
    results: HashMap<String, MatchResult>,
    calls: AtomicUsize,
    last_evidence: std::sync::Mutex<Option<EvidenceSet>>,
}

impl Engine {
    pub(crate) fn new() -> Self {
        Self {
            headers: ["User-Agent", "Sec-CH-UA", "Sec-CH-UA-Mobile", "Device-Stock-UA"]
                .map(String::from)
                .to_vec(),
            overrides: vec![
                OverridableProperty::new("ScreenPixelsWidth", true),
                OverridableProperty::new("JavascriptHardwareProfile", false),
            ],
            available: Vec::new(),
            results: HashMap::new(),
            calls: AtomicUsize::new(0),
            last_evidence: std::sync::Mutex::new(None),
        }
    }

    pub(crate) fn with_result(mut self, source: &str, result: MatchResult) -> Self {
        self.results.insert(source.to_string(), result);
        self
    }

    pub(crate) fn with_available(mut self, names: &[&str]) -> Self {
        self.available = names.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_evidence(&self) -> Option<EvidenceSet> {
        self.last_evidence.lock().ok().and_then(|e| e.clone())
    }

    fn lookup(&self, source: &str) -> Result<MatchResult, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match source {
            "fail" => Err(EngineError::new(EngineStatus::CorruptData, "bad node offset")),
            "oom" => Err(EngineError::new(EngineStatus::InsufficientMemory, "allocation failed")),
            _ => Ok(self.results.get(source).cloned().unwrap_or_default()),
        }
    }
}

impl DetectionEngine for Engine {
    fn match_source(&self, source: &str) -> Result<MatchResult, EngineError> {
        self.lookup(source)
    }

    fn match_evidence(&self, evidence: &EvidenceSet) -> Result<MatchResult, EngineError> {
        if let Ok(mut last) = self.last_evidence.lock() {
            *last = Some(evidence.clone());
        }
        let source = evidence
            .get(EvidenceKind::Header, "User-Agent")
            .unwrap_or_default()
            .to_string();
        self.lookup(&source)
    }

    fn overridable_properties(&self) -> &[OverridableProperty] {
        &self.overrides
    }

    fn unique_headers(&self) -> &[String] {
        &self.headers
    }

    fn available_properties(&self) -> &[String] {
        &self.available
    }
}
