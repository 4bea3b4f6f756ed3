//! Detection invoker and per-request result cache.
//!
//! # INV: one engine call per fingerprint per request
//!
//! Single-source directives key on the literal source string, so two
//! directives whose evidence resolves to the same bytes share one
//! [`MatchResult`], even when one reads the `User-Agent` header and the other
//! a source variable. Multi-header directives key on their mode; their
//! evidence set (overrides included) is built immediately before the one
//! invocation and dropped right after it.
//!
//! The cache lives in a [`RequestContext`](crate::RequestContext) and dies
//! with the request, so a directive never sees a previous request's result.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::directive::{MatchDirective, Mode};
use crate::engine::{DetectionEngine, MatchResult};
use crate::evidence::{self, RequestView};
use crate::EngineError;

/// Identity deciding whether a cached [`MatchResult`] can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Literal single-source string.
    Source(String),
    /// Multi-header evidence for this request in the given mode.
    Evidence(Mode),
}

impl Fingerprint {
    /// Fingerprint of `directive` against `request`.
    pub fn of<R>(request: &R, directive: &MatchDirective) -> Self
    where
        R: RequestView + ?Sized,
    {
        match directive.mode() {
            Mode::UserAgent => Self::Source(evidence::source_string(request, directive.source())),
            mode => Self::Evidence(mode),
        }
    }
}

/// Per-request memo of engine results.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<Fingerprint, Arc<MatchResult>>,
    invocations: usize,
    hits: usize,
}

impl ResultCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Result for `directive`, invoking the engine only on a miss.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`EngineError`]. Failed invocations are not
    /// cached.
    pub fn resolve<R, E>(
        &mut self,
        engine: &E,
        request: &R,
        directive: &MatchDirective,
    ) -> Result<Arc<MatchResult>, EngineError>
    where
        R: RequestView + ?Sized,
        E: DetectionEngine + ?Sized,
    {
        self.invoke(engine, request, Fingerprint::of(request, directive))
    }

    /// Result for `fingerprint`, invoking the engine only on a miss.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`EngineError`]. Failed invocations are not
    /// cached.
    pub fn invoke<R, E>(
        &mut self,
        engine: &E,
        request: &R,
        fingerprint: Fingerprint,
    ) -> Result<Arc<MatchResult>, EngineError>
    where
        R: RequestView + ?Sized,
        E: DetectionEngine + ?Sized,
    {
        if let Some(hit) = self.entries.get(&fingerprint) {
            self.hits += 1;
            debug!(?fingerprint, "reusing match result");
            return Ok(Arc::clone(hit));
        }

        let result = match &fingerprint {
            Fingerprint::Source(source) => engine.match_source(source)?,
            Fingerprint::Evidence(mode) => {
                let set = evidence::evidence_set(request, engine, *mode);
                debug!(mode = %mode, items = set.len(), "matching evidence");
                engine.match_evidence(&set)?
            }
        };
        self.invocations += 1;

        let result = Arc::new(result);
        self.entries.insert(fingerprint, Arc::clone(&result));
        Ok(result)
    }

    /// Cached result for `fingerprint`, if any.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Arc<MatchResult>> {
        self.entries.get(fingerprint)
    }

    /// Successful engine invocations so far.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    /// Results served from the cache so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of distinct cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
