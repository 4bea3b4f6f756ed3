//! Configuration scopes and their per-request merge.
//!
//! Three scopes nest: location inside server inside global. The effective
//! view is computed by [`EffectiveScope::resolve`] from three snapshots;
//! nothing is mutated per request.

use std::fmt;
use std::sync::Arc;

use crate::directive::{MatchDirective, ModeSet};
use crate::ConfigError;

/// Level of a [`ScopeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeLevel {
    /// A location inside a server.
    Location,
    /// A virtual server.
    Server,
    /// The top level.
    Global,
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Location => "location",
            Self::Server => "server",
            Self::Global => "global",
        })
    }
}

/// Directives and flags configured at one level.
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    level: ScopeLevel,
    directives: Vec<Arc<MatchDirective>>,
    body: Option<Arc<MatchDirective>>,
    emit_headers: Option<bool>,
}

impl ScopeConfig {
    /// Create an empty scope.
    #[must_use]
    pub fn new(level: ScopeLevel) -> Self {
        Self {
            level,
            directives: Vec::new(),
            body: None,
            emit_headers: None,
        }
    }

    /// Add a directive. Header directives keep insertion order; a body
    /// directive takes the single body slot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateBody`] when the body slot is taken and
    /// [`ConfigError::BodyOutsideLocation`] for a body directive outside a
    /// location. Directive-level errors come from
    /// [`MatchDirective::validate`].
    pub fn push(&mut self, directive: MatchDirective) -> Result<(), ConfigError> {
        directive.validate()?;
        if !directive.is_body() {
            self.directives.push(Arc::new(directive));
            return Ok(());
        }
        let property = directive.properties().join(",");
        if self.level != ScopeLevel::Location {
            return Err(ConfigError::BodyOutsideLocation {
                property,
                scope: self.level,
            });
        }
        if let Some(existing) = &self.body {
            return Err(ConfigError::DuplicateBody {
                scope: self.level,
                existing: existing.properties().join(","),
            });
        }
        self.body = Some(Arc::new(directive));
        Ok(())
    }

    /// Set the emit-headers flag.
    pub fn set_emit_headers(&mut self, emit: bool) {
        self.emit_headers = Some(emit);
    }

    /// Set the emit-headers flag, builder style.
    #[must_use]
    pub fn with_emit_headers(mut self, emit: bool) -> Self {
        self.emit_headers = Some(emit);
        self
    }

    /// Level of this scope.
    #[must_use]
    pub fn level(&self) -> ScopeLevel {
        self.level
    }

    /// Header directives in insertion order.
    #[must_use]
    pub fn directives(&self) -> &[Arc<MatchDirective>] {
        &self.directives
    }

    /// Body directive, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Arc<MatchDirective>> {
        self.body.as_ref()
    }

    /// Emit-headers flag; `None` when unset.
    #[must_use]
    pub fn emit_headers(&self) -> Option<bool> {
        self.emit_headers
    }

    /// Modes used by this scope's directives.
    #[must_use]
    pub fn modes(&self) -> ModeSet {
        self.directives
            .iter()
            .chain(self.body.iter())
            .map(|d| d.mode())
            .collect()
    }
}

/// Effective configuration for one request.
#[derive(Debug, Clone)]
pub struct EffectiveScope {
    directives: Vec<Arc<MatchDirective>>,
    body: Option<Arc<MatchDirective>>,
    emit_headers: bool,
    modes: ModeSet,
}

impl EffectiveScope {
    /// Merge three scope snapshots.
    ///
    /// - directives: location, then server, then global, each in insertion
    ///   order;
    /// - emit headers: first explicitly set value in that order, `false`
    ///   when all are unset;
    /// - body: the first scope in that order that defines one.
    #[must_use]
    pub fn resolve(location: &ScopeConfig, server: &ScopeConfig, global: &ScopeConfig) -> Self {
        let scopes = [location, server, global];

        let directives: Vec<_> = scopes
            .iter()
            .flat_map(|s| s.directives.iter().cloned())
            .collect();
        let emit_headers = scopes
            .iter()
            .find_map(|s| s.emit_headers)
            .unwrap_or(false);
        let body = scopes.iter().find_map(|s| s.body.clone());
        let modes = scopes
            .iter()
            .fold(ModeSet::EMPTY, |acc, s| acc.union(s.modes()));

        Self {
            directives,
            body,
            emit_headers,
            modes,
        }
    }

    /// Active header directives in effective order.
    #[must_use]
    pub fn directives(&self) -> &[Arc<MatchDirective>] {
        &self.directives
    }

    /// Effective body directive.
    #[must_use]
    pub fn body(&self) -> Option<&Arc<MatchDirective>> {
        self.body.as_ref()
    }

    /// Whether engine-declared response headers are emitted.
    #[must_use]
    pub fn emit_headers(&self) -> bool {
        self.emit_headers
    }

    /// Union of modes across all three scopes.
    #[must_use]
    pub fn modes(&self) -> ModeSet {
        self.modes
    }

    /// Whether the request has nothing to do.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.directives.is_empty() && self.body.is_none() && !self.emit_headers
    }
}
