//! Directive dispatch.
//!
//! A [`Worker`] owns a handle on the shared [`Dataset`] and the
//! response-header plan built from it. Each request carries a
//! [`RequestContext`] holding its result cache, so directives in the request
//! and response phases of one request share engine results.
//!
//! ```text
//! request_pass:   directives ─► resolve ─► render ─► escape ─► inject request header
//! response_pass:  plan       ─► resolve ─► render ─► escape ─► merge response header
//!                 body       ─► resolve ─► render ─────────────► replace body
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::cache::ResultCache;
use crate::dataset::Dataset;
use crate::directive::{MatchDirective, Mode};
use crate::engine::{DetectionEngine, EngineStatus, MatchResult};
use crate::evidence::RequestView;
use crate::headers::HeaderList;
use crate::render::{escape_value, Renderer};
use crate::response::{BodyReplacement, ResponseHeaderPlan};
use crate::scope::EffectiveScope;
use crate::{EngineError, PipelineError, HEADER_MERGE_SEPARATOR};

// ═══════════════════════════════════════════════════════════════════════════════
// Per-request state
// ═══════════════════════════════════════════════════════════════════════════════

/// Phase of request processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Request-header injection.
    Request,
    /// Engine-declared response headers.
    ResponseHeaders,
    /// Body replacement.
    ResponseBody,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::ResponseHeaders => "response headers",
            Self::ResponseBody => "response body",
        })
    }
}

/// State owned by one request for its whole lifetime.
#[derive(Debug, Default)]
pub struct RequestContext {
    cache: ResultCache,
    request_done: bool,
}

impl RequestContext {
    /// Fresh context with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Result cache for this request.
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Whether the request pass already ran.
    #[must_use]
    pub fn request_done(&self) -> bool {
        self.request_done
    }
}

/// A directive whose detection failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveFailure {
    /// Target header name, or the property of a body directive.
    pub target: String,
    /// Mode of the directive.
    pub mode: Mode,
    /// Engine error.
    pub error: EngineError,
}

/// Outcome of a request pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Headers to inject into the request, duplicates kept.
    pub request_headers: HeaderList,
    /// Directives that could not be rendered.
    pub failures: Vec<DirectiveFailure>,
    /// Rendered values that hit the size limit.
    pub truncated: usize,
    /// The pass did not run: the request was already processed.
    pub declined: bool,
}

/// Outcome of a response pass.
#[derive(Debug, Clone, Default)]
pub struct ResponseReport {
    /// Response headers created or appended to.
    pub headers_emitted: usize,
    /// Response-header directives that could not be rendered.
    pub failures: Vec<DirectiveFailure>,
    /// Replacement body, when a body directive applies.
    pub body: Option<BodyReplacement>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Worker
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-worker dispatcher. Dropping it detaches from the dataset.
#[derive(Debug)]
pub struct Worker<E> {
    dataset: Arc<Dataset<E>>,
    renderer: Renderer,
    response_renderer: Renderer,
    plan: ResponseHeaderPlan,
}

impl<E: DetectionEngine> Worker<E> {
    pub(crate) fn new(dataset: Arc<Dataset<E>>) -> Self {
        let plan = ResponseHeaderPlan::from_properties(dataset.engine().available_properties());
        debug!(response_headers = plan.len(), "worker attached");
        Self {
            renderer: Renderer::new(dataset.value_separator()),
            response_renderer: Renderer::new(HEADER_MERGE_SEPARATOR),
            plan,
            dataset,
        }
    }

    /// Shared dataset.
    #[must_use]
    pub fn dataset(&self) -> &Arc<Dataset<E>> {
        &self.dataset
    }

    /// Engine-declared response headers.
    #[must_use]
    pub fn plan(&self) -> &ResponseHeaderPlan {
        &self.plan
    }

    /// Run the header directives of `scope` against `request`.
    ///
    /// Each directive renders with unavailable properties included and is
    /// injected as a request header. A failed directive is recorded and
    /// skipped; earlier injections stay. A context whose request pass
    /// already ran declines.
    pub fn request_pass<R>(&self, ctx: &mut RequestContext, request: &R, scope: &EffectiveScope) -> PassReport
    where
        R: RequestView + ?Sized,
    {
        let mut report = PassReport::default();
        if ctx.request_done {
            debug!("request already processed, declining");
            report.declined = true;
            return report;
        }
        ctx.request_done = true;

        for directive in scope.directives() {
            let Some(name) = directive.header_name() else {
                continue;
            };
            let result = match self.resolve(&mut ctx.cache, request, directive) {
                Ok(result) => result,
                Err(err) => {
                    report.failures.push(DirectiveFailure {
                        target: name.to_string(),
                        mode: directive.mode(),
                        error: err,
                    });
                    continue;
                }
            };
            let rendered = self.renderer.render(&result, directive.properties(), true);
            if rendered.is_truncated() {
                report.truncated += 1;
            }
            report.request_headers.inject(name, &escape_value(rendered.as_str()));
        }

        debug!(
            injected = report.request_headers.len(),
            failed = report.failures.len(),
            invocations = ctx.cache.invocations(),
            "request pass complete"
        );
        report
    }

    /// Emit engine-declared response headers and the body replacement.
    ///
    /// Response headers run only when `scope` emits headers; each renders
    /// with unavailable properties excluded and is merged into `headers`.
    /// Empty renders are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ResourceExhausted`] when the engine runs out
    /// of memory in either response phase, and [`PipelineError::Body`] when
    /// detection for the body directive fails. Headers merged before the
    /// error stay merged.
    pub fn response_pass<R>(
        &self,
        ctx: &mut RequestContext,
        request: &R,
        scope: &EffectiveScope,
        headers: &mut HeaderList,
    ) -> Result<ResponseReport, PipelineError>
    where
        R: RequestView + ?Sized,
    {
        let mut report = ResponseReport::default();

        if scope.emit_headers() {
            for directive in self.plan.directives() {
                let Some(name) = directive.header_name() else {
                    continue;
                };
                let result = match self.resolve(&mut ctx.cache, request, directive) {
                    Ok(result) => result,
                    Err(err) if err.status == EngineStatus::InsufficientMemory => {
                        return Err(PipelineError::ResourceExhausted {
                            phase: Phase::ResponseHeaders,
                        });
                    }
                    Err(err) => {
                        report.failures.push(DirectiveFailure {
                            target: name.to_string(),
                            mode: directive.mode(),
                            error: err,
                        });
                        continue;
                    }
                };
                let rendered = self.response_renderer.render(&result, directive.properties(), false);
                if rendered.is_empty() {
                    continue;
                }
                headers.merge(name, &escape_value(rendered.as_str()));
                report.headers_emitted += 1;
            }
        }

        if let Some(body) = scope.body() {
            let property = body.properties().join(",");
            let result = self
                .resolve(&mut ctx.cache, request, body)
                .map_err(|err| match err.status {
                    EngineStatus::InsufficientMemory => PipelineError::ResourceExhausted {
                        phase: Phase::ResponseBody,
                    },
                    _ => PipelineError::Body {
                        property: property.clone(),
                        source: err,
                    },
                })?;
            let rendered = self.renderer.render(&result, body.properties(), true);
            let replacement = BodyReplacement::from_rendered(rendered);
            debug!(property, content_length = replacement.content_length, "body replaced");
            report.body = Some(replacement);
        }

        Ok(report)
    }

    fn resolve<R>(
        &self,
        cache: &mut ResultCache,
        request: &R,
        directive: &MatchDirective,
    ) -> Result<Arc<MatchResult>, EngineError>
    where
        R: RequestView + ?Sized,
    {
        cache
            .resolve(self.dataset.engine(), request, directive)
            .inspect_err(|err| {
                error!(
                    data_file = %self.dataset.path().display(),
                    status = %err.status,
                    message = %err.message,
                    mode = %directive.mode(),
                    "detection failed"
                );
            })
    }
}

impl<E> Drop for Worker<E> {
    fn drop(&mut self) {
        self.dataset.detach();
    }
}
