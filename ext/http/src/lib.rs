//! evident-http: HTTP request views for the evident pipeline
//!
//! The pipeline reads requests through [`evident::RequestView`]. This crate
//! provides two implementations:
//!
//! 1. [`HttpRequest`]: a builder-made request for tests, tools and simple hosts
//! 2. [`HttpMessage`]: an indexed view over an Envoy `ext_proc`
//!    `ProcessingRequest` (feature `ext-proc`, on by default)
//!
//! # Architecture
//!
//! ```text
//! ext_proc ProcessingRequest (runtime)
//!         ↓ HttpMessage::from()
//! RequestView (headers, raw query, cookies, host, path)
//!         ↓ Module::resolve(host, path) + Worker::request_pass()
//! injected request headers / response headers / body
//! ```
//!
//! # Example
//!
//! ```ignore
//! use evident_http::prelude::*;
//!
//! let msg = HttpMessage::from(&processing_request);
//! let scope = module.resolve(msg.host(), msg.path().unwrap_or("/"));
//! let mut ctx = RequestContext::new();
//! let report = worker.request_pass(&mut ctx, &msg, &scope);
//! ```

mod context;
#[cfg(feature = "ext-proc")]
mod message;
mod simple;

pub use context::*;
#[cfg(feature = "ext-proc")]
pub use message::HttpMessage;
pub use simple::{HttpRequest, HttpRequestBuilder};

// Re-export ext_proc types for convenience
#[cfg(feature = "ext-proc")]
pub use envoy_grpc_ext_proc::envoy::service::ext_proc::v3::{
    HttpBody, HttpHeaders, HttpTrailers, ProcessingRequest, ProcessingResponse,
};

/// Prelude for convenient imports.
pub mod prelude {
    #[cfg(feature = "ext-proc")]
    pub use super::{HttpMessage, ProcessingRequest, ProcessingResponse};
    pub use super::{HttpRequest, HttpRequestBuilder};
    pub use evident::prelude::*;
}
