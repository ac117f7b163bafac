//! Invocation-pipeline configuration (§10.3): the handful of knobs that are
//! fixed for the lifetime of a proxy rather than varying per call, plumbed
//! in at `InvocationContext::new` rather than threaded through every
//! pipeline method. Mirrors the shape of `tonic::transport::Channel`'s
//! builder-style configuration, scaled down to this crate's concerns.
use std::time::Duration;

/// Configuration shared by every invocation a given proxy originates.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    default_timeout: Option<Duration>,
    always_async: bool,
}

impl PipelineConfig {
    /// No default timeout, and `await_response` is left to whichever
    /// interceptor decides to call `proceed_asynchronously()` (or none).
    pub fn new() -> Self {
        Self {
            default_timeout: None,
            always_async: false,
        }
    }

    /// Sets the timeout `FutureHandle::get` applies when the caller didn't
    /// ask for `get_timeout` explicitly.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Every invocation from this proxy is asynchronous from the moment
    /// it's created, regardless of whether any interceptor calls
    /// `proceed_asynchronously()` itself — the caller is expected to never
    /// call `await_response` and always receive a `FutureHandle` instead.
    pub fn with_always_async(mut self, always_async: bool) -> Self {
        self.always_async = always_async;
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn always_async(&self) -> bool {
        self.always_async
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
