//! Error types surfaced by the invocation core.

use std::sync::Arc;
use thiserror::Error;

/// Errors raised while driving an invocation through the pipeline, the
/// state machine, or the caller-visible [`FutureHandle`](crate::future::FutureHandle).
///
/// `Clone` so a cached `Failed` outcome can be handed back unchanged to
/// every subsequent `get()` (§8 scenario 7: "a second `future.get()` throws
/// the same `RemoteFailure`"). The boxed causes are held behind `Arc`
/// rather than `Box` for exactly that reason.
#[derive(Debug, Clone, Error)]
pub enum InvocationError {
    /// `send_request`, `get_result`, or `discard_result` was called out of
    /// the phase it belongs to (e.g. `get_result` during the request pass,
    /// or `send_request` after the request pass already completed).
    #[error("invocation pipeline method called in the wrong phase: {0}")]
    WrongPhase(&'static str),

    /// The request pass reached the end of the interceptor chain without a
    /// receiver ever having been bound to the context.
    #[error("no receiver bound for this invocation")]
    NoReceiverBound,

    /// The invocation was marked fire-and-forget; no result is available.
    #[error("invocation is one-way, no result is available")]
    OneWay,

    /// The result was awaited on an invocation that ended up cancelled.
    #[error("invocation was cancelled")]
    Cancelled,

    /// A timed `get` exceeded its deadline before the result became ready.
    #[error("timed out waiting for invocation result")]
    Timeout,

    /// The remote side (or the transport) failed to produce a result.
    #[error("remote invocation failed: {0}")]
    RemoteFailure(Arc<dyn std::error::Error + Send + Sync>),

    /// An interceptor returned an error while driving the request or result
    /// pass.
    #[error("interceptor failed: {0}")]
    Interceptor(Arc<dyn std::error::Error + Send + Sync>),
}

impl InvocationError {
    /// Convenience constructor for a remote failure from any boxable error.
    pub fn remote_failure(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        InvocationError::RemoteFailure(Arc::new(cause))
    }
}

/// Result type alias for invocation-core operations.
pub type Result<T> = std::result::Result<T, InvocationError>;
