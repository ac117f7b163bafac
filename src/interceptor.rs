//! The user-extensible interceptor contract (§6.1) and the ordered,
//! immutable chain an [`InvocationContext`](crate::context::InvocationContext)
//! drives it through. Grounded on `tonic::interceptor::Interceptor`'s
//! `Arc`-wrapped, `Send + Sync + 'static` shape, generalized from a single
//! function call to a two-method trait driven twice per invocation.

use crate::context::InvocationContext;
use crate::error::InvocationError;

/// A single stage in the invocation pipeline.
///
/// Interceptors are stateless with respect to any one invocation: cursor
/// progression is carried by the [`InvocationContext`], not by the
/// interceptor (§4.1).
pub trait Interceptor<V>: Send + Sync {
    /// Called during the request pass. Implementations must call
    /// `ctx.send_request()` exactly once to advance the pipeline, unless
    /// intentionally short-circuiting (in which case supplying a result is
    /// the implementation's responsibility, via a mechanism outside this
    /// crate).
    fn handle_invocation(&self, ctx: &InvocationContext<V>) -> Result<(), InvocationError>;

    /// Called during the result pass. Implementations must call exactly
    /// one of `ctx.get_result()` (to proceed and observe/transform the
    /// result) or `ctx.discard_result()` (to drop it).
    fn handle_invocation_result(&self, ctx: &InvocationContext<V>) -> Result<V, InvocationError>;
}

/// The fixed-length, shared, read-only sequence of interceptors an
/// invocation is driven through twice (request pass, then result pass).
pub struct InterceptorChain<V> {
    stages: Vec<Box<dyn Interceptor<V>>>,
}

impl<V> InterceptorChain<V> {
    /// Builds a chain from an ordered list of interceptors.
    pub fn new(stages: Vec<Box<dyn Interceptor<V>>>) -> Self {
        Self { stages }
    }

    /// An empty chain: the request pass invokes the bound receiver
    /// immediately, and the result pass reads straight from the producer.
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&dyn Interceptor<V>> {
        self.stages.get(index).map(|stage| stage.as_ref())
    }
}
