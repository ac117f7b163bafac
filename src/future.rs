//! The caller-visible completion handle (§4.5, §4.6): the object returned
//! from an asynchronous invocation that the caller polls, blocks on, or
//! cancels. Grounded on `tonic::client::Grpc<T>`'s client-handle shape,
//! combined with `grpc::client::subchannel`'s drop-triggered cleanup for
//! abandonment (§4.6) — Rust's `Drop` replaces the unreachability-triggered
//! finalizer the original description relies on.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::context::InvocationContext;
use crate::error::InvocationError;
use crate::state::{deadline_from, InvocationState};

/// A handle to an invocation already in flight, returned once an
/// interceptor has called `ctx.proceed_asynchronously()` (§4.3).
///
/// Cloning a `FutureHandle` is not supported: exactly one handle observes
/// a given context's terminal outcome, matching the single-consumer
/// contract of [`ResultProducer`](crate::receiver::ResultProducer).
pub struct FutureHandle<V> {
    ctx: Arc<InvocationContext<V>>,
}

impl<V: Send + Sync + Clone + 'static> FutureHandle<V> {
    /// Wraps a context already past the request pass into a caller-visible
    /// handle.
    pub fn new(ctx: Arc<InvocationContext<V>>) -> Self {
        Self { ctx }
    }

    /// Whether the invocation has reached a terminal state (§4.2).
    pub fn is_done(&self) -> bool {
        self.ctx.current_state().is_terminal()
    }

    /// Whether the invocation ended up cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.ctx.current_state() == InvocationState::Cancelled
    }

    /// Requests cancellation (§4.5). Returns `false` if the invocation had
    /// already left the `Waiting` state by the time the request arrived —
    /// cancellation never overrides a result that has already landed.
    /// `may_interrupt` controls whether a best-effort cancellation request
    /// is also forwarded to the bound receiver; when `false`, only the
    /// local state transition happens and a remote reply already in flight
    /// is left to arrive normally (it will lose the race per §5).
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.ctx.cancel_invocation(may_interrupt)
    }

    /// Blocks for the final value (§4.5). If the originating proxy was
    /// configured with a default timeout (§10.3), applies it here;
    /// otherwise blocks indefinitely. Use [`get_timeout`](Self::get_timeout)
    /// to override the default for a single call.
    pub fn get(&self) -> Result<V, InvocationError> {
        match self.ctx.default_timeout() {
            Some(timeout) => self.get_timeout(timeout),
            None => {
                self.ctx.state_machine.wait_for_settled(None)?;
                self.ctx.resolve_after_wait()
            }
        }
    }

    /// Blocks for at most `timeout` for the final value (§4.5).
    pub fn get_timeout(&self, timeout: Duration) -> Result<V, InvocationError> {
        let deadline = deadline_from(timeout);
        self.ctx.state_machine.wait_for_settled(Some(deadline))?;
        self.ctx.resolve_after_wait()
    }
}

impl<V> Drop for FutureHandle<V> {
    /// Abandonment (§4.6): if the caller drops the handle without ever
    /// calling `get`/`get_timeout`, and a result is sitting unconsumed in
    /// `Ready`, release the producer's resources rather than leaking them.
    /// A no-op in every other state: `Done`/`Failed`/`Cancelled` have
    /// nothing left to release, and `Waiting`/`CancelReq`/`Consuming` are
    /// still owned by whichever thread is driving them.
    fn drop(&mut self) {
        let mut guard = self.ctx.state_machine.inner.lock();
        if guard.state == InvocationState::Ready {
            let producer = guard.result_producer.take();
            guard.state = InvocationState::Discarded;
            drop(guard);
            if let Some(producer) = producer {
                warn!(
                    target: "invoke_core::future",
                    "FutureHandle dropped with an unconsumed result; discarding"
                );
                producer.discard();
            }
        }
    }
}

#[cfg(test)]
static_assertions::assert_impl_all!(FutureHandle<i32>: Send, Sync);
