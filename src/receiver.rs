//! External transport contract (§6). The core never implements these
//! traits itself — a concrete wire transport lives outside this crate and
//! is handed to the pipeline as a trait object.

use crate::context::InvocationContext;
use crate::error::InvocationError;

/// Opaque per-invocation context a `Receiver` threads through
/// `process_invocation`/`cancel_invocation`. The core does not look inside
/// it; it exists purely so a `Receiver` implementation can carry whatever
/// connection/stream handle it needs between the two calls.
pub trait ReceiverInvocationContext: Send + Sync {}

/// A single-use handle owning transport-side resources for one pending
/// reply (§2.1, §6.3).
///
/// Exactly one of [`produce`](ResultProducer::produce) or
/// [`discard`](ResultProducer::discard) is ever called on a given instance
/// by the core (invariant 4, §3). Parameterized directly over the domain
/// value `V` rather than via an associated type, so a producer can be
/// stored as `Box<dyn ResultProducer<V>>` without the caller needing to
/// name an associated-type projection.
pub trait ResultProducer<V>: Send + Sync {
    /// Delivers the result, consuming the producer's transport resources.
    /// Returns the domain value, or an error if the remote call failed.
    fn produce(self: Box<Self>) -> Result<V, InvocationError>;

    /// Releases the producer's resources without reading the reply.
    fn discard(self: Box<Self>);
}

/// The transport adapter chosen for a given invocation (§6.2).
///
/// `process_invocation` must eventually call exactly one of
/// `ctx.result_ready(producer)`, `ctx.failed(e)`, or `ctx.cancelled()` on the
/// context it was handed, possibly from a different thread and at an
/// arbitrary later point in time.
pub trait Receiver<V: Send + Sync + 'static>: Send + Sync {
    /// Per-invocation context handed alongside the `InvocationContext`.
    type RcvCtx: ReceiverInvocationContext;

    /// Schedules the wire exchange for `ctx`.
    fn process_invocation(&self, ctx: &InvocationContext<V>, rcv_ctx: &Self::RcvCtx);

    /// Requests cancellation of an in-flight invocation. Returns whether
    /// cancellation was actually effected on the transport side; the core
    /// treats this as advisory (§4.5, §5 "Cancellation: cooperative").
    fn cancel_invocation(&self, ctx: &InvocationContext<V>, rcv_ctx: &Self::RcvCtx) -> bool;
}
