//! The invocation state machine (§4.2) and the asynchrony mode it carries
//! alongside (§4.3). Both live behind a single [`parking_lot::Mutex`],
//! guarded together with the pipeline cursor and the installed
//! [`ResultProducer`] — grounded on `grpc::client::subchannel`'s
//! `Mutex<InnerSubchannel>` pattern: one lock, one inner struct, enum
//! variants carrying only the payload each state actually owns.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::error::InvocationError;
use crate::receiver::ResultProducer;

/// The invocation's primary state (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Waiting,
    CancelReq,
    Ready,
    Consuming,
    Done,
    Failed,
    Cancelled,
    Discarded,
}

impl InvocationState {
    /// Terminal = {Done, Failed, Cancelled, Discarded} (§4.2).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvocationState::Done
                | InvocationState::Failed
                | InvocationState::Cancelled
                | InvocationState::Discarded
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The orthogonal asynchrony mode (§3, §4.3). Monotonic along
/// `Synchronous -> {Asynchronous, OneWay}`; the two upgraded modes never
/// inter-transition (invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    Synchronous,
    Asynchronous,
    OneWay,
}

/// The three outcomes of a blocking wait on the caller thread (§4.3).
/// Modeled as a proper sum type rather than a sentinel value, per the
/// redesign note in §9.
#[derive(Debug)]
pub enum AwaitOutcome<V> {
    /// The result resolved while waiting; the result pass has already been
    /// driven and this is the final value.
    Resolved(Result<V, InvocationError>),
    /// The invocation was upgraded to asynchronous; return the
    /// `FutureHandle` to the original caller and stop blocking.
    ProceedAsync,
}

/// Outcome of a cached, already-terminal result, shared by `Done` and
/// `Failed`. `InvocationError` is itself `Clone` (its boxed causes are held
/// behind `Arc`), so a repeated `get()` against a `Failed` invocation
/// reliably reports the exact same error (§8 scenario 7).
#[derive(Clone)]
pub enum CachedResult<V> {
    Value(V),
    Error(InvocationError),
}

/// State guarded by the context's single designated lock: `state`,
/// `async_state`, the installed `result_producer`, `cached_result`, and the
/// pipeline `cursor` (invariant 7, plus cursor reset-to-zero on the
/// Ready transition, which must be atomic with the state flip).
pub(crate) struct Inner<V> {
    pub(crate) state: InvocationState,
    pub(crate) async_state: AsyncState,
    pub(crate) cursor: usize,
    pub(crate) request_done: bool,
    pub(crate) result_done: bool,
    pub(crate) result_producer: Option<Box<dyn ResultProducer<V>>>,
    pub(crate) cached_result: Option<CachedResult<V>>,
}

impl<V> Inner<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: InvocationState::Waiting,
            async_state: AsyncState::Synchronous,
            cursor: 0,
            request_done: false,
            result_done: false,
            result_producer: None,
            cached_result: None,
        }
    }
}

/// The mutex + condvar pair an `InvocationContext` embeds. Split out of
/// `InvocationContext` so state-machine transitions can be unit tested in
/// isolation from the pipeline/cursor-driving API.
pub(crate) struct StateMachine<V> {
    pub(crate) inner: Mutex<Inner<V>>,
    pub(crate) condvar: Condvar,
}

impl<V> StateMachine<V> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            condvar: Condvar::new(),
        }
    }

    /// `resultReady(p)` (§4.2): installs the producer and moves to `Ready`
    /// if the invocation is still pending; otherwise discards `p` outside
    /// the lock (late reply after cancellation/abandonment, invariant 4).
    pub(crate) fn result_ready(&self, producer: Box<dyn ResultProducer<V>>) {
        let mut guard = self.inner.lock();
        match guard.state {
            InvocationState::Waiting | InvocationState::CancelReq => {
                guard.result_producer = Some(producer);
                guard.cursor = 0;
                guard.state = InvocationState::Ready;
                trace!(target: "invoke_core::state", "state -> Ready");
                self.condvar.notify_all();
            }
            _ => {
                drop(guard);
                debug!(
                    target: "invoke_core::state",
                    "result_ready arrived after invocation already settled; discarding producer"
                );
                producer.discard();
            }
        }
    }

    /// `cancelled()` (§4.2): moves to `Cancelled` if still pending.
    pub(crate) fn cancelled(&self) {
        let mut guard = self.inner.lock();
        if matches!(guard.state, InvocationState::Waiting | InvocationState::CancelReq) {
            guard.state = InvocationState::Cancelled;
            trace!(target: "invoke_core::state", "state -> Cancelled");
            self.condvar.notify_all();
        }
    }

    /// `failed(e)` (§4.2): moves to `Failed` with the cause if still
    /// pending.
    pub(crate) fn failed(&self, error: InvocationError) {
        let mut guard = self.inner.lock();
        if matches!(guard.state, InvocationState::Waiting | InvocationState::CancelReq) {
            guard.cached_result = Some(CachedResult::Error(error));
            guard.state = InvocationState::Failed;
            trace!(target: "invoke_core::state", "state -> Failed");
            self.condvar.notify_all();
        }
    }

    /// `cancelRequested` (§4.2, driven by `FutureHandle::cancel`): moves
    /// `Waiting -> CancelReq`. Returns whether the transition happened.
    pub(crate) fn request_cancel(&self) -> bool {
        let mut guard = self.inner.lock();
        if guard.state == InvocationState::Waiting {
            guard.state = InvocationState::CancelReq;
            trace!(target: "invoke_core::state", "state -> CancelReq");
            true
        } else {
            false
        }
    }

    /// `proceedAsynchronously()` (§4.3): `Synchronous -> Asynchronous`,
    /// a no-op otherwise. Safe to call from any thread, including an
    /// interceptor running on the caller's thread.
    pub(crate) fn proceed_asynchronously(&self) {
        let mut guard = self.inner.lock();
        if guard.async_state == AsyncState::Synchronous {
            guard.async_state = AsyncState::Asynchronous;
            trace!(target: "invoke_core::state", "async_state -> Asynchronous");
            self.condvar.notify_all();
        }
    }

    /// `setDiscardResult()` (§4.4): marks the call one-way. If a result had
    /// already landed and been cached (`Done`), flips it to `Discarded`
    /// (the producer there is already consumed, so there is nothing to
    /// release). If a result is sitting unconsumed in `Ready`, this crate
    /// discards the installed producer inline under the same lock section
    /// (§9 Open Question decision) rather than deferring to a later `get`
    /// or to abandonment.
    pub(crate) fn set_discard_result(&self) {
        let mut guard = self.inner.lock();
        if guard.async_state != AsyncState::OneWay {
            guard.async_state = AsyncState::OneWay;
            trace!(target: "invoke_core::state", "async_state -> OneWay");
            self.condvar.notify_all();
        }

        match guard.state {
            InvocationState::Done => {
                guard.state = InvocationState::Discarded;
                trace!(target: "invoke_core::state", "state -> Discarded (result already consumed)");
            }
            InvocationState::Ready => {
                let producer = guard.result_producer.take();
                guard.state = InvocationState::Discarded;
                trace!(target: "invoke_core::state", "state -> Discarded, discarding pending producer inline");
                drop(guard);
                if let Some(producer) = producer {
                    producer.discard();
                }
                return;
            }
            _ => {}
        }
    }

    /// Blocks the calling thread until the invocation leaves the
    /// {Waiting, CancelReq} pending set, the asynchrony mode is upgraded,
    /// or `deadline` elapses. Must never be called while any other lock
    /// the caller holds could deadlock against a
    /// `Receiver`/`ResultProducer`/interceptor call (§5).
    ///
    /// §4.3 step 2 literally reads "wait while state == WAITING"; this
    /// crate also waits through `CancelReq` here, since a concurrent
    /// cancellation requester can move the invocation there while this
    /// thread is still blocked in `await_response`, and neither `Cancelled`
    /// nor `Failed` (the only ways out of `CancelReq`) install a
    /// `ResultProducer` — exiting the wait on `CancelReq` itself would mean
    /// immediately calling `get_result()` with no producer installed,
    /// violating its precondition (§4.1).
    pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> WaitOutcome {
        let mut guard = self.inner.lock();
        loop {
            match guard.async_state {
                AsyncState::Asynchronous => return WaitOutcome::ProceedAsync,
                AsyncState::OneWay => return WaitOutcome::OneWay,
                AsyncState::Synchronous => {}
            }

            if !matches!(guard.state, InvocationState::Waiting | InvocationState::CancelReq) {
                return WaitOutcome::Settled;
            }

            match deadline {
                None => {
                    self.condvar.wait(&mut guard);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    let remaining = deadline - now;
                    self.condvar.wait_for(&mut guard, remaining);
                }
            }
        }
    }

    /// Same wait loop, specialized for `FutureHandle::get`/`get_timeout`
    /// (§4.5): waits while `{Waiting, CancelReq, Consuming}`.
    pub(crate) fn wait_for_settled(&self, deadline: Option<Instant>) -> Result<(), InvocationError> {
        let mut guard = self.inner.lock();
        loop {
            if !matches!(
                guard.state,
                InvocationState::Waiting | InvocationState::CancelReq | InvocationState::Consuming
            ) {
                return Ok(());
            }

            match deadline {
                None => self.condvar.wait(&mut guard),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(InvocationError::Timeout);
                    }
                    let remaining = deadline - now;
                    self.condvar.wait_for(&mut guard, remaining);
                }
            }
        }
    }
}

/// Outcome of [`StateMachine::wait_until`].
pub(crate) enum WaitOutcome {
    ProceedAsync,
    OneWay,
    Settled,
    TimedOut,
}

/// Computes an absolute deadline from a relative timeout, matching the
/// monotonic-deadline requirement of §5.
pub(crate) fn deadline_from(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

#[cfg(test)]
static_assertions::assert_impl_all!(StateMachine<i32>: Send, Sync);
