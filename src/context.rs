//! The central object (§2.3, §3): ties call identity, the interceptor
//! chain, the pipeline cursor, the state machine, and the bound receiver
//! together, and exposes the API both interceptors and the
//! [`FutureHandle`](crate::future::FutureHandle) drive it through.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::attachments::{Attachments, ContextData, WEAK_AFFINITY};
use crate::config::PipelineConfig;
use crate::error::InvocationError;
use crate::interceptor::InterceptorChain;
use crate::locator::{Locator, MethodDescriptor, Parameters};
use crate::proxy::ProxyHandler;
use crate::receiver::{Receiver, ResultProducer};
use crate::state::{AwaitOutcome, CachedResult, InvocationState, StateMachine, WaitOutcome};

/// Binds a concrete `Receiver`/`ReceiverInvocationContext` pair behind a
/// trait object so `InvocationContext` doesn't need to be generic over the
/// receiver type, only over the result value `V`.
trait ErasedReceiverBinding<V>: Send + Sync {
    fn invoke(&self, ctx: &InvocationContext<V>);
    fn cancel(&self, ctx: &InvocationContext<V>) -> bool;
}

struct ConcreteBinding<V, R: Receiver<V>> {
    receiver: Arc<R>,
    rcv_ctx: Arc<R::RcvCtx>,
}

impl<V, R: Receiver<V>> ErasedReceiverBinding<V> for ConcreteBinding<V, R> {
    fn invoke(&self, ctx: &InvocationContext<V>) {
        self.receiver.process_invocation(ctx, &self.rcv_ctx);
    }

    fn cancel(&self, ctx: &InvocationContext<V>) -> bool {
        self.receiver.cancel_invocation(ctx, &self.rcv_ctx)
    }
}

/// The central per-call object (§3). One instance per invocation, shared
/// via `Arc` between the caller thread, the receiver thread, and whichever
/// thread requests cancellation or discard.
pub struct InvocationContext<V> {
    locator: Locator,
    invoked_method: MethodDescriptor,
    parameters: Parameters,
    interceptor_chain: Arc<InterceptorChain<V>>,
    invoked_proxy: Option<Arc<dyn ProxyHandler>>,
    config: PipelineConfig,
    pub(crate) state_machine: StateMachine<V>,
    context_data: Mutex<ContextData>,
    attachments: Mutex<Attachments>,
    receiver_binding: Mutex<Option<Arc<dyn ErasedReceiverBinding<V>>>>,
}

impl<V: Send + Sync + Clone + 'static> InvocationContext<V> {
    /// Creates a new invocation context for a single call. The interceptor
    /// chain is shared and read-only for the lifetime of the call.
    pub fn new(
        locator: Locator,
        invoked_method: MethodDescriptor,
        parameters: Parameters,
        interceptor_chain: Arc<InterceptorChain<V>>,
        invoked_proxy: Option<Arc<dyn ProxyHandler>>,
        config: PipelineConfig,
    ) -> Self {
        let state_machine = StateMachine::new();
        if config.always_async() {
            state_machine.proceed_asynchronously();
        }
        Self {
            locator,
            invoked_method,
            parameters,
            interceptor_chain,
            invoked_proxy,
            config,
            state_machine,
            context_data: Mutex::new(ContextData::new()),
            attachments: Mutex::new(Attachments::new()),
            receiver_binding: Mutex::new(None),
        }
    }

    // ---- accessors used by interceptors (§6) ----

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn invoked_method(&self) -> &MethodDescriptor {
        &self.invoked_method
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn invoked_proxy(&self) -> Option<&Arc<dyn ProxyHandler>> {
        self.invoked_proxy.as_ref()
    }

    /// Obtains the caller-visible completion handle for this invocation
    /// (§6). Meant to be called once an interceptor has upgraded the call
    /// via [`proceed_asynchronously`](Self::proceed_asynchronously), so the
    /// interceptor (or the pipeline driver above it) can return the handle
    /// to the original caller in place of a blocking result.
    pub fn future_response(self: &Arc<Self>) -> crate::future::FutureHandle<V> {
        crate::future::FutureHandle::new(Arc::clone(self))
    }

    /// A snapshot of the context data map as interceptors have populated it
    /// so far.
    pub fn context_data(&self) -> ContextData {
        self.context_data.lock().clone()
    }

    /// Runs `f` with exclusive access to the context data map. Must only be
    /// called before the terminal request-pass step (§5 "Shared-resource
    /// policy").
    pub fn with_context_data<T>(&self, f: impl FnOnce(&mut ContextData) -> T) -> T {
        f(&mut self.context_data.lock())
    }

    /// Runs `f` with exclusive access to the attachments map.
    pub fn with_attachments<T>(&self, f: impl FnOnce(&mut Attachments) -> T) -> T {
        f(&mut self.attachments.lock())
    }

    /// Reads a single attachment by key and type.
    pub fn get_attachment<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.attachments.lock().get::<T>(key)
    }

    /// Sets a single attachment by key.
    pub fn set_attachment<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.attachments.lock().set(key, value);
    }

    // ---- receiver binding ----

    /// Binds the receiver chosen to carry out this invocation. Called by a
    /// routing interceptor partway through the request pass; the binding
    /// is consumed automatically once the pipeline cursor reaches the end
    /// of the chain (§4.1).
    pub fn bind_receiver<R>(&self, receiver: Arc<R>, rcv_ctx: R::RcvCtx)
    where
        R: Receiver<V> + 'static,
        R::RcvCtx: 'static,
    {
        let binding: Arc<dyn ErasedReceiverBinding<V>> = Arc::new(ConcreteBinding {
            receiver,
            rcv_ctx: Arc::new(rcv_ctx),
        });
        *self.receiver_binding.lock() = Some(binding);
    }

    // ---- request pass (§4.1) ----

    /// Advances the request pass by one step. Called by the caller to
    /// enter the pipeline, and recursively by each interceptor's
    /// `handle_invocation` to move to the next stage. When the cursor
    /// reaches the end of the chain, invokes the bound receiver instead.
    pub fn send_request(&self) -> Result<(), InvocationError> {
        let idx = {
            let mut guard = self.state_machine.inner.lock();
            if guard.request_done {
                return Err(InvocationError::WrongPhase(
                    "send_request called after the request pass already completed",
                ));
            }
            let idx = guard.cursor;
            if idx < self.interceptor_chain.len() {
                guard.cursor = idx + 1;
            }
            idx
        };

        if idx < self.interceptor_chain.len() {
            let interceptor = self
                .interceptor_chain
                .get(idx)
                .expect("idx checked against chain length above");
            trace!(target: "invoke_core::pipeline", idx, "request pass: interceptor");
            return interceptor.handle_invocation(self);
        }

        trace!(target: "invoke_core::pipeline", "request pass: invoking bound receiver");
        let binding = self.receiver_binding.lock().clone();
        let result = match binding {
            Some(binding) => {
                binding.invoke(self);
                Ok(())
            }
            None => Err(InvocationError::NoReceiverBound),
        };

        self.state_machine.inner.lock().request_done = true;
        result
    }

    // ---- result pass (§4.1) ----

    /// Advances the result pass by one step. Called by `await_response`/
    /// `FutureHandle::get` to enter the pass, and recursively by each
    /// interceptor's `handle_invocation_result` to move to the next stage.
    /// When the cursor reaches the end of the chain, consumes the
    /// installed producer.
    pub fn get_result(&self) -> Result<V, InvocationError> {
        let (idx, is_outermost) = {
            let mut guard = self.state_machine.inner.lock();
            if guard.result_producer.is_none() {
                return Err(InvocationError::WrongPhase(
                    "get_result called with no result producer installed",
                ));
            }
            if guard.result_done {
                return Err(InvocationError::WrongPhase(
                    "get_result called again after the result pass already completed",
                ));
            }
            let idx = guard.cursor;
            let is_outermost = idx == 0;
            if idx < self.interceptor_chain.len() {
                guard.cursor = idx + 1;
            }
            (idx, is_outermost)
        };

        let outcome = if idx < self.interceptor_chain.len() {
            let interceptor = self
                .interceptor_chain
                .get(idx)
                .expect("idx checked against chain length above");
            trace!(target: "invoke_core::pipeline", idx, "result pass: interceptor");
            interceptor.handle_invocation_result(self)
        } else {
            trace!(target: "invoke_core::pipeline", "result pass: consuming producer");
            let producer = self.state_machine.inner.lock().result_producer.take();
            match producer {
                Some(producer) => producer.produce(),
                None => Err(InvocationError::WrongPhase(
                    "result producer consumed concurrently",
                )),
            }
        };

        if is_outermost {
            self.state_machine.inner.lock().result_done = true;
            if let Ok(value) = &outcome {
                self.apply_weak_affinity(value);
            }
        }

        outcome
    }

    /// Delegates to the installed producer's `discard()` without reading
    /// the reply (§4.1).
    pub fn discard_result(&self) -> Result<(), InvocationError> {
        let producer = self.state_machine.inner.lock().result_producer.take();
        match producer {
            Some(producer) => {
                producer.discard();
                Ok(())
            }
            None => Err(InvocationError::WrongPhase(
                "discard_result called with no result producer installed",
            )),
        }
    }

    fn apply_weak_affinity(&self, _value: &V) {
        let affinity = self.attachments.lock().get_any(WEAK_AFFINITY);
        if let (Some(affinity), Some(proxy)) = (affinity, &self.invoked_proxy) {
            proxy.set_weak_affinity(affinity);
            trace!(target: "invoke_core::pipeline", "applied weak-affinity hint to proxy handler");
        }
    }

    /// The invocation's current primary state, a momentary snapshot.
    pub(crate) fn current_state(&self) -> InvocationState {
        self.state_machine.inner.lock().state
    }

    /// The default `get` timeout configured for the originating proxy, if
    /// any (§10.3).
    pub(crate) fn default_timeout(&self) -> Option<std::time::Duration> {
        self.config.default_timeout()
    }

    // ---- receiver-facing transitions (§4.2, §6.2) ----

    /// Delivers a result producer, moving `Waiting`/`CancelReq -> Ready`, or
    /// discarding it immediately if the invocation already settled
    /// (invariant 4). Called by a `Receiver` from whatever thread the
    /// transport reply arrives on.
    pub fn result_ready(&self, producer: Box<dyn ResultProducer<V>>) {
        self.state_machine.result_ready(producer);
    }

    /// Reports that the invocation failed before a result producer could be
    /// installed, moving `Waiting`/`CancelReq -> Failed`.
    pub fn failed(&self, error: InvocationError) {
        self.state_machine.failed(error);
    }

    /// Reports that the invocation was cancelled on the transport side,
    /// moving `Waiting`/`CancelReq -> Cancelled`.
    pub fn cancelled(&self) {
        self.state_machine.cancelled();
    }

    /// Drives `FutureHandle::cancel` (§4.5): attempts `Waiting -> CancelReq`,
    /// and if that succeeds and interruption was requested, forwards a best
    /// effort cancellation request to the bound receiver. The receiver's
    /// answer is advisory only — the state machine transition is what the
    /// rest of the pipeline observes.
    pub(crate) fn cancel_invocation(&self, may_interrupt: bool) -> bool {
        let transitioned = self.state_machine.request_cancel();
        if transitioned && may_interrupt {
            let binding = self.receiver_binding.lock().clone();
            if let Some(binding) = binding {
                binding.cancel(self);
            }
        }
        transitioned
    }

    // ---- asynchrony (§4.3) ----

    /// Declares the invocation asynchronous, upgrading `Synchronous ->
    /// Asynchronous`. A no-op if already upgraded. Safe from any thread.
    pub fn proceed_asynchronously(&self) {
        self.state_machine.proceed_asynchronously();
    }

    /// Marks the invocation fire-and-forget (§4.4).
    pub fn set_discard_result(&self) {
        self.state_machine.set_discard_result();
    }

    /// The caller-thread blocking routine (§4.3). Blocks until the
    /// invocation settles, is upgraded to asynchronous, or is marked
    /// one-way, then — if settled — drives the result pass to completion.
    pub fn await_response(&self) -> AwaitOutcome<V> {
        match self.state_machine.wait_until(None) {
            WaitOutcome::ProceedAsync => AwaitOutcome::ProceedAsync,
            WaitOutcome::OneWay => AwaitOutcome::Resolved(Err(InvocationError::OneWay)),
            WaitOutcome::Settled => AwaitOutcome::Resolved(self.resolve_after_wait()),
            WaitOutcome::TimedOut => {
                error!(
                    target: "invoke_core::context",
                    "internal invariant violated: await_response never passes a deadline"
                );
                unreachable!("await_response never passes a deadline")
            }
        }
    }

    // ---- shared resolution logic used by await_response and FutureHandle::get ----

    /// Once the invocation has left the pending set, resolves it to a
    /// final value: driving the result pass to completion from `Ready`, or
    /// reading back an already-cached terminal outcome.
    pub(crate) fn resolve_after_wait(&self) -> Result<V, InvocationError> {
        loop {
            let state = self.state_machine.inner.lock().state;
            match state {
                InvocationState::Ready => {
                    let claimed = {
                        let mut guard = self.state_machine.inner.lock();
                        if guard.state == InvocationState::Ready {
                            guard.state = InvocationState::Consuming;
                            true
                        } else {
                            false
                        }
                    };
                    if !claimed {
                        // Another getter won the race; loop and observe
                        // whatever state it left behind.
                        continue;
                    }

                    let outcome = self.get_result();

                    let mut guard = self.state_machine.inner.lock();
                    debug_assert_eq!(guard.state, InvocationState::Consuming);
                    match &outcome {
                        Ok(value) => {
                            guard.state = InvocationState::Done;
                            guard.cached_result = Some(CachedResult::Value(value.clone()));
                            trace!(target: "invoke_core::state", "state -> Done");
                        }
                        Err(error) => {
                            guard.state = InvocationState::Failed;
                            guard.cached_result = Some(CachedResult::Error(error.clone()));
                            trace!(target: "invoke_core::state", "state -> Failed");
                        }
                    }
                    drop(guard);
                    self.state_machine.condvar.notify_all();
                    return outcome;
                }
                InvocationState::Done | InvocationState::Failed => {
                    let guard = self.state_machine.inner.lock();
                    return match &guard.cached_result {
                        Some(CachedResult::Value(value)) => Ok(value.clone()),
                        Some(CachedResult::Error(error)) => Err(error.clone()),
                        None => {
                            error!(
                                target: "invoke_core::context",
                                "internal invariant violated: Done/Failed state with no cached result"
                            );
                            unreachable!("Done/Failed always caches a result")
                        }
                    };
                }
                InvocationState::Cancelled => return Err(InvocationError::Cancelled),
                InvocationState::Discarded => return Err(InvocationError::OneWay),
                InvocationState::Consuming => {
                    // Another getter is mid-produce(); wait for it to
                    // finish rather than racing the producer (§4.5).
                    self.state_machine.wait_for_settled(None).ok();
                    continue;
                }
                InvocationState::Waiting | InvocationState::CancelReq => {
                    error!(
                        target: "invoke_core::context",
                        ?state,
                        "internal invariant violated: resolve_after_wait called before the invocation settled"
                    );
                    unreachable!("resolve_after_wait called before the invocation settled")
                }
            }
        }
    }
}
