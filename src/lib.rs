//! Client-side invocation core for a remote business-object invocation
//! library.
//!
//! This crate turns a synchronous method call on a local proxy into a
//! request driven through a user-extensible interceptor pipeline
//! ([`Interceptor`]) to a pluggable transport ([`Receiver`]), and
//! coordinates the eventual result back to the caller, whether that caller
//! blocks synchronously ([`InvocationContext::await_response`]) or is handed
//! a [`FutureHandle`] because an interceptor called
//! [`InvocationContext::proceed_asynchronously`].
//!
//! The transport implementation, interceptor implementations, proxy code
//! generation, naming/directory resolution, and argument/return-value
//! serialization are all external collaborators this crate only names
//! interfaces for — it never implements them.

pub mod attachments;
pub mod config;
pub mod context;
pub mod error;
pub mod future;
pub mod interceptor;
pub mod locator;
pub mod proxy;
pub mod receiver;
pub mod state;

pub use attachments::{Attachments, ContextData, ContextValue, WEAK_AFFINITY};
pub use config::PipelineConfig;
pub use context::InvocationContext;
pub use error::{InvocationError, Result};
pub use future::FutureHandle;
pub use interceptor::{Interceptor, InterceptorChain};
pub use locator::{Argument, Locator, MethodDescriptor, Parameters};
pub use proxy::ProxyHandler;
pub use receiver::{Receiver, ReceiverInvocationContext, ResultProducer};
pub use state::{AsyncState, AwaitOutcome, InvocationState};
