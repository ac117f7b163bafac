//! The `ProxyHandler` contract (§6.4): the owning proxy object that created
//! this invocation. The core never implements it — it is generated stub
//! code's job, the way `tonic::client::Grpc<T>`'s `T: GrpcService` is
//! supplied by generated code, not by `tonic` itself.

use crate::attachments::ContextValue;
use crate::locator::Locator;

/// Operations the core needs from the proxy that originated an invocation.
pub trait ProxyHandler: Send + Sync {
    /// The target locator this proxy is currently bound to.
    fn locator(&self) -> Locator;

    /// Reads a proxy-scoped attachment (distinct from a single invocation's
    /// attachments — these persist across calls on the same proxy).
    fn get_attachment(&self, key: &str) -> Option<ContextValue>;

    /// Writes a proxy-scoped attachment.
    fn set_attachment(&self, key: &str, value: ContextValue);

    /// Applies a weak-affinity routing hint, called by the core exactly
    /// once per successful result (§4.1, §6.4), immediately after the
    /// outermost result-pass call returns.
    fn set_weak_affinity(&self, affinity: ContextValue);
}
