//! Immutable call-identity types: target locator, invoked method, and
//! argument tuple. These are constructed once by the proxy layer and shared
//! read-only for the lifetime of an [`InvocationContext`](crate::context::InvocationContext).

use std::fmt;
use std::sync::Arc;

/// Identifies the remote business object a call targets.
///
/// Opaque to the core: naming/directory resolution happens above this
/// crate, so a `Locator` is just a cheaply cloneable label.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    repr: Arc<str>,
}

impl Locator {
    /// Creates a new locator from any string-like value.
    pub fn new(repr: impl Into<Arc<str>>) -> Self {
        Self { repr: repr.into() }
    }

    /// Returns the locator's textual representation.
    pub fn as_str(&self) -> &str {
        &self.repr
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Locator").field(&self.repr).finish()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

/// Describes the method being invoked: the declaring view/interface name
/// and the method name. Does not carry parameter types — argument
/// marshalling is a concern of the layer above this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    view: Arc<str>,
    name: Arc<str>,
}

impl MethodDescriptor {
    /// Creates a descriptor for `name` declared on `view`.
    pub fn new(view: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            view: view.into(),
            name: name.into(),
        }
    }

    /// The name of the interface/view this method is declared on.
    pub fn view(&self) -> &str {
        &self.view
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.view, self.name)
    }
}

/// A boxed, opaque call argument. Serialization of the underlying value is
/// out of scope for this crate; it only needs to move the tuple around and
/// let it be read back by the `Receiver` on the other end of the pipeline.
pub type Argument = Box<dyn std::any::Any + Send + Sync>;

/// The immutable argument tuple passed to an invoked method.
#[derive(Default)]
pub struct Parameters {
    values: Vec<Argument>,
}

impl Parameters {
    /// Builds a parameter tuple from already-boxed arguments.
    pub fn new(values: Vec<Argument>) -> Self {
        Self { values }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the call takes no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the argument at `index`, downcast to `T`, if present and of
    /// that type.
    pub fn get<T: 'static>(&self, index: usize) -> Option<&T> {
        self.values.get(index)?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("len", &self.values.len())
            .finish()
    }
}
