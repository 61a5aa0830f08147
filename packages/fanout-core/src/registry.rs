//! Named operations and the immutable set a dispatcher races.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::ConstructionError;

// ---------------------------------------------------------------------------
// Operation trait
// ---------------------------------------------------------------------------

/// One backend a fan-out can target.
///
/// Implementations should watch `ctx` (via [`Context::done`]) around any blocking
/// work; the dispatcher itself never interrupts an attempt. Faults must be returned
/// as `Err`, not raised as panics.
#[async_trait]
pub trait Operation<Req>: Send + Sync {
    type Response;
    type Error;

    async fn call(&self, ctx: Context, request: Arc<Req>) -> Result<Self::Response, Self::Error>;
}

/// Shared, type-erased operation handle.
pub type BoxedOperation<Req, Resp, E> = Arc<dyn Operation<Req, Response = Resp, Error = E>>;

// ---------------------------------------------------------------------------
// Closure adapter
// ---------------------------------------------------------------------------

/// Adapts an async closure into an [`Operation`]. Built by [`operation_fn`].
pub struct OperationFn<F, Resp, E> {
    f: F,
    _marker: PhantomData<fn() -> (Resp, E)>,
}

/// Wraps `f` so it can be registered as a component.
///
/// ```ignore
/// let op = operation_fn(|_ctx, req: Arc<String>| async move {
///     Ok::<_, std::io::Error>(req.len())
/// });
/// ```
pub fn operation_fn<F, Fut, Req, Resp, E>(f: F) -> OperationFn<F, Resp, E>
where
    F: Fn(Context, Arc<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
{
    OperationFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, Req, Resp, E> Operation<Req> for OperationFn<F, Resp, E>
where
    F: Fn(Context, Arc<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
    E: Send + 'static,
{
    type Response = Resp;
    type Error = E;

    async fn call(&self, ctx: Context, request: Arc<Req>) -> Result<Resp, E> {
        (self.f)(ctx, request).await
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable mapping of unique component name to operation.
///
/// Construction rejects an empty set: a fan-out over nothing is a programming error.
pub struct Registry<Req, Resp, E> {
    components: BTreeMap<Arc<str>, BoxedOperation<Req, Resp, E>>,
}

impl<Req, Resp, E> Registry<Req, Resp, E> {
    /// Builds a registry from `(name, operation)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::NoComponents`] if `components` is empty,
    /// [`ConstructionError::EmptyName`] for a blank name, and
    /// [`ConstructionError::DuplicateComponent`] if a name appears twice.
    pub fn new<I, N>(components: I) -> Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = (N, BoxedOperation<Req, Resp, E>)>,
        N: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (name, op) in components {
            let name: String = name.into();
            if name.trim().is_empty() {
                return Err(ConstructionError::EmptyName);
            }
            if map.contains_key(name.as_str()) {
                return Err(ConstructionError::DuplicateComponent { name });
            }
            map.insert(Arc::from(name), op);
        }

        if map.is_empty() {
            return Err(ConstructionError::NoComponents);
        }
        Ok(Self { components: map })
    }

    #[must_use]
    pub fn builder() -> RegistryBuilder<Req, Resp, E> {
        RegistryBuilder::new()
    }

    /// Number of components. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always `false`; provided for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(|name| &**name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<BoxedOperation<Req, Resp, E>> {
        self.components.get(name).cloned()
    }

    /// Owned copy of every `(name, operation)` handle, taken once per dispatch so
    /// in-flight attempts never observe the registry through a borrow.
    pub(crate) fn snapshot(&self) -> Vec<(Arc<str>, BoxedOperation<Req, Resp, E>)> {
        self.components
            .iter()
            .map(|(name, op)| (Arc::clone(name), Arc::clone(op)))
            .collect()
    }
}

impl<Req, Resp, E> Clone for Registry<Req, Resp, E> {
    fn clone(&self) -> Self {
        Self {
            components: self.components.clone(),
        }
    }
}

impl<Req, Resp, E> fmt::Debug for Registry<Req, Resp, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Incremental registry construction. Validation happens in [`build`](Self::build).
pub struct RegistryBuilder<Req, Resp, E> {
    components: Vec<(String, BoxedOperation<Req, Resp, E>)>,
}

impl<Req, Resp, E> RegistryBuilder<Req, Resp, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Adds a component.
    #[must_use]
    pub fn component<O>(mut self, name: impl Into<String>, op: O) -> Self
    where
        O: Operation<Req, Response = Resp, Error = E> + 'static,
    {
        let op: BoxedOperation<Req, Resp, E> = Arc::new(op);
        self.components.push((name.into(), op));
        self
    }

    /// Adds an already shared component.
    #[must_use]
    pub fn shared(mut self, name: impl Into<String>, op: BoxedOperation<Req, Resp, E>) -> Self {
        self.components.push((name.into(), op));
        self
    }

    /// # Errors
    ///
    /// See [`Registry::new`].
    pub fn build(self) -> Result<Registry<Req, Resp, E>, ConstructionError> {
        Registry::new(self.components)
    }
}

impl<Req, Resp, E> Default for RegistryBuilder<Req, Resp, E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
