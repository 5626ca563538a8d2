use std::{marker::PhantomData, sync::Arc};

use crate::{
    any::AnyInstance,
    errors::{InvokeErrorKind, ResolveErrorKind},
    provider::{MethodArgs, MethodOut, Provider, ProviderId},
    scope::ScopeKind,
    Container,
};

/// A forwarding reference to a normal-scoped provider.
///
/// The proxy is bound to the provider, never to an instance: every access
/// re-resolves the contextual instance of the scope active *at that moment*,
/// so one proxy held across request activations transparently switches
/// instances. It is cheap to clone and safe to store in singletons.
pub struct ClientProxy<T> {
    pub(crate) container: Container,
    pub(crate) provider: Arc<Provider>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ClientProxy<T> {
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
            provider: Arc::clone(&self.provider),
            marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> ClientProxy<T> {
    /// Only normal-scoped providers can be mediated by a proxy.
    pub(crate) fn new(container: Container, provider: Arc<Provider>) -> Result<Self, ResolveErrorKind> {
        if !provider.scope().is_normal() {
            return Err(ResolveErrorKind::NotProxyable {
                id: provider.id(),
                scope: provider.scope(),
            });
        }
        Ok(Self {
            container,
            provider,
            marker: PhantomData,
        })
    }

    /// Unwraps the proxy: resolves the current contextual instance, creating
    /// it first if the active scope does not hold one yet.
    ///
    /// The returned reference is pinned to the instance backing the scope
    /// *now*; it does not follow later activations the way the proxy does.
    ///
    /// # Errors
    /// `ContextNotActive` when the provider's scope has no activation on the
    /// current thread, or any creation failure.
    pub fn current(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let instance = self.current_any()?;
        self.provider.as_typed(&instance)
    }

    /// Runs `f` against the current contextual instance.
    #[allow(clippy::missing_errors_doc)]
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ResolveErrorKind> {
        Ok(f(self.current()?.as_ref()))
    }

    /// Invokes the named provider method on the current contextual instance,
    /// through the interception chain built for it.
    ///
    /// # Errors
    /// `NoSuchMethod` for an unknown method, resolution failures while
    /// obtaining the target, and whatever the chain or target raises.
    pub fn invoke(&self, method: &'static str, args: &mut MethodArgs) -> Result<MethodOut, InvokeErrorKind> {
        let Some(chain) = self.container.chain_for(self.provider.id(), method) else {
            return Err(InvokeErrorKind::NoSuchMethod {
                id: self.provider.id(),
                method,
            });
        };
        let instance = self.current_any()?;
        chain.invoke(&instance, args)
    }

    #[inline]
    #[must_use]
    pub fn provider_id(&self) -> ProviderId {
        self.provider.id()
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> ScopeKind {
        self.provider.scope()
    }

    fn current_any(&self) -> Result<AnyInstance, ResolveErrorKind> {
        self.container.contextual(&self.provider)
    }
}
