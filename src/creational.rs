use std::sync::Arc;
use tracing::debug;

use crate::{
    any::{AnyInstance, TypeInfo},
    errors::{DisposalFailure, ResolveErrorKind},
    provider::Provider,
    proxy::ClientProxy,
    qualifier::{qualifier_set, Qualifier},
    scope::ScopeKind,
    Container,
};

/// One dependent instance recorded while satisfying a resolution.
pub(crate) struct DependentRef {
    pub(crate) provider: Arc<Provider>,
    pub(crate) instance: AnyInstance,
}

/// Bookkeeping for one top-level resolution: every dependent instance created
/// while satisfying its injection points, in creation order. Destroyed as a
/// unit, dependents in reverse creation order.
#[derive(Default)]
pub(crate) struct CreationalContext {
    dependents: Vec<DependentRef>,
}

impl CreationalContext {
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn push_dependent(&mut self, provider: Arc<Provider>, instance: AnyInstance) {
        self.dependents.push(DependentRef { provider, instance });
    }

    /// Appends the dependents recorded in `other`, keeping creation order.
    #[inline]
    pub(crate) fn absorb(&mut self, other: CreationalContext) {
        self.dependents.extend(other.dependents);
    }

    /// Disposes every recorded dependent in reverse creation order. Each
    /// disposal is attempted independently; failures are collected.
    pub(crate) fn destroy_dependents(&mut self) -> Vec<DisposalFailure> {
        let mut failures = Vec::new();
        while let Some(DependentRef { provider, instance }) = self.dependents.pop() {
            if let Err(failure) = provider.dispose_instance(&instance) {
                failures.push(failure);
            }
            debug!(id = %provider.id(), "Dependent destroyed");
        }
        failures
    }
}

/// The view a creation function gets of the container: it resolves the
/// provider's injection points here, and every dependent instance created on
/// its behalf is recorded in the owning creational context.
pub struct CreationContext<'a> {
    pub(crate) container: &'a Container,
    pub(crate) creational: &'a mut CreationalContext,
}

impl CreationContext<'_> {
    /// Resolves an unqualified injection point.
    ///
    /// For a normal-scoped dependency this returns the *current* contextual
    /// instance; hold a [`Self::proxy`] instead if the value outlives the
    /// scope activation.
    #[allow(clippy::missing_errors_doc)]
    pub fn get<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, ResolveErrorKind> {
        self.get_with(&[])
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn get_with<T: Send + Sync + 'static>(&mut self, qualifiers: &[Qualifier]) -> Result<Arc<T>, ResolveErrorKind> {
        let requested = TypeInfo::of::<T>();
        let qualifiers = qualifier_set(qualifiers);
        let Some(provider) = self.container.select_provider(requested, &qualifiers)? else {
            return Err(ResolveErrorKind::Unsatisfied { requested, qualifiers });
        };
        let instance = self.instantiate(&provider)?;
        provider.as_typed(&instance)
    }

    /// Resolves an optional injection point: zero candidates is `Ok(None)`.
    #[allow(clippy::missing_errors_doc)]
    pub fn get_optional<T: Send + Sync + 'static>(&mut self, qualifiers: &[Qualifier]) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        let requested = TypeInfo::of::<T>();
        let qualifiers = qualifier_set(qualifiers);
        let Some(provider) = self.container.select_provider(requested, &qualifiers)? else {
            return Ok(None);
        };
        let instance = self.instantiate(&provider)?;
        provider.as_typed(&instance).map(Some)
    }

    /// Resolves a client proxy for a normal-scoped injection point.
    #[allow(clippy::missing_errors_doc)]
    pub fn proxy<T: Send + Sync + 'static>(&mut self) -> Result<ClientProxy<T>, ResolveErrorKind> {
        self.container.proxy()
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn proxy_with<T: Send + Sync + 'static>(&mut self, qualifiers: &[Qualifier]) -> Result<ClientProxy<T>, ResolveErrorKind> {
        self.container.proxy_with(qualifiers)
    }

    #[inline]
    #[must_use]
    pub fn container(&self) -> &Container {
        self.container
    }

    fn instantiate(&mut self, provider: &Arc<Provider>) -> Result<AnyInstance, ResolveErrorKind> {
        if provider.scope() == ScopeKind::Dependent {
            let instance = self.container.create_dependent(provider, self.creational)?;
            // Recorded after creation, so dependents destroy in reverse
            // creation order.
            self.creational.push_dependent(Arc::clone(provider), instance.clone());
            Ok(instance)
        } else {
            self.container.contextual(provider)
        }
    }
}
