use std::{
    fmt::{self, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, error, info_span};

use crate::{
    any::{AnyInstance, TypeInfo},
    catalog::ProviderCatalog,
    context::{ActiveScopeHandle, ScopeManager},
    creational::{CreationContext, CreationalContext},
    errors::{DestroyErrorKind, NotifyErrorKind, ResolveErrorKind, ScopeErrorKind},
    interceptor::InterceptionChain,
    provider::{Provider, ProviderId},
    proxy::ClientProxy,
    qualifier::{qualifier_set, Qualifier},
    resolver,
    scope::ScopeKind,
};

struct ContainerInner {
    catalog: ProviderCatalog,
    scopes: ScopeManager,
    shut_down: AtomicBool,
}

/// The runtime: resolution, scope activation, event firing and shutdown over
/// one immutable [`ProviderCatalog`].
///
/// Cloning is cheap and every clone shares the same instance state.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    #[must_use]
    pub fn new(catalog: ProviderCatalog) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                catalog,
                scopes: ScopeManager::new(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Resolves a handle for the single provider satisfying `T`.
    ///
    /// Resolution is lazy: no instance is created until the handle (or its
    /// proxy) is first accessed.
    ///
    /// # Errors
    /// `Unsatisfied` when no provider matches, `Ambiguous` when several
    /// remain after disambiguation, `ShutDown` after shutdown.
    pub fn instance<T: Send + Sync + 'static>(&self) -> Result<InstanceHandle<T>, ResolveErrorKind> {
        self.instance_with(&[])
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn instance_with<T: Send + Sync + 'static>(&self, qualifiers: &[Qualifier]) -> Result<InstanceHandle<T>, ResolveErrorKind> {
        let requested = TypeInfo::of::<T>();
        let qualifiers = qualifier_set(qualifiers);
        let Some(provider) = self.select_provider(requested, &qualifiers)? else {
            return Err(ResolveErrorKind::Unsatisfied { requested, qualifiers });
        };
        self.handle_for(provider)
    }

    /// Like [`Self::instance_with`], but zero candidates is `Ok(None)`.
    #[allow(clippy::missing_errors_doc)]
    pub fn instance_optional<T: Send + Sync + 'static>(
        &self,
        qualifiers: &[Qualifier],
    ) -> Result<Option<InstanceHandle<T>>, ResolveErrorKind> {
        let requested = TypeInfo::of::<T>();
        let qualifiers = qualifier_set(qualifiers);
        let Some(provider) = self.select_provider(requested, &qualifiers)? else {
            return Ok(None);
        };
        self.handle_for(provider).map(Some)
    }

    /// Handles for *every* provider satisfying `T`, ordered by priority
    /// (descending) then id. Disambiguation does not apply.
    #[allow(clippy::missing_errors_doc)]
    pub fn instances<T: Send + Sync + 'static>(&self) -> Result<Vec<InstanceHandle<T>>, ResolveErrorKind> {
        self.instances_with(&[])
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn instances_with<T: Send + Sync + 'static>(&self, qualifiers: &[Qualifier]) -> Result<Vec<InstanceHandle<T>>, ResolveErrorKind> {
        self.ensure_running()?;
        let requested = TypeInfo::of::<T>();
        let qualifiers = qualifier_set(qualifiers);
        resolver::select_all(&self.inner.catalog, &requested, &qualifiers)
            .into_iter()
            .map(|provider| self.handle_for(provider))
            .collect()
    }

    /// Resolves a client proxy for the single normal-scoped provider
    /// satisfying `T`.
    ///
    /// # Errors
    /// `NotProxyable` when the winning provider is dependent-scoped, plus the
    /// failures of [`Self::instance`].
    pub fn proxy<T: Send + Sync + 'static>(&self) -> Result<ClientProxy<T>, ResolveErrorKind> {
        self.proxy_with(&[])
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn proxy_with<T: Send + Sync + 'static>(&self, qualifiers: &[Qualifier]) -> Result<ClientProxy<T>, ResolveErrorKind> {
        let requested = TypeInfo::of::<T>();
        let qualifiers = qualifier_set(qualifiers);
        let Some(provider) = self.select_provider(requested, &qualifiers)? else {
            return Err(ResolveErrorKind::Unsatisfied { requested, qualifiers });
        };
        ClientProxy::new(self.clone(), provider)
    }

    /// Activates a fresh instance of `scope` on the current thread.
    /// Activations nest; the innermost one backs resolution.
    ///
    /// # Errors
    /// Only the bounded normal scope is activatable; `Singleton` lives for
    /// the container and `Dependent` has no store at all.
    pub fn activate(&self, scope: ScopeKind) -> Result<ActiveScopeHandle, ScopeErrorKind> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(ScopeErrorKind::ShutDown);
        }
        if scope != ScopeKind::Request {
            return Err(ScopeErrorKind::NotActivatable { scope });
        }
        let store = self.inner.scopes.activate();
        debug!("Request scope activated");
        Ok(ActiveScopeHandle {
            container: self.clone(),
            store: Some(store),
        })
    }

    /// Fires `event` to every observer of its type, in priority order.
    ///
    /// # Errors
    /// The first failing observer aborts the remaining notification and its
    /// error propagates here.
    pub fn fire<E: Send + Sync + 'static>(&self, event: E) -> Result<(), NotifyErrorKind> {
        self.fire_with(event, &[])
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn fire_with<E: Send + Sync + 'static>(&self, event: E, qualifiers: &[Qualifier]) -> Result<(), NotifyErrorKind> {
        let event_type = TypeInfo::of::<E>();
        let span = info_span!("fire", event = %event_type);
        let _guard = span.enter();

        let payload: AnyInstance = Arc::new(event);
        self.inner
            .catalog
            .observers
            .notify(self, &event_type, &payload, &qualifier_set(qualifiers))
    }

    /// Shuts the container down: destroys the singleton store, then every
    /// still-active bounded store. Subsequent resolutions fail with
    /// `ShutDown`. Idempotent.
    ///
    /// # Errors
    /// Disposal failures never stop the teardown; they are collected and
    /// raised together.
    pub fn shutdown(&self) -> Result<(), DestroyErrorKind> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let span = info_span!("shutdown");
        let _guard = span.enter();
        DestroyErrorKind::from_failures(self.inner.scopes.shutdown())
    }
}

impl Container {
    pub(crate) fn select_provider(
        &self,
        requested: TypeInfo,
        qualifiers: &crate::qualifier::QualifierSet,
    ) -> Result<Option<Arc<Provider>>, ResolveErrorKind> {
        self.ensure_running()?;
        resolver::select(&self.inner.catalog, &requested, qualifiers)
    }

    /// Creates a dependent instance of `provider`, recording the dependents
    /// created on its behalf in `creational`. The caller owns the returned
    /// instance's lifecycle.
    pub(crate) fn create_dependent(
        &self,
        provider: &Arc<Provider>,
        creational: &mut CreationalContext,
    ) -> Result<AnyInstance, ResolveErrorKind> {
        self.ensure_running()?;
        let span = info_span!("create", id = %provider.id());
        let _guard = span.enter();

        let mut cx = CreationContext {
            container: self,
            creational,
        };
        let instance = (provider.create)(&mut cx).map_err(|source| ResolveErrorKind::Create {
            id: provider.id(),
            source,
        })?;
        if let Some(deferred) = &provider.deferred {
            deferred(
                &instance,
                &mut CreationContext {
                    container: self,
                    creational,
                },
            )
            .map_err(|source| ResolveErrorKind::Create {
                id: provider.id(),
                source,
            })?;
        }
        Ok(instance)
    }

    /// The contextual instance of a normal-scoped provider, created in the
    /// backing store on first access.
    pub(crate) fn contextual(&self, provider: &Arc<Provider>) -> Result<AnyInstance, ResolveErrorKind> {
        self.ensure_running()?;
        let store = self.inner.scopes.store_for(provider.scope())?;
        store.get_or_create(self, provider)
    }

    /// The live contextual instance, if the backing store currently holds
    /// one. Never creates; an inactive scope is `None`.
    pub(crate) fn live_instance(&self, provider: &Arc<Provider>) -> Option<AnyInstance> {
        if provider.scope() == ScopeKind::Dependent {
            return None;
        }
        let store = self.inner.scopes.store_for(provider.scope()).ok()?;
        store.get_if_exists(provider.id())
    }

    pub(crate) fn provider_by_id(&self, id: ProviderId) -> Option<Arc<Provider>> {
        self.inner.catalog.provider_by_id(id).map(Arc::clone)
    }

    pub(crate) fn chain_for(&self, id: ProviderId, method: &str) -> Option<Arc<InterceptionChain>> {
        self.inner.catalog.chain(id, method).map(Arc::clone)
    }

    pub(crate) fn scopes(&self) -> &ScopeManager {
        &self.inner.scopes
    }

    fn ensure_running(&self) -> Result<(), ResolveErrorKind> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            Err(ResolveErrorKind::ShutDown)
        } else {
            Ok(())
        }
    }

    fn handle_for<T: Send + Sync + 'static>(&self, provider: Arc<Provider>) -> Result<InstanceHandle<T>, ResolveErrorKind> {
        let kind = if provider.scope() == ScopeKind::Dependent {
            HandleKind::Dependent {
                container: self.clone(),
                state: Mutex::new(DependentState::default()),
            }
        } else {
            HandleKind::Proxied(ClientProxy::new(self.clone(), Arc::clone(&provider))?)
        };
        Ok(InstanceHandle { provider, kind })
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for failure in self.scopes.shutdown() {
            error!(%failure, "Disposal failure while shutting the container down");
        }
    }
}

#[derive(Default)]
struct DependentState {
    instance: Option<AnyInstance>,
    creational: CreationalContext,
    destroyed: bool,
}

enum HandleKind<T> {
    /// The handle owns the instance and its dependents; destroying the
    /// handle cascades to them.
    Dependent {
        container: Container,
        state: Mutex<DependentState>,
    },
    /// Normal-scoped: the handle is a thin wrapper over the client proxy and
    /// the backing store owns the lifecycle.
    Proxied(ClientProxy<T>),
}

/// The result of a resolution: a lazily created contextual reference.
pub struct InstanceHandle<T> {
    provider: Arc<Provider>,
    kind: HandleKind<T>,
}

impl<T> fmt::Debug for InstanceHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> InstanceHandle<T> {
    /// The instance behind the handle, created on first access.
    ///
    /// A dependent-scoped handle always returns the same owned instance; a
    /// normal-scoped handle returns whatever instance currently backs the
    /// scope.
    #[allow(clippy::missing_errors_doc)]
    pub fn get(&self) -> Result<Arc<T>, ResolveErrorKind> {
        match &self.kind {
            HandleKind::Dependent { container, state } => {
                let mut state = state.lock();
                if state.destroyed {
                    return Err(ResolveErrorKind::Destroyed);
                }
                if state.instance.is_none() {
                    let DependentState { creational, instance, .. } = &mut *state;
                    *instance = Some(container.create_dependent(&self.provider, creational)?);
                }
                let instance = state.instance.as_ref().expect("instance was just created");
                self.provider.as_typed(instance)
            }
            HandleKind::Proxied(proxy) => proxy.current(),
        }
    }

    /// Destroys the instance behind the handle: dependents first, in reverse
    /// creation order, then the instance itself. Idempotent; a never-created
    /// instance is a no-op.
    ///
    /// For a normal-scoped handle this removes the contextual instance from
    /// its store, so the next access observes a fresh one.
    #[allow(clippy::missing_errors_doc)]
    pub fn destroy(&self) -> Result<(), DestroyErrorKind> {
        match &self.kind {
            HandleKind::Dependent { state, .. } => {
                let mut state = state.lock();
                if state.destroyed {
                    return Ok(());
                }
                state.destroyed = true;
                let mut failures = state.creational.destroy_dependents();
                if let Some(instance) = state.instance.take() {
                    if let Err(failure) = self.provider.dispose_instance(&instance) {
                        failures.push(failure);
                    }
                }
                DestroyErrorKind::from_failures(failures)
            }
            HandleKind::Proxied(proxy) => {
                let Ok(store) = proxy.container.scopes().store_for(self.provider.scope()) else {
                    return Ok(());
                };
                DestroyErrorKind::from_failures(store.destroy(self.provider.id()))
            }
        }
    }

    /// The mediating client proxy; `None` for a dependent-scoped handle.
    #[must_use]
    pub fn client_proxy(&self) -> Option<ClientProxy<T>> {
        match &self.kind {
            HandleKind::Dependent { .. } => None,
            HandleKind::Proxied(proxy) => Some(proxy.clone()),
        }
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
}

impl<T> Drop for InstanceHandle<T> {
    fn drop(&mut self) {
        let HandleKind::Dependent { state, .. } = &self.kind else {
            return;
        };
        let mut state = state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        let mut failures = state.creational.destroy_dependents();
        if let Some(instance) = state.instance.take() {
            if let Err(failure) = self.provider.dispose_instance(&instance) {
                failures.push(failure);
            }
        }
        for failure in failures {
            error!(%failure, "Disposal failure while dropping an instance handle");
        }
    }
}
