use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt::{self, Formatter},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{
    any::AnyInstance,
    creational::{CreationContext, CreationalContext},
    errors::{DestroyErrorKind, DisposalFailure, ResolveErrorKind},
    provider::{Provider, ProviderId},
    scope::ScopeKind,
    Container,
};

/// A contextual instance together with the dependents created on its behalf.
struct StoredInstance {
    provider: Arc<Provider>,
    instance: AnyInstance,
    creational: CreationalContext,
}

/// One provider's slot in a store. The slot lock serializes creation, so
/// concurrent first requests observe exactly one creation.
#[derive(Default)]
struct Entry {
    slot: Mutex<Option<StoredInstance>>,
}

#[derive(Default)]
struct Entries {
    map: BTreeMap<ProviderId, Arc<Entry>>,
    /// Insertion order, for reverse-order draining.
    order: Vec<ProviderId>,
    /// Set once by [`ContextStore::drain`]; a closed store accepts no new
    /// registrations.
    closed: bool,
}

/// Per-activation instance storage of one normal scope. The entries lock is
/// held only for map access, never across a creation function, so creations
/// of distinct providers proceed in parallel.
pub(crate) struct ContextStore {
    scope: ScopeKind,
    entries: Mutex<Entries>,
}

impl ContextStore {
    pub(crate) fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Returns the contextual instance of `provider`, creating and
    /// registering it first if the store does not hold one yet.
    ///
    /// Deferred injection runs after the instance is registered and the slot
    /// lock is released, so a cycle partner resolving back into this store
    /// observes the already-registered reference instead of deadlocking.
    pub(crate) fn get_or_create(&self, container: &Container, provider: &Arc<Provider>) -> Result<AnyInstance, ResolveErrorKind> {
        loop {
            let entry = {
                let mut entries = self.entries.lock();
                if entries.closed {
                    return Err(self.closed_error());
                }
                match entries.map.get(&provider.id()) {
                    Some(entry) => Arc::clone(entry),
                    None => {
                        let entry = Arc::new(Entry::default());
                        entries.map.insert(provider.id(), Arc::clone(&entry));
                        entries.order.push(provider.id());
                        entry
                    }
                }
            };

            // A same-thread re-entry while the creation function runs would
            // deadlock on the slot lock; fail instead and point at proxies.
            let creation_key = Arc::as_ptr(&entry) as usize;
            let reentered = IN_CREATION.with(|in_creation| in_creation.borrow().contains(&creation_key));
            if reentered {
                return Err(ResolveErrorKind::Create {
                    id: provider.id(),
                    source: anyhow::anyhow!("cyclic instantiation of `{}`; inject a client proxy to break the cycle", provider.id()).into(),
                });
            }

            let mut slot = entry.slot.lock();
            if let Some(stored) = slot.as_ref() {
                return Ok(stored.instance.clone());
            }

            let mut creational = CreationalContext::new();
            IN_CREATION.with(|in_creation| in_creation.borrow_mut().push(creation_key));
            let created = (provider.create.clone())(&mut CreationContext {
                container,
                creational: &mut creational,
            });
            IN_CREATION.with(|in_creation| {
                in_creation.borrow_mut().pop();
            });
            let instance = match created {
                Ok(instance) => instance,
                Err(source) => {
                    // Failed creation leaves nothing behind.
                    for failure in creational.destroy_dependents() {
                        error!(%failure, "Disposal failure while unwinding a failed creation");
                    }
                    return Err(ResolveErrorKind::Create {
                        id: provider.id(),
                        source,
                    });
                }
            };

            // A concurrent destroy or drain may have unregistered the entry
            // while the creation function ran; publishing into it now would
            // leak the instance past destruction. Re-validate under the
            // entries lock before publishing.
            let registered = {
                let entries = self.entries.lock();
                !entries.closed && entries.map.get(&provider.id()).is_some_and(|current| Arc::ptr_eq(current, &entry))
            };
            if !registered {
                drop(slot);
                for failure in creational.destroy_dependents() {
                    error!(%failure, "Disposal failure while unwinding a creation that lost to a destroy");
                }
                if let Err(failure) = provider.dispose_instance(&instance) {
                    error!(%failure, "Disposal failure while unwinding a creation that lost to a destroy");
                }
                if self.entries.lock().closed {
                    return Err(self.closed_error());
                }
                // A targeted destroy; the next pass observes a fresh entry.
                continue;
            }

            *slot = Some(StoredInstance {
                provider: Arc::clone(provider),
                instance: instance.clone(),
                creational,
            });
            drop(slot);
            debug!(id = %provider.id(), scope = self.scope.name(), "Contextual instance created");

            if let Some(deferred) = provider.deferred.clone() {
                let mut late = CreationalContext::new();
                let injected = deferred(
                    &instance,
                    &mut CreationContext {
                        container,
                        creational: &mut late,
                    },
                );
                match injected {
                    Ok(()) => {
                        let mut slot = entry.slot.lock();
                        if let Some(stored) = slot.as_mut() {
                            stored.creational.absorb(late);
                        } else {
                            // Concurrently destroyed between publication and
                            // absorption; the late dependents are ours to
                            // dispose.
                            drop(slot);
                            for failure in late.destroy_dependents() {
                                error!(%failure, "Disposal failure while destroying late dependents of a destroyed instance");
                            }
                        }
                    }
                    Err(source) => {
                        for failure in late.destroy_dependents() {
                            error!(%failure, "Disposal failure while unwinding a failed deferred injection");
                        }
                        for failure in self.destroy(provider.id()) {
                            error!(%failure, "Disposal failure while unwinding a failed deferred injection");
                        }
                        return Err(ResolveErrorKind::Create {
                            id: provider.id(),
                            source,
                        });
                    }
                }
            }

            return Ok(instance);
        }
    }

    fn closed_error(&self) -> ResolveErrorKind {
        match self.scope {
            ScopeKind::Singleton => ResolveErrorKind::ShutDown,
            _ => ResolveErrorKind::ContextNotActive { scope: self.scope },
        }
    }

    /// The live instance of `provider`, if the store already holds one.
    /// Never creates.
    pub(crate) fn get_if_exists(&self, id: ProviderId) -> Option<AnyInstance> {
        let entry = {
            let entries = self.entries.lock();
            entries.map.get(&id).map(Arc::clone)?
        };
        let slot = entry.slot.lock();
        slot.as_ref().map(|stored| stored.instance.clone())
    }

    /// Destroys the contextual instance of `id`, dependents first in reverse
    /// creation order, then the instance itself. A missing instance is a
    /// no-op.
    pub(crate) fn destroy(&self, id: ProviderId) -> Vec<DisposalFailure> {
        let entry = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.map.remove(&id) else {
                return Vec::new();
            };
            entries.order.retain(|&stored| stored != id);
            entry
        };
        let Some(stored) = entry.slot.lock().take() else {
            return Vec::new();
        };
        destroy_stored(stored)
    }

    /// Destroys every held instance in reverse registration order. Every
    /// disposal is attempted; failures are collected.
    pub(crate) fn drain(&self) -> Vec<DisposalFailure> {
        self.entries.lock().closed = true;
        let mut failures = Vec::new();
        loop {
            let entry = {
                let mut entries = self.entries.lock();
                let Some(id) = entries.order.pop() else {
                    break;
                };
                entries.map.remove(&id)
            };
            let Some(stored) = entry.and_then(|entry| entry.slot.lock().take()) else {
                continue;
            };
            failures.extend(destroy_stored(stored));
        }
        failures
    }
}

fn destroy_stored(mut stored: StoredInstance) -> Vec<DisposalFailure> {
    let mut failures = stored.creational.destroy_dependents();
    if let Err(failure) = stored.provider.dispose_instance(&stored.instance) {
        failures.push(failure);
    }
    debug!(id = %stored.provider.id(), "Contextual instance destroyed");
    failures
}

std::thread_local! {
    /// Entries whose creation function is currently running on this thread.
    static IN_CREATION: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

std::thread_local! {
    /// Request-scope activations of the current thread, innermost last, each
    /// tagged with its owning manager's token so containers do not observe
    /// each other's activations.
    static ACTIVE_STORES: RefCell<Vec<(usize, Arc<ContextStore>)>> = const { RefCell::new(Vec::new()) };
}

static NEXT_MANAGER_TOKEN: AtomicUsize = AtomicUsize::new(0);

/// Owns the singleton store and tracks request-scope activations. Request
/// activation is bound to the activating thread; the singleton store is
/// shared by all threads.
pub(crate) struct ScopeManager {
    token: usize,
    singleton: Arc<ContextStore>,
    active_requests: Mutex<Vec<Arc<ContextStore>>>,
}

impl ScopeManager {
    pub(crate) fn new() -> Self {
        Self {
            token: NEXT_MANAGER_TOKEN.fetch_add(1, Ordering::Relaxed),
            singleton: Arc::new(ContextStore::new(ScopeKind::Singleton)),
            active_requests: Mutex::new(Vec::new()),
        }
    }

    /// Activates a fresh request store on the current thread.
    pub(crate) fn activate(&self) -> Arc<ContextStore> {
        let store = Arc::new(ContextStore::new(ScopeKind::Request));
        self.active_requests.lock().push(Arc::clone(&store));
        ACTIVE_STORES.with(|active| active.borrow_mut().push((self.token, Arc::clone(&store))));
        store
    }

    /// Deactivates `store`: unbinds it from the current thread and destroys
    /// its held instances.
    pub(crate) fn deactivate(&self, store: &Arc<ContextStore>) -> Result<(), DestroyErrorKind> {
        ACTIVE_STORES.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(position) = active.iter().rposition(|(_, bound)| Arc::ptr_eq(bound, store)) {
                active.remove(position);
            }
        });
        self.active_requests.lock().retain(|bound| !Arc::ptr_eq(bound, store));
        DestroyErrorKind::from_failures(store.drain())
    }

    /// The innermost request store bound to the current thread, if any.
    pub(crate) fn current_request(&self) -> Option<Arc<ContextStore>> {
        ACTIVE_STORES.with(|active| {
            active
                .borrow()
                .iter()
                .rev()
                .find(|(token, _)| *token == self.token)
                .map(|(_, store)| Arc::clone(store))
        })
    }

    /// The store backing `scope`, or `ContextNotActive`.
    pub(crate) fn store_for(&self, scope: ScopeKind) -> Result<Arc<ContextStore>, ResolveErrorKind> {
        match scope {
            ScopeKind::Singleton => Ok(Arc::clone(&self.singleton)),
            ScopeKind::Request => self.current_request().ok_or(ResolveErrorKind::ContextNotActive { scope }),
            ScopeKind::Dependent => Err(ResolveErrorKind::ContextNotActive { scope }),
        }
    }

    /// Drains the singleton store, then every still-active request store.
    pub(crate) fn shutdown(&self) -> Vec<DisposalFailure> {
        let mut failures = self.singleton.drain();
        let requests = std::mem::take(&mut *self.active_requests.lock());
        for store in requests {
            failures.extend(store.drain());
        }
        failures
    }
}

/// RAII guard of one request-scope activation. Deactivating (or dropping)
/// destroys every instance the activation holds.
#[must_use = "the request scope stays active until the handle is deactivated or dropped"]
pub struct ActiveScopeHandle {
    pub(crate) container: Container,
    pub(crate) store: Option<Arc<ContextStore>>,
}

impl fmt::Debug for ActiveScopeHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveScopeHandle")
            .field("active", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl ActiveScopeHandle {
    /// Deactivates the scope, destroying its held instances. Disposal
    /// failures are collected and returned together.
    #[allow(clippy::missing_errors_doc)]
    pub fn deactivate(mut self) -> Result<(), DestroyErrorKind> {
        self.release()
    }

    fn release(&mut self) -> Result<(), DestroyErrorKind> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };
        self.container.scopes().deactivate(&store)
    }
}

impl Drop for ActiveScopeHandle {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(%err, "Disposal failures while deactivating a request scope");
        }
    }
}
