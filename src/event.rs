use std::{any::TypeId, collections::BTreeMap, sync::Arc};
use tracing::debug;

use crate::{
    any::{AnyInstance, TypeInfo},
    creational::CreationalContext,
    errors::{DestroyErrorKind, NotifyErrorKind},
    provider::{MethodOut, ProviderId},
    qualifier::{Qualifier, QualifierSet},
    scope::ScopeKind,
    Container,
};

/// Whether an observer is willing to force its declaring instance into
/// existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reception {
    /// Resolve (and create if needed) the declaring instance.
    #[default]
    Always,
    /// Only fire if the declaring scope already holds a live instance;
    /// never create one.
    IfExists,
}

pub(crate) type ObserverFn = Arc<dyn Fn(&AnyInstance, &AnyInstance) -> Result<(), anyhow::Error> + Send + Sync>;

pub(crate) enum ObserverAction {
    Handler(ObserverFn),
    /// Dispatch through the declaring provider's interception chain, with the
    /// erased event payload as the single argument.
    ViaMethod(&'static str),
}

/// A registered handler invoked when a matching typed event is fired.
pub struct Observer {
    pub(crate) declaring: ProviderId,
    pub(crate) declaring_type: Option<TypeInfo>,
    pub(crate) event: TypeInfo,
    pub(crate) qualifiers: QualifierSet,
    pub(crate) priority: i32,
    pub(crate) reception: Reception,
    pub(crate) action: ObserverAction,
}

impl Observer {
    /// Observer for events of type `E`, declared by the provider with the
    /// given id, whose provided type must be `D`.
    #[must_use]
    pub fn new<D, E, F>(declaring: impl Into<ProviderId>, handler: F) -> Self
    where
        D: Send + Sync + 'static,
        E: Send + Sync + 'static,
        F: Fn(&D, &E) -> Result<(), anyhow::Error> + Send + Sync + 'static,
    {
        Self {
            declaring: declaring.into(),
            declaring_type: Some(TypeInfo::of::<D>()),
            event: TypeInfo::of::<E>(),
            qualifiers: QualifierSet::new(),
            priority: 0,
            reception: Reception::default(),
            action: ObserverAction::Handler(Arc::new(move |instance, payload| {
                let declaring = instance.downcast_ref::<D>().expect("Failed to downcast observer declaring instance");
                let event = payload.downcast_ref::<E>().expect("Failed to downcast event payload");
                handler(declaring, event)
            })),
        }
    }

    /// Observer dispatched through the declaring provider's method `method`,
    /// so its interception chain wraps the notification. The method receives
    /// the erased event payload as its single argument.
    #[must_use]
    pub fn via_method<E: Send + Sync + 'static>(declaring: impl Into<ProviderId>, method: &'static str) -> Self {
        Self {
            declaring: declaring.into(),
            declaring_type: None,
            event: TypeInfo::of::<E>(),
            qualifiers: QualifierSet::new(),
            priority: 0,
            reception: Reception::default(),
            action: ObserverAction::ViaMethod(method),
        }
    }

    #[must_use]
    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    /// Lower priority runs first; ties keep registration order.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn reception(mut self, reception: Reception) -> Self {
        self.reception = reception;
        self
    }
}

/// Immutable, build-time-populated observer registrations, indexed by event
/// type and presorted by (priority, registration order).
pub(crate) struct ObserverRegistry {
    by_event: BTreeMap<TypeId, Vec<Arc<Observer>>>,
}

impl ObserverRegistry {
    pub(crate) fn build(observers: Vec<Observer>) -> Self {
        let mut by_event: BTreeMap<TypeId, Vec<Arc<Observer>>> = BTreeMap::new();
        for observer in observers {
            by_event.entry(observer.event.id).or_default().push(Arc::new(observer));
        }
        for registered in by_event.values_mut() {
            // Stable sort keeps registration order among equal priorities.
            registered.sort_by_key(|observer| observer.priority);
        }
        Self { by_event }
    }

    /// Invokes every matching observer in order. The first failure aborts the
    /// remaining notification and propagates to the caller of `fire`.
    pub(crate) fn notify(
        &self,
        container: &Container,
        event: &TypeInfo,
        payload: &AnyInstance,
        qualifiers: &QualifierSet,
    ) -> Result<(), NotifyErrorKind> {
        let Some(registered) = self.by_event.get(&event.id) else {
            return Ok(());
        };

        for observer in registered {
            if !qualifiers.is_superset(&observer.qualifiers) {
                continue;
            }
            self.notify_one(container, observer, event, payload)?;
        }
        Ok(())
    }

    fn notify_one(
        &self,
        container: &Container,
        observer: &Observer,
        event: &TypeInfo,
        payload: &AnyInstance,
    ) -> Result<(), NotifyErrorKind> {
        let declaring = observer.declaring;
        let provider = container.provider_by_id(declaring).expect("observer declaring provider is validated at build");

        let (instance, mut transient) = match observer.reception {
            Reception::IfExists => match container.live_instance(&provider) {
                Some(instance) => (instance, None),
                None => {
                    debug!(%declaring, event = %event, "No live declaring instance, observer skipped");
                    return Ok(());
                }
            },
            Reception::Always if provider.scope() == ScopeKind::Dependent => {
                let mut creational = CreationalContext::new();
                let instance = container
                    .create_dependent(&provider, &mut creational)
                    .map_err(|source| NotifyErrorKind::Resolve {
                        declaring,
                        source: Box::new(source),
                    })?;
                (instance, Some(creational))
            }
            Reception::Always => {
                let instance = container.contextual(&provider).map_err(|source| NotifyErrorKind::Resolve {
                    declaring,
                    source: Box::new(source),
                })?;
                (instance, None)
            }
        };

        let invoked = self.invoke(container, observer, event, &instance, payload);

        // A dependent declaring instance only lives for the notification.
        if let Some(creational) = transient.as_mut() {
            let mut failures = creational.destroy_dependents();
            if let Err(failure) = provider.dispose_instance(&instance) {
                failures.push(failure);
            }
            invoked?;
            DestroyErrorKind::from_failures(failures).map_err(|source| NotifyErrorKind::Destroy { declaring, source })?;
            return Ok(());
        }

        invoked
    }

    fn invoke(
        &self,
        container: &Container,
        observer: &Observer,
        event: &TypeInfo,
        instance: &AnyInstance,
        payload: &AnyInstance,
    ) -> Result<(), NotifyErrorKind> {
        match &observer.action {
            ObserverAction::Handler(handler) => handler(instance, payload).map_err(|source| NotifyErrorKind::Observer {
                declaring: observer.declaring,
                event: *event,
                source,
            }),
            ObserverAction::ViaMethod(method) => {
                let chain = container
                    .chain_for(observer.declaring, method)
                    .expect("observer method is validated at build");
                let mut args: Vec<Box<dyn std::any::Any + Send>> = vec![Box::new(payload.clone())];
                chain
                    .invoke(instance, &mut args)
                    .map(|_: MethodOut| ())
                    .map_err(|source| NotifyErrorKind::Invoke {
                        declaring: observer.declaring,
                        method,
                        source: Box::new(source),
                    })
            }
        }
    }
}
