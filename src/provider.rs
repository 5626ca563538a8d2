use std::{
    any::Any,
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use crate::{
    any::{AnyInstance, TypeInfo},
    creational::CreationContext,
    errors::{CreateErrorKind, DisposalFailure, ResolveErrorKind},
    interceptor::Binding,
    qualifier::{Qualifier, QualifierSet},
    scope::ScopeKind,
    service::{service_fn, BoxCloneService, Service as _},
};

/// Stable identity of a provider within one catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(&'static str);

impl ProviderId {
    #[inline]
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl From<&'static str> for ProviderId {
    fn from(id: &'static str) -> Self {
        Self(id)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Arguments of a forwarded method invocation.
pub type MethodArgs = Vec<Box<dyn Any + Send>>;
/// Result of a forwarded method invocation.
pub type MethodOut = Box<dyn Any + Send>;

pub(crate) type CreateFn = Arc<dyn Fn(&mut CreationContext<'_>) -> Result<AnyInstance, CreateErrorKind> + Send + Sync>;
pub(crate) type DeferredFn = Arc<dyn Fn(&AnyInstance, &mut CreationContext<'_>) -> Result<(), CreateErrorKind> + Send + Sync>;
pub(crate) type CoerceFn = Arc<dyn Fn(AnyInstance) -> AnyInstance + Send + Sync>;
pub(crate) type MethodFn = Arc<dyn Fn(&AnyInstance, &mut MethodArgs) -> Result<MethodOut, anyhow::Error> + Send + Sync>;
pub(crate) type DisposeFn = BoxCloneService<AnyInstance, (), anyhow::Error>;

/// A dependency a provider declares it will resolve while being created.
///
/// Declared points are metadata: the catalog validates them (unsatisfied,
/// ambiguous, cyclic) before the runtime starts; the creation function
/// performs the actual resolution through [`CreationContext`].
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub(crate) type_info: TypeInfo,
    pub(crate) qualifiers: QualifierSet,
    pub(crate) required: bool,
    pub(crate) deferred: bool,
}

impl InjectionPoint {
    #[must_use]
    pub fn required<T: 'static>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            qualifiers: QualifierSet::new(),
            required: true,
            deferred: false,
        }
    }

    #[must_use]
    pub fn optional<T: 'static>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            qualifiers: QualifierSet::new(),
            required: false,
            deferred: false,
        }
    }

    #[must_use]
    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    /// Marks the point as satisfied after the contextual reference is
    /// registered (setter-style injection). Deferred points are legal cycle
    /// breaks.
    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }
}

/// A named forwarding operation of a provider, invokable through a client
/// proxy and wrapped by the interception chain built for it.
pub struct Method {
    pub(crate) name: &'static str,
    pub(crate) bindings: BTreeSet<Binding>,
    pub(crate) function: MethodFn,
}

impl Method {
    /// `T` must be the provider's provided type.
    #[must_use]
    pub fn new<T, F>(name: &'static str, function: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &mut MethodArgs) -> Result<MethodOut, anyhow::Error> + Send + Sync + 'static,
    {
        Self {
            name,
            bindings: BTreeSet::new(),
            function: Arc::new(move |instance, args| {
                let target = instance.downcast_ref::<T>().expect("Failed to downcast method target");
                function(target, args)
            }),
        }
    }

    #[must_use]
    pub fn binding(mut self, binding: Binding) -> Self {
        self.bindings.insert(binding);
        self
    }
}

/// An immutable provider description: identity, satisfied types, qualifiers,
/// scope, ranking, creation/disposal functions, declared injection points,
/// interceptor bindings and forwarded methods.
pub struct Provider {
    pub(crate) id: ProviderId,
    pub(crate) provided: TypeInfo,
    pub(crate) assignable: BTreeMap<TypeInfo, CoerceFn>,
    pub(crate) qualifiers: QualifierSet,
    pub(crate) scope: ScopeKind,
    pub(crate) alternative: bool,
    pub(crate) priority: i32,
    pub(crate) create: CreateFn,
    pub(crate) deferred: Option<DeferredFn>,
    pub(crate) disposer: Option<DisposeFn>,
    pub(crate) injection_points: Vec<InjectionPoint>,
    pub(crate) bindings: BTreeSet<Binding>,
    pub(crate) methods: Vec<Method>,
}

impl Provider {
    #[must_use]
    pub fn new<T, F>(id: impl Into<ProviderId>, scope: ScopeKind, create: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut CreationContext<'_>) -> Result<T, CreateErrorKind> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            provided: TypeInfo::of::<T>(),
            assignable: BTreeMap::new(),
            qualifiers: QualifierSet::new(),
            scope,
            alternative: false,
            priority: 0,
            create: Arc::new(move |cx| Ok(Arc::new(create(cx)?) as AnyInstance)),
            deferred: None,
            disposer: None,
            injection_points: Vec::new(),
            bindings: BTreeSet::new(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    /// Marks this provider as an alternative: alternatives win over
    /// non-alternatives during disambiguation.
    #[must_use]
    pub fn alternative(mut self) -> Self {
        self.alternative = true;
        self
    }

    /// Ranking among alternatives (higher wins) and the collection-resolution
    /// iteration order.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Registers the disposal function. `T` must be the provided type.
    #[must_use]
    pub fn dispose<T, F>(mut self, dispose: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Result<(), anyhow::Error> + Clone + Send + Sync + 'static,
    {
        self.disposer = Some(BoxCloneService(Box::new(service_fn(move |instance: AnyInstance| {
            let instance = instance.downcast::<T>().expect("Failed to downcast value in disposer");
            dispose(instance)
        }))));
        self
    }

    /// Registers the deferred (setter-style) injection step. It runs after
    /// the contextual reference is registered in its store, so a cycle
    /// partner can already resolve the half-constructed reference. `T` must
    /// be the provided type and needs interior mutability for the fields
    /// filled in here.
    #[must_use]
    pub fn deferred_inject<T, F>(mut self, inject: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &mut CreationContext<'_>) -> Result<(), CreateErrorKind> + Send + Sync + 'static,
    {
        self.deferred = Some(Arc::new(move |instance, cx| {
            let target = instance.downcast_ref::<T>().expect("Failed to downcast value in deferred injection");
            inject(target, cx)
        }));
        self
    }

    /// Registers an additional type this provider satisfies, with the
    /// coercion applied when the instance is requested as `U`.
    #[must_use]
    pub fn assignable<T, U, F>(mut self, coerce: F) -> Self
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
        F: Fn(Arc<T>) -> U + Send + Sync + 'static,
    {
        self.assignable.insert(
            TypeInfo::of::<U>(),
            Arc::new(move |instance| {
                let instance = instance.downcast::<T>().expect("Failed to downcast value in type coercion");
                Arc::new(coerce(instance)) as AnyInstance
            }),
        );
        self
    }

    #[must_use]
    pub fn inject(mut self, point: InjectionPoint) -> Self {
        self.injection_points.push(point);
        self
    }

    #[must_use]
    pub fn binding(mut self, binding: Binding) -> Self {
        self.bindings.insert(binding);
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("provided", &self.provided)
            .field("qualifiers", &self.qualifiers)
            .field("scope", &self.scope)
            .field("alternative", &self.alternative)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl Provider {
    #[inline]
    #[must_use]
    pub fn id(&self) -> ProviderId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    #[inline]
    #[must_use]
    pub fn provided(&self) -> TypeInfo {
        self.provided
    }

    /// Every type this provider can be requested as.
    pub(crate) fn types(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        std::iter::once(self.provided).chain(self.assignable.keys().copied())
    }

    /// Views the erased instance as `T`, applying the registered coercion
    /// when `T` is not the provided type.
    pub(crate) fn as_typed<T: Send + Sync + 'static>(&self, instance: &AnyInstance) -> Result<Arc<T>, ResolveErrorKind> {
        let requested = TypeInfo::of::<T>();
        let instance = if requested == self.provided {
            instance.clone()
        } else if let Some(coerce) = self.assignable.get(&requested) {
            coerce(instance.clone())
        } else {
            return Err(ResolveErrorKind::IncorrectType {
                id: self.id,
                requested,
                actual: self.provided,
            });
        };
        instance.downcast::<T>().map_err(|_| ResolveErrorKind::IncorrectType {
            id: self.id,
            requested,
            actual: self.provided,
        })
    }

    /// Invokes the disposal function, if any.
    pub(crate) fn dispose_instance(&self, instance: &AnyInstance) -> Result<(), DisposalFailure> {
        let Some(disposer) = &self.disposer else {
            return Ok(());
        };
        disposer
            .clone()
            .call(instance.clone())
            .map_err(|source| DisposalFailure { id: self.id, source })
    }

    pub(crate) fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|method| method.name == name)
    }
}
