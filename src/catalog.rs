use std::{
    any::TypeId,
    collections::BTreeMap,
    fmt::{self, Formatter},
    sync::Arc,
};
use tracing::debug;

use crate::{
    any::TypeInfo,
    errors::{DefinitionErrorKind, ResolveErrorKind},
    event::{Observer, ObserverRegistry},
    interceptor::{InterceptionChain, Interceptor},
    provider::{Provider, ProviderId},
    resolver,
};

/// Collects provider, interceptor and observer declarations and validates
/// them into an immutable [`ProviderCatalog`].
#[derive(Default)]
pub struct CatalogBuilder {
    providers: Vec<Provider>,
    interceptors: Vec<Interceptor>,
    observers: Vec<Observer>,
}

impl CatalogBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn provide(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    #[inline]
    #[must_use]
    pub fn intercept(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    #[inline]
    #[must_use]
    pub fn observe(mut self, observer: Observer) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validates the declarations and builds the catalog.
    ///
    /// # Errors
    /// Returns the first [`DefinitionErrorKind`] found: duplicate ids,
    /// malformed qualifiers, unsatisfied or ambiguous declared dependencies,
    /// a cycle over non-deferred injection points, interceptors without
    /// bindings, or observers referencing unknown providers or methods.
    pub fn build(self) -> Result<ProviderCatalog, DefinitionErrorKind> {
        let Self {
            providers,
            interceptors,
            observers,
        } = self;

        let mut by_id = BTreeMap::new();
        let mut by_type: BTreeMap<TypeId, Vec<usize>> = BTreeMap::new();
        for (index, provider) in providers.iter().enumerate() {
            if by_id.insert(provider.id, index).is_some() {
                return Err(DefinitionErrorKind::DuplicateProvider { id: provider.id });
            }
            if provider.qualifiers.iter().any(|qualifier| qualifier.name().is_empty())
                || provider
                    .injection_points
                    .iter()
                    .flat_map(|point| point.qualifiers.iter())
                    .any(|qualifier| qualifier.name().is_empty())
            {
                return Err(DefinitionErrorKind::EmptyQualifierName { id: provider.id });
            }
            for type_info in provider.types() {
                by_type.entry(type_info.id).or_default().push(index);
            }
        }

        let mut catalog = ProviderCatalog {
            providers: providers.into_iter().map(Arc::new).collect(),
            by_id,
            by_type,
            chains: BTreeMap::new(),
            observers: ObserverRegistry::build(Vec::new()),
        };

        let edges = validate_injection_points(&catalog)?;
        detect_cycles(&catalog, &edges)?;

        catalog.chains = build_chains(&catalog, &interceptors)?;
        validate_observers(&catalog, &observers)?;
        catalog.observers = ObserverRegistry::build(observers);

        debug!(providers = catalog.providers.len(), "Catalog built");
        Ok(catalog)
    }
}

/// The immutable, build-time-populated registry of provider descriptions.
/// Pure lookup structure: no locking is required after build.
pub struct ProviderCatalog {
    pub(crate) providers: Vec<Arc<Provider>>,
    by_id: BTreeMap<ProviderId, usize>,
    by_type: BTreeMap<TypeId, Vec<usize>>,
    pub(crate) chains: BTreeMap<(ProviderId, &'static str), Arc<InterceptionChain>>,
    pub(crate) observers: ObserverRegistry,
}

impl fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

impl ProviderCatalog {
    pub(crate) fn candidates_for<'c>(&'c self, requested: &TypeInfo) -> impl Iterator<Item = &'c Arc<Provider>> + 'c {
        self.by_type
            .get(&requested.id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&index| &self.providers[index])
    }

    pub(crate) fn provider_by_id(&self, id: ProviderId) -> Option<&Arc<Provider>> {
        self.by_id.get(&id).map(|&index| &self.providers[index])
    }

    pub(crate) fn chain(&self, id: ProviderId, method: &str) -> Option<&Arc<InterceptionChain>> {
        // Chain keys are 'static method names; compare by value.
        self.chains
            .iter()
            .find(|((chain_id, chain_method), _)| *chain_id == id && *chain_method == method)
            .map(|(_, chain)| chain)
    }
}

/// Resolves every declared injection point and returns the non-deferred
/// dependency edges used for cycle detection.
fn validate_injection_points(catalog: &ProviderCatalog) -> Result<Vec<Vec<usize>>, DefinitionErrorKind> {
    let mut edges = vec![Vec::new(); catalog.providers.len()];
    for (index, provider) in catalog.providers.iter().enumerate() {
        for point in &provider.injection_points {
            let resolved = match resolver::select(catalog, &point.type_info, &point.qualifiers) {
                Ok(resolved) => resolved,
                Err(ResolveErrorKind::Ambiguous { candidates, .. }) => {
                    return Err(DefinitionErrorKind::AmbiguousDependency {
                        id: provider.id,
                        dependency: point.type_info,
                        candidates,
                    });
                }
                Err(_) => None,
            };
            match resolved {
                Some(target) => {
                    if !point.deferred {
                        edges[index].push(catalog.by_id[&target.id]);
                    }
                }
                None if point.required => {
                    return Err(DefinitionErrorKind::UnsatisfiedDependency {
                        id: provider.id,
                        dependency: point.type_info,
                    });
                }
                None => {}
            }
        }
    }
    Ok(edges)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Gray,
    Black,
}

fn detect_cycles(catalog: &ProviderCatalog, edges: &[Vec<usize>]) -> Result<(), DefinitionErrorKind> {
    fn visit(
        node: usize,
        catalog: &ProviderCatalog,
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Result<(), DefinitionErrorKind> {
        marks[node] = Mark::Gray;
        stack.push(node);
        for &next in &edges[node] {
            match marks[next] {
                Mark::Black => {}
                Mark::Gray => {
                    let start = stack.iter().position(|&on_stack| on_stack == next).expect("gray node is on the stack");
                    let mut chain: Vec<ProviderId> = stack[start..].iter().map(|&on_stack| catalog.providers[on_stack].id).collect();
                    chain.push(catalog.providers[next].id);
                    return Err(DefinitionErrorKind::CyclicDependency { chain });
                }
                Mark::White => visit(next, catalog, edges, marks, stack)?,
            }
        }
        stack.pop();
        marks[node] = Mark::Black;
        Ok(())
    }

    let mut marks = vec![Mark::White; catalog.providers.len()];
    let mut stack = Vec::new();
    for node in 0..catalog.providers.len() {
        if marks[node] == Mark::White {
            visit(node, catalog, edges, &mut marks, &mut stack)?;
        }
    }
    Ok(())
}

fn build_chains(
    catalog: &ProviderCatalog,
    interceptors: &[Interceptor],
) -> Result<BTreeMap<(ProviderId, &'static str), Arc<InterceptionChain>>, DefinitionErrorKind> {
    for interceptor in interceptors {
        if interceptor.bindings.is_empty() {
            return Err(DefinitionErrorKind::InterceptorWithoutBindings { name: interceptor.name });
        }
    }

    let mut chains = BTreeMap::new();
    for provider in &catalog.providers {
        for method in &provider.methods {
            let effective: std::collections::BTreeSet<_> = provider.bindings.union(&method.bindings).copied().collect();
            let mut selected: Vec<_> = interceptors
                .iter()
                .enumerate()
                .filter(|(_, interceptor)| interceptor.bindings.is_subset(&effective))
                .collect();
            // Stable by declaration order on priority ties.
            selected.sort_by_key(|(declared, interceptor)| (interceptor.priority, *declared));

            chains.insert(
                (provider.id, method.name),
                Arc::new(InterceptionChain {
                    method: method.name,
                    interceptors: selected.into_iter().map(|(_, interceptor)| interceptor.function.clone()).collect(),
                    terminal: method.function.clone(),
                }),
            );
        }
    }
    Ok(chains)
}

fn validate_observers(catalog: &ProviderCatalog, observers: &[Observer]) -> Result<(), DefinitionErrorKind> {
    for observer in observers {
        let Some(provider) = catalog.provider_by_id(observer.declaring) else {
            return Err(DefinitionErrorKind::UnknownProvider {
                referenced_by: "observer",
                id: observer.declaring,
            });
        };
        if let Some(declared) = observer.declaring_type {
            if declared != provider.provided {
                return Err(DefinitionErrorKind::ObserverTypeMismatch {
                    id: observer.declaring,
                    declared,
                    actual: provider.provided,
                });
            }
        }
        if let crate::event::ObserverAction::ViaMethod(method) = observer.action {
            if provider.find_method(method).is_none() {
                return Err(DefinitionErrorKind::UnknownMethod {
                    id: observer.declaring,
                    method,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::CatalogBuilder;
    use crate::{
        errors::DefinitionErrorKind,
        event::Observer,
        interceptor::Interceptor,
        provider::{InjectionPoint, Provider},
        scope::ScopeKind,
    };

    struct A;
    struct B;
    struct C;

    fn dependent<T: Send + Sync + 'static>(id: &'static str, value: fn() -> T) -> Provider {
        Provider::new::<T, _>(id, ScopeKind::Dependent, move |_| Ok(value()))
    }

    #[test]
    fn test_build_empty() {
        assert!(CatalogBuilder::new().build().is_ok());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = CatalogBuilder::new()
            .provide(dependent("a", || A))
            .provide(dependent("a", || B))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionErrorKind::DuplicateProvider { .. }));
    }

    #[test]
    fn test_unsatisfied_required_dependency_rejected() {
        let err = CatalogBuilder::new()
            .provide(dependent("a", || A).inject(InjectionPoint::required::<B>()))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionErrorKind::UnsatisfiedDependency { .. }));
    }

    #[test]
    fn test_unsatisfied_optional_dependency_allowed() {
        let catalog = CatalogBuilder::new()
            .provide(dependent("a", || A).inject(InjectionPoint::optional::<B>()))
            .build();
        assert!(catalog.is_ok());
    }

    #[test]
    fn test_dependent_cycle_rejected() {
        let err = CatalogBuilder::new()
            .provide(dependent("a", || A).inject(InjectionPoint::required::<B>()))
            .provide(dependent("b", || B).inject(InjectionPoint::required::<C>()))
            .provide(dependent("c", || C).inject(InjectionPoint::required::<A>()))
            .build()
            .unwrap_err();
        match err {
            DefinitionErrorKind::CyclicDependency { chain } => {
                assert_eq!(chain.len(), 4);
                assert_eq!(chain.first(), chain.last());
            }
            err => panic!("expected CyclicDependency, got {err}"),
        }
    }

    #[test]
    fn test_deferred_edge_breaks_cycle() {
        let catalog = CatalogBuilder::new()
            .provide(
                Provider::new::<A, _>("a", ScopeKind::Singleton, |_| Ok(A)).inject(InjectionPoint::required::<B>().deferred()),
            )
            .provide(Provider::new::<B, _>("b", ScopeKind::Singleton, |_| Ok(B)).inject(InjectionPoint::required::<A>()))
            .build();
        assert!(catalog.is_ok());
    }

    #[test]
    fn test_observer_unknown_provider_rejected() {
        let err = CatalogBuilder::new()
            .observe(Observer::new::<A, B, _>("missing", |_, _| Ok(())))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionErrorKind::UnknownProvider { .. }));
    }

    #[test]
    fn test_observer_type_mismatch_rejected() {
        let err = CatalogBuilder::new()
            .provide(dependent("a", || A))
            .observe(Observer::new::<B, C, _>("a", |_, _| Ok(())))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionErrorKind::ObserverTypeMismatch { .. }));
    }

    #[test]
    fn test_interceptor_without_bindings_rejected() {
        let err = CatalogBuilder::new()
            .intercept(Interceptor::new("bare", |invocation| invocation.proceed()))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionErrorKind::InterceptorWithoutBindings { .. }));
    }
}
