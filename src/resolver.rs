use std::sync::Arc;

use crate::{
    any::TypeInfo,
    catalog::ProviderCatalog,
    errors::ResolveErrorKind,
    provider::Provider,
    qualifier::QualifierSet,
};

/// Providers whose assignable-type set contains `requested` and whose
/// qualifier set is a superset of the requested qualifiers.
pub(crate) fn candidates<'c>(catalog: &'c ProviderCatalog, requested: &TypeInfo, qualifiers: &QualifierSet) -> Vec<&'c Arc<Provider>> {
    catalog
        .candidates_for(requested)
        .filter(|provider| provider.qualifiers.is_superset(qualifiers))
        .collect()
}

/// Selects at most one provider for the request.
///
/// Zero candidates is `Ok(None)`; the caller decides whether that is an
/// `Unsatisfied` failure or an empty optional. Disambiguation prefers
/// alternatives, then higher priority among alternatives; a remaining tie is
/// `Ambiguous`. Selection has no side effects.
pub(crate) fn select(
    catalog: &ProviderCatalog,
    requested: &TypeInfo,
    qualifiers: &QualifierSet,
) -> Result<Option<Arc<Provider>>, ResolveErrorKind> {
    let matching = candidates(catalog, requested, qualifiers);
    match matching.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(Arc::clone(single))),
        _ => disambiguate(requested, &matching).map(Some),
    }
}

/// Every matching provider, ordered by priority (descending) then id, so
/// collection-typed requests iterate deterministically.
pub(crate) fn select_all(catalog: &ProviderCatalog, requested: &TypeInfo, qualifiers: &QualifierSet) -> Vec<Arc<Provider>> {
    let mut matching = candidates(catalog, requested, qualifiers);
    matching.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    matching.into_iter().map(Arc::clone).collect()
}

fn disambiguate(requested: &TypeInfo, matching: &[&Arc<Provider>]) -> Result<Arc<Provider>, ResolveErrorKind> {
    let alternatives: Vec<_> = matching.iter().filter(|provider| provider.alternative).collect();

    let tied: Vec<_> = if alternatives.is_empty() {
        matching.iter().collect()
    } else {
        let highest = alternatives
            .iter()
            .map(|provider| provider.priority)
            .max()
            .expect("alternatives is non-empty");
        alternatives
            .into_iter()
            .filter(|provider| provider.priority == highest)
            .collect()
    };

    match tied.as_slice() {
        [winner] => Ok(Arc::clone(winner)),
        _ => Err(ResolveErrorKind::Ambiguous {
            requested: *requested,
            candidates: tied.iter().map(|provider| provider.id).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{select, select_all};
    use crate::{
        any::TypeInfo,
        catalog::CatalogBuilder,
        errors::ResolveErrorKind,
        provider::Provider,
        qualifier::{qualifier_set, Qualifier},
        scope::ScopeKind,
    };

    struct Shape(&'static str);

    fn shape(id: &'static str, name: &'static str) -> Provider {
        Provider::new::<Shape, _>(id, ScopeKind::Dependent, move |_| Ok(Shape(name)))
    }

    #[test]
    fn test_single_candidate_wins() {
        let catalog = CatalogBuilder::new().provide(shape("shape.circle", "circle")).build().unwrap();

        let selected = select(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[])).unwrap().unwrap();
        assert_eq!(selected.id().as_str(), "shape.circle");
    }

    #[test]
    fn test_zero_candidates_is_none() {
        let catalog = CatalogBuilder::new().build().unwrap();

        assert!(select(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[])).unwrap().is_none());
    }

    #[test]
    fn test_alternative_beats_default() {
        let catalog = CatalogBuilder::new()
            .provide(shape("shape.circle", "circle"))
            .provide(shape("shape.square", "square").alternative())
            .build()
            .unwrap();

        let selected = select(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[])).unwrap().unwrap();
        assert_eq!(selected.id().as_str(), "shape.square");
    }

    #[test]
    fn test_higher_priority_alternative_wins() {
        let catalog = CatalogBuilder::new()
            .provide(shape("shape.circle", "circle").alternative().priority(10))
            .provide(shape("shape.square", "square").alternative().priority(20))
            .build()
            .unwrap();

        let selected = select(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[])).unwrap().unwrap();
        assert_eq!(selected.id().as_str(), "shape.square");
    }

    #[test]
    fn test_tie_is_ambiguous_and_lists_candidates() {
        let catalog = CatalogBuilder::new()
            .provide(shape("shape.circle", "circle"))
            .provide(shape("shape.square", "square"))
            .build()
            .unwrap();

        let err = select(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[])).unwrap_err();
        match err {
            ResolveErrorKind::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
            }
            err => panic!("expected Ambiguous, got {err}"),
        }
    }

    #[test]
    fn test_qualifier_narrowing() {
        let catalog = CatalogBuilder::new()
            .provide(shape("shape.circle", "circle").qualifier(Qualifier::new("round")))
            .provide(shape("shape.square", "square").qualifier(Qualifier::new("angular")))
            .build()
            .unwrap();

        let selected = select(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[Qualifier::new("round")]))
            .unwrap()
            .unwrap();
        assert_eq!(selected.id().as_str(), "shape.circle");
    }

    #[test]
    fn test_select_all_is_ordered_and_skips_disambiguation() {
        let catalog = CatalogBuilder::new()
            .provide(shape("shape.circle", "circle").priority(5))
            .provide(shape("shape.square", "square").priority(10))
            .provide(shape("shape.arc", "arc").priority(10))
            .build()
            .unwrap();

        let all = select_all(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[]));
        let ids: Vec<_> = all.iter().map(|provider| provider.id().as_str()).collect();
        assert_eq!(ids, ["shape.arc", "shape.square", "shape.circle"]);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let catalog = CatalogBuilder::new()
            .provide(shape("shape.circle", "circle"))
            .provide(shape("shape.square", "square").alternative().priority(1))
            .build()
            .unwrap();

        for _ in 0..3 {
            let selected = select(&catalog, &TypeInfo::of::<Shape>(), &qualifier_set(&[])).unwrap().unwrap();
            assert_eq!(selected.id().as_str(), "shape.square");
        }
    }
}
