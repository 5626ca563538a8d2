use crate::{any::TypeInfo, provider::ProviderId};

/// Catalog-build-time errors. Raised once at startup and fatal: a container
/// is never constructed from an invalid catalog.
#[derive(thiserror::Error, Debug)]
pub enum DefinitionErrorKind {
    #[error("duplicate provider id `{id}`")]
    DuplicateProvider { id: ProviderId },
    #[error("provider `{id}` declares a qualifier with an empty tag name")]
    EmptyQualifierName { id: ProviderId },
    #[error("required dependency {dependency} of provider `{id}` is unsatisfied")]
    UnsatisfiedDependency { id: ProviderId, dependency: TypeInfo },
    #[error("dependency {dependency} of provider `{id}` is ambiguous: {candidates:?}")]
    AmbiguousDependency {
        id: ProviderId,
        dependency: TypeInfo,
        candidates: Vec<ProviderId>,
    },
    #[error("cyclic dependency detected: {}", format_chain(chain))]
    CyclicDependency { chain: Vec<ProviderId> },
    #[error("{referenced_by} references unknown provider `{id}`")]
    UnknownProvider {
        referenced_by: &'static str,
        id: ProviderId,
    },
    #[error("observer on provider `{id}` references unknown method `{method}`")]
    UnknownMethod { id: ProviderId, method: &'static str },
    #[error("observer declares provider `{id}` as {declared}, but it provides {actual}")]
    ObserverTypeMismatch {
        id: ProviderId,
        declared: TypeInfo,
        actual: TypeInfo,
    },
    #[error("interceptor `{name}` declares no bindings")]
    InterceptorWithoutBindings { name: &'static str },
}

fn format_chain(chain: &[ProviderId]) -> String {
    let mut out = String::new();
    for (position, id) in chain.iter().enumerate() {
        if position > 0 {
            out.push_str(" -> ");
        }
        out.push('`');
        out.push_str(id.as_str());
        out.push('`');
    }
    out
}
