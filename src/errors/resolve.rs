use super::create::CreateErrorKind;
use crate::{any::TypeInfo, provider::ProviderId, qualifier::QualifierSet, scope::ScopeKind};

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("no provider satisfies type {requested} with qualifiers {qualifiers:?}")]
    Unsatisfied { requested: TypeInfo, qualifiers: QualifierSet },
    #[error("multiple equally ranked providers satisfy type {requested}: {candidates:?}")]
    Ambiguous {
        requested: TypeInfo,
        candidates: Vec<ProviderId>,
    },
    #[error("no active {} scope on the current thread", scope.name())]
    ContextNotActive { scope: ScopeKind },
    #[error("creation of provider `{id}` failed: {source}")]
    Create {
        id: ProviderId,
        #[source]
        source: CreateErrorKind,
    },
    #[error("provider `{id}` provides {actual}, which is not assignable to the requested {requested}")]
    IncorrectType {
        id: ProviderId,
        requested: TypeInfo,
        actual: TypeInfo,
    },
    #[error("provider `{id}` is {}-scoped and cannot be mediated by a client proxy", scope.name())]
    NotProxyable { id: ProviderId, scope: ScopeKind },
    #[error("the instance handle was already destroyed")]
    Destroyed,
    #[error("the container was shut down")]
    ShutDown,
}
