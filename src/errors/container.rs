use crate::scope::ScopeKind;

#[derive(thiserror::Error, Debug)]
pub enum ScopeErrorKind {
    #[error("{} scope cannot be activated explicitly", scope.name())]
    NotActivatable { scope: ScopeKind },
    #[error("the container was shut down")]
    ShutDown,
}
