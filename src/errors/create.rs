use super::resolve::ResolveErrorKind;
use crate::provider::ProviderId;

#[derive(thiserror::Error, Debug)]
pub enum CreateErrorKind {
    /// Resolving one of the creation function's dependencies failed.
    #[error(transparent)]
    Deps(Box<ResolveErrorKind>),
    /// The creation function itself failed.
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<ResolveErrorKind> for CreateErrorKind {
    fn from(err: ResolveErrorKind) -> Self {
        Self::Deps(Box::new(err))
    }
}

#[derive(thiserror::Error, Debug)]
#[error("disposer of provider `{id}` failed: {source}")]
pub struct DisposalFailure {
    pub id: ProviderId,
    #[source]
    pub source: anyhow::Error,
}

/// Destruction-time failures never prevent destruction of sibling instances;
/// every disposal is attempted and the failures are raised together.
#[derive(thiserror::Error, Debug)]
pub enum DestroyErrorKind {
    #[error("disposal failure(s) while destroying instances: {0:?}")]
    Disposal(Vec<DisposalFailure>),
}

impl DestroyErrorKind {
    #[inline]
    pub(crate) fn from_failures(failures: Vec<DisposalFailure>) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self::Disposal(failures))
        }
    }
}
