use super::{create::DestroyErrorKind, resolve::ResolveErrorKind};
use crate::{any::TypeInfo, provider::ProviderId};

#[derive(thiserror::Error, Debug)]
pub enum InvokeErrorKind {
    #[error("no method `{method}` on provider `{id}`")]
    NoSuchMethod { id: ProviderId, method: &'static str },
    /// Obtaining the invocation target failed.
    #[error(transparent)]
    Resolve(Box<ResolveErrorKind>),
    #[error("method `{method}` failed: {source}")]
    Target {
        method: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("interceptor failed: {0}")]
    Interceptor(#[from] anyhow::Error),
}

impl From<ResolveErrorKind> for InvokeErrorKind {
    fn from(err: ResolveErrorKind) -> Self {
        Self::Resolve(Box::new(err))
    }
}

/// A failing observer aborts the remaining notification; the error reaches
/// the caller of `fire` with the observer's identity attached.
#[derive(thiserror::Error, Debug)]
pub enum NotifyErrorKind {
    #[error("failed to resolve declaring instance of provider `{declaring}`: {source}")]
    Resolve {
        declaring: ProviderId,
        #[source]
        source: Box<ResolveErrorKind>,
    },
    #[error("observer on provider `{declaring}` failed for event {event}: {source}")]
    Observer {
        declaring: ProviderId,
        event: TypeInfo,
        #[source]
        source: anyhow::Error,
    },
    #[error("observer method `{method}` on provider `{declaring}` failed: {source}")]
    Invoke {
        declaring: ProviderId,
        method: &'static str,
        #[source]
        source: Box<InvokeErrorKind>,
    },
    #[error("failed to destroy dependent observer instance of provider `{declaring}`: {source}")]
    Destroy {
        declaring: ProviderId,
        #[source]
        source: DestroyErrorKind,
    },
}
