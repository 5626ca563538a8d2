mod container;
mod create;
mod definition;
mod invoke;
mod resolve;

pub use container::ScopeErrorKind;
pub use create::{CreateErrorKind, DestroyErrorKind, DisposalFailure};
pub use definition::DefinitionErrorKind;
pub use invoke::{InvokeErrorKind, NotifyErrorKind};
pub use resolve::ResolveErrorKind;
