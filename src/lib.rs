//! A small typed dependency-injection runtime: providers with scopes,
//! qualifiers, client proxies, method interception and typed events.
//!
//! Declarations are collected in a [`CatalogBuilder`], validated once into an
//! immutable catalog, and served by a [`Container`]:
//!
//! ```
//! use canister::{CatalogBuilder, Container, Provider, ScopeKind};
//!
//! struct Greeter {
//!     greeting: &'static str,
//! }
//!
//! let catalog = CatalogBuilder::new()
//!     .provide(Provider::new::<Greeter, _>("greeter", ScopeKind::Singleton, |_| {
//!         Ok(Greeter { greeting: "hello" })
//!     }))
//!     .build()?;
//! let container = Container::new(catalog);
//!
//! let greeter = container.instance::<Greeter>()?.get()?;
//! assert_eq!(greeter.greeting, "hello");
//!
//! container.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub(crate) mod any;
pub(crate) mod catalog;
pub(crate) mod container;
pub(crate) mod context;
pub(crate) mod creational;
pub(crate) mod errors;
pub(crate) mod event;
pub(crate) mod interceptor;
pub(crate) mod provider;
pub(crate) mod proxy;
pub(crate) mod qualifier;
pub(crate) mod resolver;
pub(crate) mod scope;
pub(crate) mod service;

pub use any::TypeInfo;
pub use catalog::{CatalogBuilder, ProviderCatalog};
pub use container::{Container, InstanceHandle};
pub use context::ActiveScopeHandle;
pub use creational::CreationContext;
pub use errors::{
    CreateErrorKind, DefinitionErrorKind, DestroyErrorKind, DisposalFailure, InvokeErrorKind, NotifyErrorKind, ResolveErrorKind,
    ScopeErrorKind,
};
pub use event::{Observer, Reception};
pub use interceptor::{Binding, Interceptor, Invocation};
pub use provider::{InjectionPoint, Method, MethodArgs, MethodOut, Provider, ProviderId};
pub use proxy::ClientProxy;
pub use qualifier::{Qualifier, QualifierSet};
pub use scope::ScopeKind;
