use std::{collections::BTreeSet, sync::Arc};

use crate::{
    any::AnyInstance,
    errors::InvokeErrorKind,
    provider::{MethodArgs, MethodFn, MethodOut},
};

/// A tag linking a method to the interceptors bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Binding(&'static str);

impl Binding {
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

pub(crate) type InterceptFn = Arc<dyn Fn(&mut Invocation<'_>) -> Result<MethodOut, InvokeErrorKind> + Send + Sync>;

/// Cross-cutting behavior wrapped around method invocations.
///
/// An interceptor applies to a method when its binding set is a subset of the
/// method's effective bindings (provider bindings plus method bindings).
/// Lower priority runs first; ties keep declaration order.
pub struct Interceptor {
    pub(crate) name: &'static str,
    pub(crate) bindings: BTreeSet<Binding>,
    pub(crate) priority: i32,
    pub(crate) function: InterceptFn,
}

impl Interceptor {
    #[must_use]
    pub fn new<F>(name: &'static str, around_invoke: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> Result<MethodOut, InvokeErrorKind> + Send + Sync + 'static,
    {
        Self {
            name,
            bindings: BTreeSet::new(),
            priority: 0,
            function: Arc::new(around_invoke),
        }
    }

    #[must_use]
    pub fn binding(mut self, binding: Binding) -> Self {
        self.bindings.insert(binding);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Per-invocation state handed to each interceptor: the target instance, the
/// method identity, the mutable arguments and the `proceed` capability.
///
/// Not calling [`Self::proceed`] short-circuits the rest of the chain; the
/// interceptor's own return value becomes the invocation result.
pub struct Invocation<'a> {
    pub(crate) target: &'a AnyInstance,
    pub(crate) method: &'static str,
    pub(crate) args: &'a mut MethodArgs,
    pub(crate) chain: &'a [InterceptFn],
    pub(crate) terminal: &'a MethodFn,
    pub(crate) position: usize,
}

impl Invocation<'_> {
    #[inline]
    #[must_use]
    pub fn method(&self) -> &'static str {
        self.method
    }

    #[inline]
    #[must_use]
    pub fn target<T: 'static>(&self) -> Option<&T> {
        self.target.downcast_ref()
    }

    #[inline]
    #[must_use]
    pub fn args(&mut self) -> &mut MethodArgs {
        self.args
    }

    /// Invokes the next interceptor, or the target method at the end of the
    /// chain. Errors propagate unswallowed.
    #[allow(clippy::missing_errors_doc)]
    pub fn proceed(&mut self) -> Result<MethodOut, InvokeErrorKind> {
        if let Some(interceptor) = self.chain.get(self.position) {
            let interceptor = interceptor.clone();
            self.position += 1;
            interceptor(self)
        } else {
            (self.terminal)(self.target, self.args).map_err(|source| InvokeErrorKind::Target {
                method: self.method,
                source,
            })
        }
    }
}

/// The ordered interceptor stack of one (provider, method) pair. Built once
/// at catalog build and reused; only the [`Invocation`] is per-call state.
pub(crate) struct InterceptionChain {
    pub(crate) method: &'static str,
    pub(crate) interceptors: Vec<InterceptFn>,
    pub(crate) terminal: MethodFn,
}

impl InterceptionChain {
    pub(crate) fn invoke(&self, target: &AnyInstance, args: &mut MethodArgs) -> Result<MethodOut, InvokeErrorKind> {
        let mut invocation = Invocation {
            target,
            method: self.method,
            args,
            chain: &self.interceptors,
            terminal: &self.terminal,
            position: 0,
        };
        invocation.proceed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };

    use super::{Binding, InterceptionChain, Interceptor};
    use crate::{
        any::AnyInstance,
        errors::InvokeErrorKind,
        provider::{MethodFn, MethodOut},
    };

    struct Greeter(&'static str);

    fn greet_fn() -> MethodFn {
        Arc::new(|instance, _args| {
            let greeter = instance.downcast_ref::<Greeter>().unwrap();
            Ok(Box::new(greeter.0) as MethodOut)
        })
    }

    fn chain_of(interceptors: Vec<Interceptor>) -> InterceptionChain {
        InterceptionChain {
            method: "greet",
            interceptors: interceptors.into_iter().map(|interceptor| interceptor.function).collect(),
            terminal: greet_fn(),
        }
    }

    #[test]
    fn test_proceed_reaches_target() {
        let calls = Arc::new(AtomicU8::new(0));
        let chain = chain_of(vec![Interceptor::new("count", {
            let calls = calls.clone();
            move |invocation| {
                calls.fetch_add(1, Ordering::SeqCst);
                invocation.proceed()
            }
        })]);

        let target: AnyInstance = Arc::new(Greeter("hello"));
        let result = chain.invoke(&target, &mut Vec::new()).unwrap();

        assert_eq!(*result.downcast::<&'static str>().unwrap(), "hello");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_short_circuit_skips_rest() {
        let inner_calls = Arc::new(AtomicU8::new(0));
        let chain = chain_of(vec![
            Interceptor::new("short", |_invocation| Ok(Box::new("intercepted") as MethodOut)).binding(Binding::new("guard")),
            Interceptor::new("inner", {
                let inner_calls = inner_calls.clone();
                move |invocation| {
                    inner_calls.fetch_add(1, Ordering::SeqCst);
                    invocation.proceed()
                }
            }),
        ]);

        let target: AnyInstance = Arc::new(Greeter("hello"));
        let result = chain.invoke(&target, &mut Vec::new()).unwrap();

        assert_eq!(*result.downcast::<&'static str>().unwrap(), "intercepted");
        assert_eq!(inner_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_interceptor_error_propagates() {
        let chain = chain_of(vec![Interceptor::new("fail", |_invocation| {
            Err(InvokeErrorKind::Interceptor(anyhow::anyhow!("denied")))
        })]);

        let target: AnyInstance = Arc::new(Greeter("hello"));
        let err = chain.invoke(&target, &mut Vec::new()).unwrap_err();

        assert!(matches!(err, InvokeErrorKind::Interceptor(_)));
    }

    #[test]
    fn test_args_visible_to_target() {
        let chain = InterceptionChain {
            method: "greet",
            interceptors: vec![Interceptor::new("rewrite", |invocation| {
                invocation.args().push(Box::new(1u32));
                invocation.proceed()
            })
            .function],
            terminal: Arc::new(|_instance, args| Ok(Box::new(args.len()) as MethodOut)),
        };

        let target: AnyInstance = Arc::new(Greeter("hello"));
        let result = chain.invoke(&target, &mut Vec::new()).unwrap();

        assert_eq!(*result.downcast::<usize>().unwrap(), 1);
    }
}
