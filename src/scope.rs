/// Lifecycle policy of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeKind {
    /// A new instance per resolution, destroyed together with its creator.
    Dependent,
    /// One instance per active scope activation, mediated by a client proxy.
    /// Requires an [`crate::ActiveScopeHandle`] on the resolving thread.
    Request,
    /// One instance for the process lifetime. Always active, mediated by a
    /// client proxy, destroyed on [`crate::Container::shutdown`].
    Singleton,
}

impl ScopeKind {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Dependent => "dependent",
            ScopeKind::Request => "request",
            ScopeKind::Singleton => "singleton",
        }
    }

    /// Normal scopes hand out instances only through a client proxy and own
    /// them in a context store; dependent instances are owned by the caller.
    #[inline]
    #[must_use]
    pub(crate) fn is_normal(&self) -> bool {
        matches!(self, ScopeKind::Request | ScopeKind::Singleton)
    }
}
