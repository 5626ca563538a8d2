use std::collections::{BTreeMap, BTreeSet};

/// A structural discriminator tag narrowing which provider satisfies a request
/// beyond type alone.
///
/// Two qualifiers are equal when their tag names and all key/value attributes
/// are equal. A provider satisfies a request when its qualifier set is a
/// superset of the requested one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Qualifier {
    name: &'static str,
    attributes: BTreeMap<&'static str, &'static str>,
}

impl Qualifier {
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, key: &'static str, value: &'static str) -> Self {
        self.attributes.insert(key, value);
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub type QualifierSet = BTreeSet<Qualifier>;

#[inline]
#[must_use]
pub(crate) fn qualifier_set(qualifiers: &[Qualifier]) -> QualifierSet {
    qualifiers.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::{qualifier_set, Qualifier};

    #[test]
    fn test_structural_equality() {
        let a = Qualifier::new("database").with("name", "users");
        let b = Qualifier::new("database").with("name", "users");
        let c = Qualifier::new("database").with("name", "orders");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Qualifier::new("database"));
    }

    #[test]
    fn test_superset_matching() {
        let declared = qualifier_set(&[Qualifier::new("primary"), Qualifier::new("database").with("name", "users")]);

        assert!(declared.is_superset(&qualifier_set(&[])));
        assert!(declared.is_superset(&qualifier_set(&[Qualifier::new("primary")])));
        assert!(!declared.is_superset(&qualifier_set(&[Qualifier::new("database")])));
        assert!(!declared.is_superset(&qualifier_set(&[Qualifier::new("secondary")])));
    }
}
