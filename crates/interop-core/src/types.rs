//! Type identities and the fallback matcher.
//!
//! Capabilities (command and notification interfaces) are identified by a
//! [`TypeDescriptor`] plus a [`Version`]. Because interfaces get renamed and
//! moved as the protocol evolves, an endpoint advertises a [`TypeFallback`]:
//! every historical identity it still answers to, most preferred first. Two
//! endpoints can talk about a capability when their fallback chains share at
//! least one exact `(descriptor, version)` pair.

use crate::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a type: its fully qualified name and the module that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeDescriptor {
    full_name: String,
    module_name: String,
}

impl TypeDescriptor {
    pub fn new(full_name: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            module_name: module_name.into(),
        }
    }

    /// Descriptor of a Rust type, derived from its type name.
    ///
    /// The module name is the leading path segment (the owning crate). Type
    /// names are only stable within one build, so capability interfaces that
    /// cross protocol versions should use explicit descriptors instead.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full_name = std::any::type_name::<T>();
        let module_name = full_name
            .split(['<', ':'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(full_name);
        Self::new(full_name, module_name)
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.full_name, self.module_name)
    }
}

/// A type descriptor pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedType {
    pub descriptor: TypeDescriptor,
    pub version: Version,
}

impl VersionedType {
    pub fn new(descriptor: TypeDescriptor, version: Version) -> Self {
        Self {
            descriptor,
            version,
        }
    }
}

impl fmt::Display for VersionedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.descriptor, self.version)
    }
}

/// Ordered list of acceptable identities for one logical capability type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeFallback {
    types: Vec<VersionedType>,
}

impl TypeFallback {
    pub fn new(types: Vec<VersionedType>) -> Self {
        Self { types }
    }

    /// A fallback chain holding a single identity.
    pub fn single(descriptor: TypeDescriptor, version: Version) -> Self {
        Self::new(vec![VersionedType::new(descriptor, version)])
    }

    /// Append a less preferred identity to the chain.
    pub fn with_fallback(mut self, descriptor: TypeDescriptor, version: Version) -> Self {
        self.types.push(VersionedType::new(descriptor, version));
        self
    }

    /// The most preferred identity.
    pub fn preferred(&self) -> Option<&VersionedType> {
        self.types.first()
    }

    pub fn types(&self) -> &[VersionedType] {
        &self.types
    }

    /// True if any identity in this chain equals any identity in `other`.
    pub fn is_partial_match(&self, other: &TypeFallback) -> bool {
        self.first_match(other).is_some()
    }

    /// The first identity of this chain that `other` also lists.
    pub fn first_match(&self, other: &TypeFallback) -> Option<&VersionedType> {
        self.types.iter().find(|t| other.types.contains(t))
    }
}

impl fmt::Display for TypeFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, t) in self.types.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{t}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32) -> Version {
        Version::new(major, 0, 0)
    }

    fn desc(name: &str) -> TypeDescriptor {
        TypeDescriptor::new(name, "acme")
    }

    #[test]
    fn reflexive_for_identical_pairs() {
        let a = TypeFallback::single(desc("Acme.Commands"), v(1));
        assert!(a.is_partial_match(&a.clone()));
    }

    #[test]
    fn different_descriptor_same_version_does_not_match() {
        let a = TypeFallback::single(desc("Acme.Commands"), v(1));
        let b = TypeFallback::single(desc("Acme.Other"), v(1));
        assert!(!a.is_partial_match(&b));
    }

    #[test]
    fn same_descriptor_different_module_does_not_match() {
        let a = TypeFallback::single(TypeDescriptor::new("Acme.Commands", "one"), v(1));
        let b = TypeFallback::single(TypeDescriptor::new("Acme.Commands", "two"), v(1));
        assert!(!a.is_partial_match(&b));
    }

    #[test]
    fn version_must_be_exact() {
        let a = TypeFallback::single(desc("Acme.Commands"), v(2));
        let b = TypeFallback::single(desc("Acme.Commands"), v(1));
        assert!(!a.is_partial_match(&b));
    }

    #[test]
    fn newer_endpoint_matches_older_through_fallback() {
        let newer = TypeFallback::single(desc("Acme.V2.Commands"), v(2))
            .with_fallback(desc("Acme.Commands"), v(1));
        let older = TypeFallback::single(desc("Acme.Commands"), v(1));
        assert!(newer.is_partial_match(&older));
        assert!(older.is_partial_match(&newer));
        assert_eq!(
            newer.first_match(&older).map(|t| t.descriptor.full_name()),
            Some("Acme.Commands")
        );
    }

    #[test]
    fn descriptor_of_rust_type() {
        let d = TypeDescriptor::of::<String>();
        assert_eq!(d.full_name(), "alloc::string::String");
        assert_eq!(d.module_name(), "alloc");
        assert_eq!(TypeDescriptor::of::<i32>().module_name(), "i32");
        assert_eq!(d, TypeDescriptor::of::<String>());
    }
}
