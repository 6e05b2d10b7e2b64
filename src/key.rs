//! Service key types for the registry.

use std::any::TypeId;
use std::fmt;

/// Identity of a registration: a type or trait identity plus an optional
/// service name.
///
/// Keys are structural: two keys built from the same type and name compare
/// equal regardless of where they were constructed. A key does **not**
/// uniquely identify a descriptor; several descriptors may accumulate under
/// one key (multi-binding), which is how plugin-style auto-discovery works.
///
/// # Examples
///
/// ```rust
/// use keel::ServiceKey;
///
/// struct Database;
///
/// let unnamed = ServiceKey::of::<Database>();
/// let named = ServiceKey::named_of::<Database>("replica");
///
/// assert_ne!(unnamed, named);
/// assert_eq!(named.service_name(), Some("replica"));
/// assert!(unnamed.display_name().contains("Database"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKey {
    /// Concrete type key: TypeId plus the type name for diagnostics.
    Type(TypeId, &'static str),
    /// Named concrete type key.
    TypeNamed(TypeId, &'static str, &'static str),
    /// Trait object key. Traits have no TypeId, so the trait name is the
    /// identity.
    Trait(&'static str),
    /// Named trait object key.
    TraitNamed(&'static str, &'static str),
}

/// The type/trait portion of a key, ignoring the service name.
///
/// `resolve_all`-style lookups match by family: every descriptor producing
/// the requested type participates, named or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// All registrations of one concrete type.
    Type(TypeId),
    /// All registrations of one trait object.
    Trait(&'static str),
}

impl ServiceKey {
    /// Key for an unnamed registration of the concrete type `T`.
    pub fn of<T: 'static>() -> Self {
        ServiceKey::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Key for a named registration of the concrete type `T`.
    pub fn named_of<T: 'static>(name: &'static str) -> Self {
        ServiceKey::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name)
    }

    /// Key for an unnamed trait registration.
    pub fn of_trait<T: ?Sized + 'static>() -> Self {
        ServiceKey::Trait(std::any::type_name::<T>())
    }

    /// Key for a named trait registration.
    pub fn named_of_trait<T: ?Sized + 'static>(name: &'static str) -> Self {
        ServiceKey::TraitNamed(std::any::type_name::<T>(), name)
    }

    /// Human-readable type or trait name, as produced by
    /// `std::any::type_name`.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceKey::Type(_, name) => name,
            ServiceKey::TypeNamed(_, name, _) => name,
            ServiceKey::Trait(name) => name,
            ServiceKey::TraitNamed(name, _) => name,
        }
    }

    /// The service name for named registrations, `None` otherwise.
    pub fn service_name(&self) -> Option<&'static str> {
        match self {
            ServiceKey::Type(_, _) | ServiceKey::Trait(_) => None,
            ServiceKey::TypeNamed(_, _, name) => Some(name),
            ServiceKey::TraitNamed(_, name) => Some(name),
        }
    }

    /// The family this key belongs to.
    pub fn family(&self) -> KeyFamily {
        match self {
            ServiceKey::Type(id, _) | ServiceKey::TypeNamed(id, _, _) => KeyFamily::Type(*id),
            ServiceKey::Trait(name) | ServiceKey::TraitNamed(name, _) => KeyFamily::Trait(name),
        }
    }
}

impl KeyFamily {
    /// Family of the concrete type `T`.
    pub fn of<T: 'static>() -> Self {
        KeyFamily::Type(TypeId::of::<T>())
    }

    /// Family of the trait object `T`.
    pub fn of_trait<T: ?Sized + 'static>() -> Self {
        KeyFamily::Trait(std::any::type_name::<T>())
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.service_name() {
            Some(name) => write!(f, "{}[{}]", self.display_name(), name),
            None => f.write_str(self.display_name()),
        }
    }
}
