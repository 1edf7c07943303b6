//! Key adapter shared by both cache tiers

use std::borrow::Borrow;
use std::fmt;

/// Wraps a caller-supplied key so both tiers use one concrete map-key type.
///
/// Equality and hashing are forwarded to the wrapped value, so two adapters
/// wrapping equal keys are interchangeable. The `Borrow<K>` impl lets the
/// tiers look entries up by `&K` without building an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey<K>(K);

impl<K> CacheKey<K> {
    /// Wrap a key
    pub fn new(key: K) -> Self {
        Self(key)
    }

    /// Borrow the wrapped key
    pub fn get(&self) -> &K {
        &self.0
    }

    /// Unwrap the key
    pub fn into_inner(self) -> K {
        self.0
    }
}

impl<K: fmt::Display> CacheKey<K> {
    /// File name used by the disk tier: the key's textual form with `/` replaced by `-`.
    ///
    /// Keys whose textual forms collide after substitution share a file.
    pub fn file_name(&self) -> String {
        file_name_for(&self.0)
    }
}

/// File name for a key without wrapping it first
pub(crate) fn file_name_for<K: fmt::Display + ?Sized>(key: &K) -> String {
    key.to_string().replace('/', "-")
}

impl<K> From<K> for CacheKey<K> {
    fn from(key: K) -> Self {
        Self(key)
    }
}

impl<K> Borrow<K> for CacheKey<K> {
    fn borrow(&self) -> &K {
        &self.0
    }
}

impl<K: fmt::Display> fmt::Display for CacheKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;
    use std::hash::{Hash, Hasher};

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Composite {
        tenant: String,
        id: u32,
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equality_and_hash_are_forwarded() {
        let a = CacheKey::new(Composite { tenant: "acme".into(), id: 1 });
        let b = CacheKey::new(Composite { tenant: "acme".into(), id: 1 });
        let c = CacheKey::new(Composite { tenant: "acme".into(), id: 2 });

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(a.get()));
    }

    #[test]
    fn test_lookup_by_borrowed_key() {
        let mut map = HashMap::new();
        map.insert(CacheKey::new("alpha".to_string()), 1);
        map.insert(CacheKey::new("beta".to_string()), 2);

        assert_eq!(map.get(&"alpha".to_string()), Some(&1));
        assert_eq!(map.get(&CacheKey::new("beta".to_string())), Some(&2));
        assert_eq!(map.get(&"gamma".to_string()), None);
    }

    #[test]
    fn test_file_name_substitutes_separators() {
        let key = CacheKey::new("images/2024/cat.png");
        assert_eq!(key.file_name(), "images-2024-cat.png");

        let key: CacheKey<u64> = 42.into();
        assert_eq!(key.file_name(), "42");
    }

    #[test]
    fn test_into_inner() {
        let key = CacheKey::new(String::from("k"));
        assert_eq!(key.to_string(), "k");
        assert_eq!(key.into_inner(), "k");
    }
}
