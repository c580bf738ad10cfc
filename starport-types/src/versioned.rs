use serde::{Deserialize, Serialize};

/// An authoritative value plus a monotonically increasing version.
///
/// The authority node bumps the version on every mutation and publishes the
/// whole struct; readers keep a copy and only accept strictly newer versions,
/// so reordered or repeated publications never roll a reader back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T) -> Self {
        Self { value, version: 0 }
    }

    /// Replaces the value and advances the version.
    pub fn bump(&mut self, value: T) {
        self.value = value;
        self.version += 1;
    }

    pub fn is_newer_than(&self, other: &Versioned<T>) -> bool {
        self.version > other.version
    }
}

impl<T: Default> Default for Versioned<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_advances_version() {
        let mut v = Versioned::new(false);
        let before = v;
        v.bump(true);
        assert_eq!(v.version, 1);
        assert!(v.value);
        assert!(v.is_newer_than(&before));
        assert!(!before.is_newer_than(&v));
    }
}
