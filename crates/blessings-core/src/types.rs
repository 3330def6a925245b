//! Strong type definitions for Blessings.
//!
//! Principals are opaque strings; blessing and request identifiers are
//! fixed-size newtypes so they cannot be confused with each other or with
//! principal names.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::error::{CoreError, Result};

/// An opaque identity capable of holding and granting permissions.
///
/// Equality is exact-string. Groups (e.g. `"public"`) are principals too.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Create a principal from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Principal {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A 32-byte blessing identifier.
///
/// Derived from Blake3(source || target), so every `(source, target)` pair
/// maps to exactly one record in the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlessingId(pub [u8; 32]);

impl BlessingId {
    /// Derive the identifier of the blessing `source -> target`.
    ///
    /// A `None` source denotes a self-issued root blessing.
    pub fn derive(source: Option<&Principal>, target: &Principal) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"blessings-id-v0:");
        match source {
            Some(source) => {
                hasher.update(b"delegated:");
                hasher.update(&(source.as_str().len() as u64).to_le_bytes());
                hasher.update(source.as_str().as_bytes());
            }
            None => {
                hasher.update(b"root:");
            }
        }
        hasher.update(b":");
        hasher.update(target.as_str().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// The identifier of `target`'s self-issued root blessing.
    pub fn root(target: &Principal) -> Self {
        Self::derive(None, target)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidId(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidId(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for BlessingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlessingId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlessingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// A 16-byte permission request identifier, allocated by the requester.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub [u8; 16]);

impl RequestId {
    /// Generate a random request ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.to_hex())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blessing_id_is_deterministic() {
        let alice = Principal::from("alice");
        let bob = Principal::from("bob");

        assert_eq!(
            BlessingId::derive(Some(&alice), &bob),
            BlessingId::derive(Some(&alice), &bob)
        );
        assert_ne!(
            BlessingId::derive(Some(&alice), &bob),
            BlessingId::derive(Some(&bob), &alice)
        );
    }

    #[test]
    fn test_root_id_differs_from_delegated() {
        let alice = Principal::from("alice");
        assert_ne!(
            BlessingId::root(&alice),
            BlessingId::derive(Some(&alice), &alice)
        );
    }

    #[test]
    fn test_source_target_boundary_is_unambiguous() {
        // "ab" -> "c" must not collide with "a" -> "bc"
        let a = BlessingId::derive(Some(&Principal::from("ab")), &Principal::from("c"));
        let b = BlessingId::derive(Some(&Principal::from("a")), &Principal::from("bc"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_blessing_id_hex_roundtrip() {
        let id = BlessingId::root(&Principal::from("root"));
        assert_eq!(BlessingId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(BlessingId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::random(), RequestId::random());
    }
}
