/// 32-byte opaque identifiers for keys, parameters and rings.
///
/// Ids are stable across serialization and are never reissued for the same
/// logical key. They are derived by hashing either caller-supplied bytes or
/// a fresh random draw.
use std::fmt;

use rand::RngCore;

/// Number of bytes in an [`Id`].
pub const ID_SIZE: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    /// Derive an id by hashing the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Derive an id from a fresh random draw.
    pub fn random() -> Self {
        let mut seed = [0u8; ID_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_bytes(&seed)
    }

    pub const fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_deterministic() {
        assert_eq!(Id::from_bytes(b"key material"), Id::from_bytes(b"key material"));
        assert_ne!(Id::from_bytes(b"a"), Id::from_bytes(b"b"));
    }

    #[test]
    fn test_random_unique() {
        assert_ne!(Id::random(), Id::random());
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = Id::from_bytes(b"hex me");
        assert_eq!(Id::from_hex(&id.to_hex()), Some(id));
        assert!(Id::from_hex("abcd").is_none());
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let a = Id([0u8; ID_SIZE]);
        let mut high = [0u8; ID_SIZE];
        high[0] = 1;
        assert!(a < Id(high));
    }
}
