/// Wrappers for secret material that is wiped from memory on drop.
///
/// Everything that holds private key bytes, derived secrets, or plaintext
/// recovered in secure mode travels through `SecureBytes` so the material
/// never outlives its owner.
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A variable-length secret buffer that is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Allocate a zero-filled buffer of the given length.
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the wrapper, handing the caller the raw bytes.
    /// The caller takes over the wiping obligation.
    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureBytes({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_bytes() {
        let b = SecureBytes::new(vec![1, 2, 3]);
        assert_eq!(b.as_bytes(), &[1, 2, 3]);
        assert_eq!(b.len(), 3);
        assert!(!b.is_empty());
    }

    #[test]
    fn test_zeroed() {
        let b = SecureBytes::zeroed(16);
        assert_eq!(b.as_bytes(), &[0u8; 16]);
    }

    #[test]
    fn test_debug_does_not_leak() {
        let b = SecureBytes::new(vec![0xAA; 8]);
        assert_eq!(format!("{b:?}"), "SecureBytes(8 bytes)");
    }
}
