/// Keyed message authentication: HMAC over the suite digest or CMAC over AES.
///
/// Verification recomputes the tag and compares in constant time. The
/// internal state resets after every sign/verify, so one instance is
/// reusable (but not thread-safe).
use aes::{Aes128, Aes192, Aes256};
use cmac::Cmac;
use hmac::{Hmac, Mac as MacImpl};
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::digest::DigestKind;
use crate::error::{CryptoError, Result};
use crate::keys::{AsymmetricKey, KeyData};

enum State {
    HmacSha256(Hmac<Sha256>),
    HmacSha384(Hmac<Sha384>),
    HmacSha512(Hmac<Sha512>),
    CmacAes128(Cmac<Aes128>),
    CmacAes192(Cmac<Aes192>),
    CmacAes256(Cmac<Aes256>),
}

/// Stateful MAC bound to one key.
pub struct Mac {
    state: State,
}

impl Mac {
    /// Build a MAC from an HMAC or CMAC key. `digest` selects the HMAC hash;
    /// CMAC ignores it (the key length picks the AES variant).
    pub fn new(key: &AsymmetricKey, digest: DigestKind) -> Result<Self> {
        let state = match key.data() {
            KeyData::Hmac(bytes) => {
                let bytes = bytes.as_bytes();
                match digest {
                    DigestKind::Sha2_256 => State::HmacSha256(
                        Hmac::new_from_slice(bytes)
                            .map_err(|e| CryptoError::Primitive(format!("HMAC init: {e}")))?,
                    ),
                    DigestKind::Sha2_384 => State::HmacSha384(
                        Hmac::new_from_slice(bytes)
                            .map_err(|e| CryptoError::Primitive(format!("HMAC init: {e}")))?,
                    ),
                    DigestKind::Sha2_512 => State::HmacSha512(
                        Hmac::new_from_slice(bytes)
                            .map_err(|e| CryptoError::Primitive(format!("HMAC init: {e}")))?,
                    ),
                }
            }
            KeyData::Cmac(bytes) => {
                let bytes = bytes.as_bytes();
                let init_err = |e: hmac::digest::InvalidLength| {
                    CryptoError::Primitive(format!("CMAC init: {e}"))
                };
                match bytes.len() {
                    16 => State::CmacAes128(Cmac::new_from_slice(bytes).map_err(init_err)?),
                    24 => State::CmacAes192(Cmac::new_from_slice(bytes).map_err(init_err)?),
                    32 => State::CmacAes256(Cmac::new_from_slice(bytes).map_err(init_err)?),
                    n => {
                        return Err(CryptoError::InvalidArgument(format!(
                            "CMAC key length {n} is not an AES key length"
                        )))
                    }
                }
            }
            _ => {
                return Err(CryptoError::KeyTypeMismatch(format!(
                    "{} key cannot drive a MAC",
                    key.key_type().name()
                )))
            }
        };
        Ok(Self { state })
    }

    /// MAC output length in bytes.
    pub fn mac_size(&self) -> usize {
        match &self.state {
            State::HmacSha256(_) => 32,
            State::HmacSha384(_) => 48,
            State::HmacSha512(_) => 64,
            State::CmacAes128(_) | State::CmacAes192(_) | State::CmacAes256(_) => 16,
        }
    }

    fn compute(&mut self, data: &[u8]) -> Vec<u8> {
        match &mut self.state {
            State::HmacSha256(m) => {
                m.update(data);
                m.finalize_reset().into_bytes().to_vec()
            }
            State::HmacSha384(m) => {
                m.update(data);
                m.finalize_reset().into_bytes().to_vec()
            }
            State::HmacSha512(m) => {
                m.update(data);
                m.finalize_reset().into_bytes().to_vec()
            }
            State::CmacAes128(m) => {
                m.update(data);
                m.finalize_reset().into_bytes().to_vec()
            }
            State::CmacAes192(m) => {
                m.update(data);
                m.finalize_reset().into_bytes().to_vec()
            }
            State::CmacAes256(m) => {
                m.update(data);
                m.finalize_reset().into_bytes().to_vec()
            }
        }
    }

    pub fn sign_buffer(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(CryptoError::InvalidArgument("Cannot MAC an empty buffer".into()));
        }
        Ok(self.compute(data))
    }

    /// Constant-time comparison of the recomputed tag against `signature`.
    pub fn verify_buffer_signature(&mut self, data: &[u8], signature: &[u8]) -> Result<bool> {
        if data.is_empty() || signature.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "Cannot verify a MAC over an empty buffer".into(),
            ));
        }
        let computed = self.compute(data);
        Ok(computed.ct_eq(signature).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hmac_key(digest: DigestKind) -> AsymmetricKey {
        AsymmetricKey::hmac_key(b"mac secret", b"salt", digest, 1, "", "").unwrap()
    }

    #[test]
    fn test_hmac_sign_verify() {
        let key = hmac_key(DigestKind::Sha2_512);
        let mut mac = Mac::new(&key, DigestKind::Sha2_512).unwrap();
        let tag = mac.sign_buffer(b"message").unwrap();
        assert_eq!(tag.len(), 64);
        assert!(mac.verify_buffer_signature(b"message", &tag).unwrap());
        assert!(!mac.verify_buffer_signature(b"messagf", &tag).unwrap());
    }

    #[test]
    fn test_hmac_tampered_tag_rejected() {
        let key = hmac_key(DigestKind::Sha2_256);
        let mut mac = Mac::new(&key, DigestKind::Sha2_256).unwrap();
        let mut tag = mac.sign_buffer(b"message").unwrap();
        tag[0] ^= 0x01;
        assert!(!mac.verify_buffer_signature(b"message", &tag).unwrap());
        // Truncated tag is also a mismatch, not an error.
        assert!(!mac.verify_buffer_signature(b"message", &tag[..16]).unwrap());
    }

    #[test]
    fn test_state_resets_between_calls() {
        let key = hmac_key(DigestKind::Sha2_256);
        let mut mac = Mac::new(&key, DigestKind::Sha2_256).unwrap();
        let first = mac.sign_buffer(b"same input").unwrap();
        let second = mac.sign_buffer(b"same input").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cmac_sign_verify() {
        let key =
            AsymmetricKey::cmac_key(b"secret", b"", 32, DigestKind::Sha2_256, 1, "", "").unwrap();
        let mut mac = Mac::new(&key, DigestKind::Sha2_256).unwrap();
        let tag = mac.sign_buffer(b"payload").unwrap();
        assert_eq!(tag.len(), 16);
        assert!(mac.verify_buffer_signature(b"payload", &tag).unwrap());
    }

    #[test]
    fn test_wrong_key_type_rejected() {
        let key = AsymmetricKey::new(
            KeyData::Ed25519Private(ed25519_dalek::SigningKey::generate(
                &mut rand::rngs::OsRng,
            )),
            "",
            "",
        );
        assert!(Mac::new(&key, DigestKind::Sha2_256).is_err());
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let key = hmac_key(DigestKind::Sha2_256);
        let mut mac = Mac::new(&key, DigestKind::Sha2_256).unwrap();
        assert!(mac.sign_buffer(b"").is_err());
    }
}
