/// Ephemeral Diffie-Hellman key agreement.
///
/// Two families: `DHE` over Curve25519 and `ECDHE` over NIST P-256. A
/// session wraps one party's private key; feeding it the peer's public key
/// yields a shared secret, which is stretched into a `SymmetricKey` so both
/// sides land on identical cipher key material.
use rand::rngs::OsRng;

use crate::digest::DigestKind;
use crate::error::{CryptoError, Result};
use crate::keys::{AsymmetricKey, KeyData, SymmetricKey};
use crate::secure::SecureBytes;

enum Inner {
    Dhe(x25519_dalek::StaticSecret),
    Ecdhe(p256::SecretKey),
}

pub struct KeyExchange {
    inner: Inner,
}

impl KeyExchange {
    /// Wrap an existing DH or EC private key.
    pub fn new(private_key: &AsymmetricKey) -> Result<Self> {
        let inner = match private_key.data() {
            KeyData::DhPrivate(secret) => Inner::Dhe(secret.clone()),
            KeyData::EcPrivate(secret) => Inner::Ecdhe(secret.clone()),
            _ => {
                return Err(CryptoError::KeyTypeMismatch(format!(
                    "{} {} key cannot run key agreement",
                    private_key.key_type().name(),
                    if private_key.is_private() { "private" } else { "public" }
                )))
            }
        };
        Ok(Self { inner })
    }

    /// Fresh ephemeral Curve25519 session.
    pub fn ephemeral_dhe() -> Self {
        Self {
            inner: Inner::Dhe(x25519_dalek::StaticSecret::random_from_rng(OsRng)),
        }
    }

    /// Fresh ephemeral P-256 session.
    pub fn ephemeral_ecdhe() -> Self {
        Self {
            inner: Inner::Ecdhe(p256::SecretKey::random(&mut OsRng)),
        }
    }

    /// The public half to hand to the peer.
    pub fn public_key(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> AsymmetricKey {
        let data = match &self.inner {
            Inner::Dhe(secret) => KeyData::DhPublic(x25519_dalek::PublicKey::from(secret)),
            Inner::Ecdhe(secret) => KeyData::EcPublic(secret.public_key()),
        };
        AsymmetricKey::new(data, name, description)
    }

    fn shared_secret(&self, peer_public_key: &AsymmetricKey) -> Result<SecureBytes> {
        match (&self.inner, peer_public_key.data()) {
            (Inner::Dhe(secret), KeyData::DhPublic(peer)) => {
                let shared = secret.diffie_hellman(peer);
                Ok(SecureBytes::from_slice(shared.as_bytes()))
            }
            (Inner::Ecdhe(secret), KeyData::EcPublic(peer)) => {
                let shared = p256::ecdh::diffie_hellman(
                    secret.to_nonzero_scalar(),
                    peer.as_affine(),
                );
                Ok(SecureBytes::from_slice(shared.raw_secret_bytes().as_slice()))
            }
            (_, peer) => Err(CryptoError::KeyTypeMismatch(format!(
                "Peer key is {} {}, expected the matching public family",
                peer.key_type().name(),
                if peer.is_private() { "private" } else { "public" }
            ))),
        }
    }

    /// Agree with the peer and stretch the shared secret into a symmetric key.
    #[allow(clippy::too_many_arguments)]
    pub fn derive_shared_symmetric_key(
        &self,
        peer_public_key: &AsymmetricKey,
        key_length: usize,
        salt: &[u8],
        md: DigestKind,
        count: usize,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<SymmetricKey> {
        let shared = self.shared_secret(peer_public_key)?;
        SymmetricKey::from_secret_and_salt(
            key_length,
            shared.as_bytes(),
            salt,
            md,
            count,
            name,
            description,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both_sides_agree(a: KeyExchange, b: KeyExchange) {
        let a_public = a.public_key("a", "");
        let b_public = b.public_key("b", "");

        let key_a = a
            .derive_shared_symmetric_key(&b_public, 32, b"salt", DigestKind::Sha2_256, 5, "", "")
            .unwrap();
        let key_b = b
            .derive_shared_symmetric_key(&a_public, 32, b"salt", DigestKind::Sha2_256, 5, "", "")
            .unwrap();
        assert_eq!(key_a.as_bytes(), key_b.as_bytes());
        assert_eq!(key_a.len(), 32);
    }

    #[test]
    fn test_dhe_agreement() {
        both_sides_agree(KeyExchange::ephemeral_dhe(), KeyExchange::ephemeral_dhe());
    }

    #[test]
    fn test_ecdhe_agreement() {
        both_sides_agree(KeyExchange::ephemeral_ecdhe(), KeyExchange::ephemeral_ecdhe());
    }

    #[test]
    fn test_salt_changes_derived_key() {
        let a = KeyExchange::ephemeral_dhe();
        let b = KeyExchange::ephemeral_dhe();
        let b_public = b.public_key("", "");

        let k1 = a
            .derive_shared_symmetric_key(&b_public, 32, b"one", DigestKind::Sha2_256, 1, "", "")
            .unwrap();
        let k2 = a
            .derive_shared_symmetric_key(&b_public, 32, b"two", DigestKind::Sha2_256, 1, "", "")
            .unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let dhe = KeyExchange::ephemeral_dhe();
        let ecdhe_public = KeyExchange::ephemeral_ecdhe().public_key("", "");
        assert!(dhe
            .derive_shared_symmetric_key(
                &ecdhe_public,
                32,
                b"",
                DigestKind::Sha2_256,
                1,
                "",
                ""
            )
            .is_err());
    }

    #[test]
    fn test_from_existing_key() {
        let params = crate::keys::Params::new(crate::keys::ParamsData::Dh, "", "");
        let private = params.create_key("exchange", "");
        let kx = KeyExchange::new(&private).unwrap();
        let other = KeyExchange::ephemeral_dhe();
        both_sides_agree(kx, other);
    }

    #[test]
    fn test_signing_key_rejected() {
        let key = AsymmetricKey::new(
            KeyData::Ed25519Private(ed25519_dalek::SigningKey::generate(
                &mut rand::rngs::OsRng,
            )),
            "",
            "",
        );
        assert!(KeyExchange::new(&key).is_err());
    }
}
