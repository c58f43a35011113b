/// Signing and verification adapters.
///
/// DSA, ECDSA and RSA accumulate a digest and sign the prehash; Ed25519
/// signs the whole message, so its adapter buffers updates until finalize.
/// DSA signatures are DER-encoded, ECDSA and Ed25519 use their fixed-size
/// forms, RSA uses PKCS#1 v1.5 over the suite digest.
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use signature::{Signer as _, Verifier as _};

use crate::digest::{DigestKind, MessageDigest};
use crate::error::{CryptoError, Result};
use crate::keys::{AsymmetricKey, KeyData};

fn rsa_padding(digest: DigestKind) -> rsa::Pkcs1v15Sign {
    match digest {
        DigestKind::Sha2_256 => rsa::Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestKind::Sha2_384 => rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestKind::Sha2_512 => rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

enum SignKey {
    Dsa(dsa::SigningKey),
    Ec(p256::ecdsa::SigningKey),
    Rsa(rsa::RsaPrivateKey),
}

enum SignerState {
    Prehash {
        key: SignKey,
        digest: MessageDigest,
        padding: DigestKind,
    },
    Ed25519 {
        key: ed25519_dalek::SigningKey,
        buffer: Vec<u8>,
    },
}

/// Streaming signer over one private key.
pub struct Signer {
    state: SignerState,
}

impl Signer {
    pub fn new(key: &AsymmetricKey, digest: DigestKind) -> Result<Self> {
        let state = match key.data() {
            KeyData::DsaPrivate(k) => SignerState::Prehash {
                key: SignKey::Dsa(k.clone()),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::EcPrivate(k) => SignerState::Prehash {
                key: SignKey::Ec(p256::ecdsa::SigningKey::from(k.clone())),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::RsaPrivate(k) => SignerState::Prehash {
                key: SignKey::Rsa(k.clone()),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::Ed25519Private(k) => SignerState::Ed25519 {
                key: k.clone(),
                buffer: Vec::new(),
            },
            _ => {
                return Err(CryptoError::KeyTypeMismatch(format!(
                    "{} {} key cannot sign",
                    key.key_type().name(),
                    if key.is_private() { "private" } else { "public" }
                )))
            }
        };
        Ok(Self { state })
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            SignerState::Prehash { digest, .. } => digest.update(data),
            SignerState::Ed25519 { buffer, .. } => buffer.extend_from_slice(data),
        }
    }

    /// Produce the signature and reset for the next message.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        match &mut self.state {
            SignerState::Prehash {
                key,
                digest,
                padding,
            } => {
                let prehash = digest.finalize_reset();
                match key {
                    SignKey::Dsa(k) => {
                        let sig: dsa::Signature = k.sign_prehash(&prehash).map_err(|e| {
                            CryptoError::Primitive(format!("DSA sign: {e}"))
                        })?;
                        Ok(signature::SignatureEncoding::to_vec(&sig))
                    }
                    SignKey::Ec(k) => {
                        let sig: p256::ecdsa::Signature =
                            k.sign_prehash(&prehash).map_err(|e| {
                                CryptoError::Primitive(format!("ECDSA sign: {e}"))
                            })?;
                        Ok(sig.to_bytes().to_vec())
                    }
                    SignKey::Rsa(k) => k
                        .sign(rsa_padding(*padding), &prehash)
                        .map_err(|e| CryptoError::Primitive(format!("RSA sign: {e}"))),
                }
            }
            SignerState::Ed25519 { key, buffer } => {
                let sig = key.sign(buffer);
                buffer.clear();
                Ok(sig.to_bytes().to_vec())
            }
        }
    }

    pub fn sign_buffer(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(CryptoError::InvalidArgument("Cannot sign an empty buffer".into()));
        }
        self.update(data);
        self.finalize()
    }
}

enum VerifyKey {
    Dsa(dsa::VerifyingKey),
    Ec(p256::ecdsa::VerifyingKey),
    Rsa(rsa::RsaPublicKey),
}

enum VerifierState {
    Prehash {
        key: VerifyKey,
        digest: MessageDigest,
        padding: DigestKind,
    },
    Ed25519 {
        key: ed25519_dalek::VerifyingKey,
        buffer: Vec<u8>,
    },
}

/// Streaming verifier. Accepts a public key, or a private key whose public
/// half is derived internally.
pub struct Verifier {
    state: VerifierState,
}

impl Verifier {
    pub fn new(key: &AsymmetricKey, digest: DigestKind) -> Result<Self> {
        let state = match key.data() {
            KeyData::DsaPublic(k) => VerifierState::Prehash {
                key: VerifyKey::Dsa(k.clone()),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::DsaPrivate(k) => VerifierState::Prehash {
                key: VerifyKey::Dsa(k.verifying_key().clone()),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::EcPublic(k) => VerifierState::Prehash {
                key: VerifyKey::Ec(p256::ecdsa::VerifyingKey::from(*k)),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::EcPrivate(k) => VerifierState::Prehash {
                key: VerifyKey::Ec(p256::ecdsa::VerifyingKey::from(
                    p256::ecdsa::SigningKey::from(k.clone()),
                )),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::RsaPublic(k) => VerifierState::Prehash {
                key: VerifyKey::Rsa(k.clone()),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::RsaPrivate(k) => VerifierState::Prehash {
                key: VerifyKey::Rsa(k.to_public_key()),
                digest: MessageDigest::new(digest),
                padding: digest,
            },
            KeyData::Ed25519Public(k) => VerifierState::Ed25519 {
                key: *k,
                buffer: Vec::new(),
            },
            KeyData::Ed25519Private(k) => VerifierState::Ed25519 {
                key: k.verifying_key(),
                buffer: Vec::new(),
            },
            _ => {
                return Err(CryptoError::KeyTypeMismatch(format!(
                    "{} key cannot verify signatures",
                    key.key_type().name()
                )))
            }
        };
        Ok(Self { state })
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            VerifierState::Prehash { digest, .. } => digest.update(data),
            VerifierState::Ed25519 { buffer, .. } => buffer.extend_from_slice(data),
        }
    }

    /// Check the signature over everything fed so far; resets for reuse.
    /// A malformed or mismatched signature is `false`, not an error.
    pub fn finalize_verify(&mut self, signature: &[u8]) -> Result<bool> {
        match &mut self.state {
            VerifierState::Prehash {
                key,
                digest,
                padding,
            } => {
                let prehash = digest.finalize_reset();
                let ok = match key {
                    VerifyKey::Dsa(k) => match dsa::Signature::try_from(signature) {
                        Ok(sig) => k.verify_prehash(&prehash, &sig).is_ok(),
                        Err(_) => false,
                    },
                    VerifyKey::Ec(k) => {
                        match p256::ecdsa::Signature::from_slice(signature) {
                            Ok(sig) => k.verify_prehash(&prehash, &sig).is_ok(),
                            Err(_) => false,
                        }
                    }
                    VerifyKey::Rsa(k) => k
                        .verify(rsa_padding(*padding), &prehash, signature)
                        .is_ok(),
                };
                Ok(ok)
            }
            VerifierState::Ed25519 { key, buffer } => {
                let ok = match ed25519_dalek::Signature::from_slice(signature) {
                    Ok(sig) => key.verify(buffer, &sig).is_ok(),
                    Err(_) => false,
                };
                buffer.clear();
                Ok(ok)
            }
        }
    }

    pub fn verify_buffer_signature(&mut self, data: &[u8], signature: &[u8]) -> Result<bool> {
        if data.is_empty() || signature.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "Cannot verify an empty buffer or signature".into(),
            ));
        }
        self.update(data);
        self.finalize_verify(signature)
    }
}
