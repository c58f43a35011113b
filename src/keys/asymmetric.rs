/// Asymmetric and MAC keying material as a tagged sum.
///
/// One variant per (family, private/public) pair. DSA, EC and RSA payloads
/// serialize as PKCS#8 PEM; the Curve25519 family (X25519 key exchange,
/// Ed25519 signatures) serializes as fixed-size raw bytes; HMAC/CMAC keys
/// carry their raw secret.
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};

use crate::digest::DigestKind;
use crate::error::{CryptoError, Result};
use crate::id::Id;
use crate::keys::symmetric;
use crate::secure::SecureBytes;
use crate::serial::{self, Decoder, Encoder, Metadata};

pub(crate) const TYPE_TAG: &str = "AsymmetricKey";
pub(crate) const TYPE_TAG_ED25519: &str = "Ed25519AsymmetricKey";
pub(crate) const TYPE_TAG_X25519: &str = "X25519AsymmetricKey";

/// Key family discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyType {
    Dh,
    Dsa,
    Ec,
    Rsa,
    Ed25519,
    Hmac,
    Cmac,
}

impl KeyType {
    pub fn code(&self) -> i32 {
        match self {
            KeyType::Dh => 1,
            KeyType::Dsa => 2,
            KeyType::Ec => 3,
            KeyType::Rsa => 4,
            KeyType::Ed25519 => 5,
            KeyType::Hmac => 6,
            KeyType::Cmac => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(KeyType::Dh),
            2 => Some(KeyType::Dsa),
            3 => Some(KeyType::Ec),
            4 => Some(KeyType::Rsa),
            5 => Some(KeyType::Ed25519),
            6 => Some(KeyType::Hmac),
            7 => Some(KeyType::Cmac),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyType::Dh => "DH",
            KeyType::Dsa => "DSA",
            KeyType::Ec => "EC",
            KeyType::Rsa => "RSA",
            KeyType::Ed25519 => "Ed25519",
            KeyType::Hmac => "HMAC",
            KeyType::Cmac => "CMAC",
        }
    }
}

/// The keying material itself.
#[derive(Clone)]
pub enum KeyData {
    DhPrivate(x25519_dalek::StaticSecret),
    DhPublic(x25519_dalek::PublicKey),
    DsaPrivate(dsa::SigningKey),
    DsaPublic(dsa::VerifyingKey),
    EcPrivate(p256::SecretKey),
    EcPublic(p256::PublicKey),
    RsaPrivate(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    Ed25519Private(ed25519_dalek::SigningKey),
    Ed25519Public(ed25519_dalek::VerifyingKey),
    Hmac(SecureBytes),
    Cmac(SecureBytes),
}

impl KeyData {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyData::DhPrivate(_) | KeyData::DhPublic(_) => KeyType::Dh,
            KeyData::DsaPrivate(_) | KeyData::DsaPublic(_) => KeyType::Dsa,
            KeyData::EcPrivate(_) | KeyData::EcPublic(_) => KeyType::Ec,
            KeyData::RsaPrivate(_) | KeyData::RsaPublic(_) => KeyType::Rsa,
            KeyData::Ed25519Private(_) | KeyData::Ed25519Public(_) => KeyType::Ed25519,
            KeyData::Hmac(_) => KeyType::Hmac,
            KeyData::Cmac(_) => KeyType::Cmac,
        }
    }

    pub fn is_private(&self) -> bool {
        match self {
            KeyData::DhPrivate(_)
            | KeyData::DsaPrivate(_)
            | KeyData::EcPrivate(_)
            | KeyData::RsaPrivate(_)
            | KeyData::Ed25519Private(_)
            | KeyData::Hmac(_)
            | KeyData::Cmac(_) => true,
            KeyData::DhPublic(_)
            | KeyData::DsaPublic(_)
            | KeyData::EcPublic(_)
            | KeyData::RsaPublic(_)
            | KeyData::Ed25519Public(_) => false,
        }
    }
}

/// A typed key with identity metadata.
#[derive(Clone)]
pub struct AsymmetricKey {
    meta: Metadata,
    data: KeyData,
}

impl AsymmetricKey {
    pub fn new(
        data: KeyData,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            meta: Metadata::new(name, description),
            data,
        }
    }

    /// Generate a fresh RSA private key. RSA has no domain parameters, so
    /// generation lives here rather than on [`crate::keys::Params`].
    pub fn generate_rsa(
        bits: usize,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
            .map_err(|e| CryptoError::Primitive(format!("RSA keygen: {e}")))?;
        Ok(Self::new(KeyData::RsaPrivate(key), name, description))
    }

    /// Derive an HMAC key by stretching a secret to the digest output size.
    pub fn hmac_key(
        secret: &[u8],
        salt: &[u8],
        digest: DigestKind,
        count: usize,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if secret.is_empty() || count == 0 {
            return Err(CryptoError::InvalidArgument(
                "HMAC key needs a secret and a count".into(),
            ));
        }
        let key = symmetric::stretch(digest.size(), secret, salt, digest, count);
        Ok(Self::new(KeyData::Hmac(key), name, description))
    }

    /// Derive a CMAC key of an AES key length.
    pub fn cmac_key(
        secret: &[u8],
        salt: &[u8],
        key_length: usize,
        digest: DigestKind,
        count: usize,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if secret.is_empty() || count == 0 {
            return Err(CryptoError::InvalidArgument(
                "CMAC key needs a secret and a count".into(),
            ));
        }
        if !matches!(key_length, 16 | 24 | 32) {
            return Err(CryptoError::InvalidArgument(format!(
                "CMAC key length must be an AES key length, got {key_length}"
            )));
        }
        let key = symmetric::stretch(key_length, secret, salt, digest, count);
        Ok(Self::new(KeyData::Cmac(key), name, description))
    }

    pub fn id(&self) -> &Id {
        &self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn description(&self) -> &str {
        &self.meta.description
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    pub fn data(&self) -> &KeyData {
        &self.data
    }

    pub fn key_type(&self) -> KeyType {
        self.data.key_type()
    }

    pub fn is_private(&self) -> bool {
        self.data.is_private()
    }

    /// Return the public half of this key (a fresh entity with its own id).
    /// Public keys return a copy of themselves; MAC keys have no public half.
    pub fn public_key(&self) -> Result<Self> {
        let data = match &self.data {
            KeyData::DhPrivate(secret) => {
                KeyData::DhPublic(x25519_dalek::PublicKey::from(secret))
            }
            KeyData::DsaPrivate(key) => KeyData::DsaPublic(key.verifying_key().clone()),
            KeyData::EcPrivate(key) => KeyData::EcPublic(key.public_key()),
            KeyData::RsaPrivate(key) => KeyData::RsaPublic(key.to_public_key()),
            KeyData::Ed25519Private(key) => KeyData::Ed25519Public(key.verifying_key()),
            KeyData::DhPublic(_)
            | KeyData::DsaPublic(_)
            | KeyData::EcPublic(_)
            | KeyData::RsaPublic(_)
            | KeyData::Ed25519Public(_) => self.data.clone(),
            KeyData::Hmac(_) | KeyData::Cmac(_) => {
                return Err(CryptoError::KeyTypeMismatch(
                    "MAC keys have no public half".into(),
                ))
            }
        };
        Ok(Self::new(data, self.meta.name.clone(), self.meta.description.clone()))
    }

    fn type_tag(&self) -> &'static str {
        match self.data.key_type() {
            KeyType::Ed25519 => TYPE_TAG_ED25519,
            KeyType::Dh => TYPE_TAG_X25519,
            _ => TYPE_TAG,
        }
    }

    /// PEM payload for the PKCS#8-backed families, raw secret for MAC keys.
    fn payload(&self) -> Result<SecureBytes> {
        let pem_err = |e: pkcs8::Error| CryptoError::Primitive(format!("PEM encode: {e}"));
        let spki_err = |e: pkcs8::spki::Error| CryptoError::Primitive(format!("PEM encode: {e}"));
        match &self.data {
            KeyData::DsaPrivate(key) => Ok(SecureBytes::from_slice(
                key.to_pkcs8_pem(LineEnding::LF).map_err(pem_err)?.as_bytes(),
            )),
            KeyData::DsaPublic(key) => Ok(SecureBytes::from_slice(
                key.to_public_key_pem(LineEnding::LF).map_err(spki_err)?.as_bytes(),
            )),
            KeyData::EcPrivate(key) => Ok(SecureBytes::from_slice(
                key.to_pkcs8_pem(LineEnding::LF).map_err(pem_err)?.as_bytes(),
            )),
            KeyData::EcPublic(key) => Ok(SecureBytes::from_slice(
                key.to_public_key_pem(LineEnding::LF).map_err(spki_err)?.as_bytes(),
            )),
            KeyData::RsaPrivate(key) => Ok(SecureBytes::from_slice(
                key.to_pkcs8_pem(LineEnding::LF).map_err(pem_err)?.as_bytes(),
            )),
            KeyData::RsaPublic(key) => Ok(SecureBytes::from_slice(
                key.to_public_key_pem(LineEnding::LF).map_err(spki_err)?.as_bytes(),
            )),
            KeyData::Hmac(key) | KeyData::Cmac(key) => Ok(key.clone()),
            KeyData::DhPrivate(_)
            | KeyData::DhPublic(_)
            | KeyData::Ed25519Private(_)
            | KeyData::Ed25519Public(_) => Err(CryptoError::Internal(
                "Curve25519 keys serialize as raw bytes, not payloads".into(),
            )),
        }
    }

    pub fn serialized_size(&self) -> Result<usize> {
        let body = match &self.data {
            KeyData::Ed25519Private(_) => 1 + 64,
            KeyData::Ed25519Public(_) => 1 + 32,
            KeyData::DhPrivate(_) | KeyData::DhPublic(_) => 1 + 32,
            _ => 1 + 4 + serial::bytes_size(self.payload()?.as_bytes()),
        };
        Ok(serial::header_size(self.type_tag(), &self.meta) + body)
    }

    pub fn serialize(&self, enc: &mut Encoder) -> Result<()> {
        serial::write_header(enc, self.type_tag(), &self.meta);
        enc.put_bool(self.is_private());
        match &self.data {
            KeyData::Ed25519Private(key) => enc.put_raw(&key.to_keypair_bytes()),
            KeyData::Ed25519Public(key) => enc.put_raw(key.as_bytes()),
            KeyData::DhPrivate(secret) => enc.put_raw(&secret.to_bytes()),
            KeyData::DhPublic(key) => enc.put_raw(key.as_bytes()),
            _ => {
                enc.put_i32(self.data.key_type().code());
                enc.put_bytes(self.payload()?.as_bytes());
            }
        }
        Ok(())
    }

    pub fn deserialize(dec: &mut Decoder<'_>) -> Result<Self> {
        let (tag, meta) = serial::read_header(dec)?;
        let is_private = dec.get_bool()?;
        let data = match tag.as_str() {
            TYPE_TAG_ED25519 => {
                if is_private {
                    let raw: [u8; 64] = dec.get_raw(64)?.try_into().map_err(|_| {
                        CryptoError::Internal("Ed25519 keypair slice length".into())
                    })?;
                    let key = ed25519_dalek::SigningKey::from_keypair_bytes(&raw)
                        .map_err(|e| CryptoError::Primitive(format!("Ed25519 key: {e}")))?;
                    KeyData::Ed25519Private(key)
                } else {
                    let raw: [u8; 32] = dec.get_raw(32)?.try_into().map_err(|_| {
                        CryptoError::Internal("Ed25519 public slice length".into())
                    })?;
                    let key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
                        .map_err(|e| CryptoError::Primitive(format!("Ed25519 key: {e}")))?;
                    KeyData::Ed25519Public(key)
                }
            }
            TYPE_TAG_X25519 => {
                let raw: [u8; 32] = dec.get_raw(32)?.try_into().map_err(|_| {
                    CryptoError::Internal("X25519 key slice length".into())
                })?;
                if is_private {
                    KeyData::DhPrivate(x25519_dalek::StaticSecret::from(raw))
                } else {
                    KeyData::DhPublic(x25519_dalek::PublicKey::from(raw))
                }
            }
            TYPE_TAG => {
                let code = dec.get_i32()?;
                let key_type = KeyType::from_code(code).ok_or_else(|| {
                    CryptoError::InvalidArgument(format!("Unknown key type code {code}"))
                })?;
                let payload = dec.get_bytes()?;
                Self::decode_payload(key_type, is_private, payload)?
            }
            other => {
                return Err(CryptoError::InvalidArgument(format!(
                    "Unknown key type tag {other:?}"
                )))
            }
        };
        Ok(Self { meta, data })
    }

    fn decode_payload(key_type: KeyType, is_private: bool, payload: &[u8]) -> Result<KeyData> {
        let pem = || {
            std::str::from_utf8(payload)
                .map_err(|_| CryptoError::InvalidArgument("PEM payload is not UTF-8".into()))
        };
        let pem_err = |e: pkcs8::Error| CryptoError::Primitive(format!("PEM decode: {e}"));
        let spki_err = |e: pkcs8::spki::Error| CryptoError::Primitive(format!("PEM decode: {e}"));
        match (key_type, is_private) {
            (KeyType::Dsa, true) => Ok(KeyData::DsaPrivate(
                dsa::SigningKey::from_pkcs8_pem(pem()?).map_err(pem_err)?,
            )),
            (KeyType::Dsa, false) => Ok(KeyData::DsaPublic(
                dsa::VerifyingKey::from_public_key_pem(pem()?).map_err(spki_err)?,
            )),
            (KeyType::Ec, true) => Ok(KeyData::EcPrivate(
                p256::SecretKey::from_pkcs8_pem(pem()?).map_err(pem_err)?,
            )),
            (KeyType::Ec, false) => Ok(KeyData::EcPublic(
                p256::PublicKey::from_public_key_pem(pem()?).map_err(spki_err)?,
            )),
            (KeyType::Rsa, true) => Ok(KeyData::RsaPrivate(
                rsa::RsaPrivateKey::from_pkcs8_pem(pem()?).map_err(pem_err)?,
            )),
            (KeyType::Rsa, false) => Ok(KeyData::RsaPublic(
                rsa::RsaPublicKey::from_public_key_pem(pem()?).map_err(spki_err)?,
            )),
            (KeyType::Hmac, true) => Ok(KeyData::Hmac(SecureBytes::from_slice(payload))),
            (KeyType::Cmac, true) => Ok(KeyData::Cmac(SecureBytes::from_slice(payload))),
            _ => Err(CryptoError::InvalidArgument(format!(
                "Unsupported serialized key: {} private={is_private}",
                key_type.name()
            ))),
        }
    }
}

impl std::fmt::Debug for AsymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsymmetricKey")
            .field("id", self.id())
            .field("type", &self.key_type())
            .field("private", &self.is_private())
            .finish()
    }
}
