/// Symmetric key material.
///
/// Keys come from caller-supplied bytes, a random draw, or a deterministic
/// digest stretch of a secret and salt. The stretch chains digest blocks:
/// each output block is `digest(previous_block || secret || salt)` re-digested
/// `count` times, blocks concatenated until the requested length is reached.
use zeroize::Zeroize;

use rand::RngCore;

use crate::digest::{DigestKind, MessageDigest};
use crate::error::{CryptoError, Result};
use crate::id::Id;
use crate::secure::SecureBytes;
use crate::serial::{self, Decoder, Encoder, Metadata};

/// Minimum number of random bytes fed into the stretch by `from_random`.
pub const MIN_RANDOM_LENGTH: usize = 256;

/// Default digest for key stretching.
pub const DEFAULT_DIGEST: DigestKind = DigestKind::Sha2_256;

/// Default stretch iteration count.
pub const DEFAULT_COUNT: usize = 1;

pub(crate) const TYPE_TAG: &str = "SymmetricKey";

/// Deterministic digest stretch of `secret` (and optional `salt`) into
/// `key_length` bytes.
pub(crate) fn stretch(
    key_length: usize,
    secret: &[u8],
    salt: &[u8],
    md: DigestKind,
    count: usize,
) -> SecureBytes {
    let mut key = SecureBytes::zeroed(key_length);
    let mut written = 0;
    let mut block: Vec<u8> = Vec::new();
    let mut digest = MessageDigest::new(md);
    while written < key_length {
        digest.update(&block);
        digest.update(secret);
        digest.update(salt);
        let mut next = digest.finalize_reset();
        for _ in 1..count {
            digest.update(&next);
            let rehashed = digest.finalize_reset();
            next.zeroize();
            next = rehashed;
        }
        block.zeroize();
        block = next;
        let take = block.len().min(key_length - written);
        key.as_mut_bytes()[written..written + take].copy_from_slice(&block[..take]);
        written += take;
    }
    block.zeroize();
    key
}

/// A contiguous secret byte buffer consumed by ciphers and MACs.
#[derive(Clone)]
pub struct SymmetricKey {
    meta: Metadata,
    key: SecureBytes,
}

impl SymmetricKey {
    /// Wrap caller-supplied key bytes.
    pub fn new(
        key: &[u8],
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "Symmetric key must not be empty".into(),
            ));
        }
        Ok(Self {
            meta: Metadata::new(name, description),
            key: SecureBytes::from_slice(key),
        })
    }

    /// Wrap caller-supplied key bytes under a caller-chosen id. Reissuing an
    /// id for different key material is the caller's bug to avoid.
    pub fn with_id(
        id: Id,
        key: &[u8],
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "Symmetric key must not be empty".into(),
            ));
        }
        Ok(Self {
            meta: Metadata::with_id(id, name, description),
            key: SecureBytes::from_slice(key),
        })
    }

    /// Derive a key by stretching a secret and salt. Deterministic: the same
    /// inputs produce the same key bytes on every run and platform.
    pub fn from_secret_and_salt(
        key_length: usize,
        secret: &[u8],
        salt: &[u8],
        md: DigestKind,
        count: usize,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if secret.is_empty() || key_length == 0 || count == 0 {
            return Err(CryptoError::InvalidArgument(
                "Key stretch needs a secret, a key length and a count".into(),
            ));
        }
        Ok(Self {
            meta: Metadata::new(name, description),
            key: stretch(key_length, secret, salt, md, count),
        })
    }

    /// Generate a key from a fresh random draw run through the stretch.
    pub fn from_random(key_length: usize) -> Result<Self> {
        Self::from_random_with(
            MIN_RANDOM_LENGTH,
            &[],
            key_length,
            DEFAULT_DIGEST,
            DEFAULT_COUNT,
            "",
            "",
        )
    }

    /// `from_random` with all knobs exposed. `random_length` is clamped up
    /// to [`MIN_RANDOM_LENGTH`].
    pub fn from_random_with(
        random_length: usize,
        salt: &[u8],
        key_length: usize,
        md: DigestKind,
        count: usize,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let random_length = random_length.max(MIN_RANDOM_LENGTH);
        let mut random = SecureBytes::zeroed(random_length);
        rand::rngs::OsRng.fill_bytes(random.as_mut_bytes());
        Self::from_secret_and_salt(
            key_length,
            random.as_bytes(),
            salt,
            md,
            count,
            name,
            description,
        )
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

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }

    pub fn serialized_size(&self) -> usize {
        serial::header_size(TYPE_TAG, &self.meta) + serial::bytes_size(self.key.as_bytes())
    }

    pub fn serialize(&self, enc: &mut Encoder) {
        serial::write_header(enc, TYPE_TAG, &self.meta);
        enc.put_bytes(self.key.as_bytes());
    }

    pub fn deserialize(dec: &mut Decoder<'_>) -> Result<Self> {
        let meta = serial::expect_header(dec, TYPE_TAG)?;
        let bytes = dec.get_bytes()?;
        if bytes.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "Serialized symmetric key is empty".into(),
            ));
        }
        Ok(Self {
            meta,
            key: SecureBytes::from_slice(bytes),
        })
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("id", self.id())
            .field("name", &self.meta.name)
            .field("len", &self.key.len())
            .finish()
    }
}
