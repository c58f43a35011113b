/// Authenticated framing encryption.
///
/// Two modes share one record layout (§ inner header | iv | ciphertext |
/// mac/tag):
/// - GCM: AEAD; associated data is authenticated, the tag comes from the
///   cipher itself.
/// - CBC: encrypt-then-MAC; an HMAC keyed off the symmetric key material
///   covers `iv || ciphertext`, never the plaintext. Associated data is
///   rejected in this mode.
///
/// Every encryption draws a fresh random IV. Authentication is always
/// checked before any plaintext is released.
pub mod frame;

use aes::{Aes128, Aes192, Aes256};
use cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use rand::RngCore;

use crate::digest::DigestKind;
use crate::error::{CryptoError, Result};
use crate::keys::{AsymmetricKey, SymmetricKey};
use crate::mac::Mac;
use crate::secure::SecureBytes;
use crate::serial::{Decoder, Encoder};

pub use frame::{CiphertextHeader, FrameHeader, CIPHERTEXT_HEADER_SIZE, FRAME_HEADER_SIZE};

type Aes192Gcm = AesGcm<Aes192, U12>;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes192CbcEnc = cbc::Encryptor<Aes192>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Largest IV any supported cipher uses.
pub const MAX_IV_LENGTH: usize = 16;
/// Largest block padding any supported cipher adds.
pub const MAX_BLOCK_LENGTH: usize = 16;
/// Largest MAC/tag any supported suite produces.
pub const MAX_MAC_LENGTH: usize = 64;
/// GCM authentication tag size.
pub const GCM_TAG_SIZE: usize = 16;

/// Upper bound on a single plaintext, fixed by the 32-bit ciphertext length
/// field in the record header.
pub const MAX_PLAINTEXT_LENGTH: usize = u32::MAX as usize
    - FRAME_HEADER_SIZE
    - CIPHERTEXT_HEADER_SIZE
    - MAX_IV_LENGTH
    - MAX_BLOCK_LENGTH
    - MAX_MAC_LENGTH;

/// The symmetric ciphers a suite may name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherKind {
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl CipherKind {
    pub const ALL: [CipherKind; 6] = [
        CipherKind::Aes256Gcm,
        CipherKind::Aes192Gcm,
        CipherKind::Aes128Gcm,
        CipherKind::Aes256Cbc,
        CipherKind::Aes192Cbc,
        CipherKind::Aes128Cbc,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "AES-128-GCM" => Some(CipherKind::Aes128Gcm),
            "AES-192-GCM" => Some(CipherKind::Aes192Gcm),
            "AES-256-GCM" => Some(CipherKind::Aes256Gcm),
            "AES-128-CBC" => Some(CipherKind::Aes128Cbc),
            "AES-192-CBC" => Some(CipherKind::Aes192Cbc),
            "AES-256-CBC" => Some(CipherKind::Aes256Cbc),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CipherKind::Aes128Gcm => "AES-128-GCM",
            CipherKind::Aes192Gcm => "AES-192-GCM",
            CipherKind::Aes256Gcm => "AES-256-GCM",
            CipherKind::Aes128Cbc => "AES-128-CBC",
            CipherKind::Aes192Cbc => "AES-192-CBC",
            CipherKind::Aes256Cbc => "AES-256-CBC",
        }
    }

    pub fn key_length(&self) -> usize {
        match self {
            CipherKind::Aes128Gcm | CipherKind::Aes128Cbc => 16,
            CipherKind::Aes192Gcm | CipherKind::Aes192Cbc => 24,
            CipherKind::Aes256Gcm | CipherKind::Aes256Cbc => 32,
        }
    }

    pub fn iv_length(&self) -> usize {
        match self {
            CipherKind::Aes128Gcm | CipherKind::Aes192Gcm | CipherKind::Aes256Gcm => 12,
            CipherKind::Aes128Cbc | CipherKind::Aes192Cbc | CipherKind::Aes256Cbc => 16,
        }
    }

    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            CipherKind::Aes128Gcm | CipherKind::Aes192Gcm | CipherKind::Aes256Gcm
        )
    }
}

/// Usage counters for one direction of a cipher. Advisory, not persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    use_count: u64,
    min_byte_count: usize,
    max_byte_count: usize,
    total_byte_count: u64,
}

impl Stats {
    fn update(&mut self, byte_count: usize) {
        if self.use_count == 0 {
            self.min_byte_count = byte_count;
            self.max_byte_count = byte_count;
        } else {
            self.min_byte_count = self.min_byte_count.min(byte_count);
            self.max_byte_count = self.max_byte_count.max(byte_count);
        }
        self.use_count += 1;
        self.total_byte_count += byte_count as u64;
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn min_byte_count(&self) -> usize {
        self.min_byte_count
    }

    pub fn max_byte_count(&self) -> usize {
        self.max_byte_count
    }

    pub fn total_byte_count(&self) -> u64 {
        self.total_byte_count
    }
}

/// Worst-case encoded size for a framed record over `plaintext_length` bytes.
pub fn max_buffer_length(plaintext_length: usize) -> usize {
    FRAME_HEADER_SIZE
        + CIPHERTEXT_HEADER_SIZE
        + MAX_IV_LENGTH
        + plaintext_length
        + MAX_BLOCK_LENGTH
        + MAX_MAC_LENGTH
}

/// Authenticated symmetric cipher bound to one key.
///
/// Not thread-safe: every operation mutates usage stats and, in CBC mode,
/// the MAC state. Wrap in external synchronization to share.
pub struct Cipher {
    key: SymmetricKey,
    kind: CipherKind,
    mac: Option<Mac>,
    encryptor_stats: Stats,
    decryptor_stats: Stats,
}

impl Cipher {
    /// Bind `key` to `kind`. In CBC mode the MAC key is derived from the
    /// symmetric key material with a single stretch pass of the suite digest.
    pub fn new(key: SymmetricKey, kind: CipherKind, digest: DigestKind) -> Result<Self> {
        if key.len() != kind.key_length() {
            return Err(CryptoError::InvalidArgument(format!(
                "{} needs a {}-byte key, got {}",
                kind.name(),
                kind.key_length(),
                key.len()
            )));
        }
        let mac = if kind.is_aead() {
            None
        } else {
            let mac_key = AsymmetricKey::hmac_key(key.as_bytes(), &[], digest, 1, "", "")?;
            Some(Mac::new(&mac_key, digest)?)
        };
        Ok(Self {
            key,
            kind,
            mac,
            encryptor_stats: Stats::default(),
            decryptor_stats: Stats::default(),
        })
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    pub fn encryptor_stats(&self) -> &Stats {
        &self.encryptor_stats
    }

    pub fn decryptor_stats(&self) -> &Stats {
        &self.decryptor_stats
    }

    fn check_args(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<()> {
        if plaintext.is_empty() {
            return Err(CryptoError::InvalidArgument("Plaintext must not be empty".into()));
        }
        if plaintext.len() > MAX_PLAINTEXT_LENGTH {
            return Err(CryptoError::InvalidArgument(format!(
                "Plaintext length {} exceeds the maximum {}",
                plaintext.len(),
                MAX_PLAINTEXT_LENGTH
            )));
        }
        self.check_associated_data(associated_data)
    }

    fn check_associated_data(&self, associated_data: &[u8]) -> Result<()> {
        if !associated_data.is_empty() && !self.kind.is_aead() {
            return Err(CryptoError::InvalidArgument(format!(
                "{} cannot authenticate associated data",
                self.kind.name()
            )));
        }
        Ok(())
    }

    fn raw_encrypt(
        &self,
        iv: &[u8],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let key = self.key.as_bytes();
        let init_err = |_| CryptoError::Internal("Cipher key length drifted".into());
        let enc_err = |_| CryptoError::Primitive("AEAD encryption failed".into());
        match self.kind {
            CipherKind::Aes128Gcm => {
                let cipher = Aes128Gcm::new_from_slice(key).map_err(init_err)?;
                let mut out = cipher
                    .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad: associated_data })
                    .map_err(enc_err)?;
                let tag = out.split_off(out.len() - GCM_TAG_SIZE);
                Ok((out, Some(tag)))
            }
            CipherKind::Aes192Gcm => {
                let cipher = Aes192Gcm::new_from_slice(key).map_err(init_err)?;
                let mut out = cipher
                    .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad: associated_data })
                    .map_err(enc_err)?;
                let tag = out.split_off(out.len() - GCM_TAG_SIZE);
                Ok((out, Some(tag)))
            }
            CipherKind::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key).map_err(init_err)?;
                let mut out = cipher
                    .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad: associated_data })
                    .map_err(enc_err)?;
                let tag = out.split_off(out.len() - GCM_TAG_SIZE);
                Ok((out, Some(tag)))
            }
            CipherKind::Aes128Cbc => {
                let enc = Aes128CbcEnc::new_from_slices(key, iv).map_err(init_err)?;
                Ok((enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext), None))
            }
            CipherKind::Aes192Cbc => {
                let enc = Aes192CbcEnc::new_from_slices(key, iv).map_err(init_err)?;
                Ok((enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext), None))
            }
            CipherKind::Aes256Cbc => {
                let enc = Aes256CbcEnc::new_from_slices(key, iv).map_err(init_err)?;
                Ok((enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext), None))
            }
        }
    }

    fn raw_decrypt(
        &self,
        iv: &[u8],
        ciphertext_and_tag: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let key = self.key.as_bytes();
        let init_err = |_| CryptoError::Internal("Cipher key length drifted".into());
        match self.kind {
            CipherKind::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(init_err)?
                .decrypt(
                    Nonce::from_slice(iv),
                    Payload { msg: ciphertext_and_tag, aad: associated_data },
                )
                .map_err(|_| CryptoError::AuthenticationFailed),
            CipherKind::Aes192Gcm => Aes192Gcm::new_from_slice(key)
                .map_err(init_err)?
                .decrypt(
                    Nonce::from_slice(iv),
                    Payload { msg: ciphertext_and_tag, aad: associated_data },
                )
                .map_err(|_| CryptoError::AuthenticationFailed),
            CipherKind::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(init_err)?
                .decrypt(
                    Nonce::from_slice(iv),
                    Payload { msg: ciphertext_and_tag, aad: associated_data },
                )
                .map_err(|_| CryptoError::AuthenticationFailed),
            CipherKind::Aes128Cbc => Aes128CbcDec::new_from_slices(key, iv)
                .map_err(init_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext_and_tag)
                .map_err(|_| CryptoError::InvalidCiphertext("Bad block padding".into())),
            CipherKind::Aes192Cbc => Aes192CbcDec::new_from_slices(key, iv)
                .map_err(init_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext_and_tag)
                .map_err(|_| CryptoError::InvalidCiphertext("Bad block padding".into())),
            CipherKind::Aes256Cbc => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(init_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext_and_tag)
                .map_err(|_| CryptoError::InvalidCiphertext("Bad block padding".into())),
        }
    }

    /// Encrypt and authenticate, producing `[header | iv | ciphertext | mac]`.
    pub fn encrypt(&mut self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>> {
        self.check_args(plaintext, associated_data)?;

        let iv_length = self.kind.iv_length();
        let mut iv = vec![0u8; iv_length];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let (ciphertext, tag) = self.raw_encrypt(&iv, plaintext, associated_data)?;

        let mut record =
            Vec::with_capacity(CIPHERTEXT_HEADER_SIZE + iv_length + ciphertext.len() + MAX_MAC_LENGTH);
        record.extend_from_slice(&[0u8; CIPHERTEXT_HEADER_SIZE]);
        record.extend_from_slice(&iv);
        record.extend_from_slice(&ciphertext);

        let mac_bytes = match (&mut self.mac, tag) {
            (None, Some(tag)) => tag,
            (Some(mac), None) => mac.sign_buffer(&record[CIPHERTEXT_HEADER_SIZE..])?,
            _ => return Err(CryptoError::Internal("Cipher mode/MAC state desync".into())),
        };
        record.extend_from_slice(&mac_bytes);

        let header = CiphertextHeader {
            iv_length: iv_length as u16,
            ciphertext_length: ciphertext.len() as u32,
            mac_length: mac_bytes.len() as u16,
        };
        let mut enc = Encoder::with_capacity(CIPHERTEXT_HEADER_SIZE);
        header.encode(&mut enc);
        record[..CIPHERTEXT_HEADER_SIZE].copy_from_slice(&enc.into_bytes());

        self.encryptor_stats.update(plaintext.len());
        Ok(record)
    }

    /// [`Cipher::encrypt`] plus the outer frame header carrying the key id.
    pub fn encrypt_and_frame(
        &mut self,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let record = self.encrypt(plaintext, associated_data)?;
        let mut framed = Vec::with_capacity(FRAME_HEADER_SIZE + record.len());
        let mut enc = Encoder::with_capacity(FRAME_HEADER_SIZE);
        FrameHeader {
            key_id: *self.key.id(),
            payload_length: record.len() as u32,
        }
        .encode(&mut enc);
        framed.extend_from_slice(&enc.into_bytes());
        framed.extend_from_slice(&record);
        Ok(framed)
    }

    fn decrypt_impl(&mut self, record: &[u8], associated_data: &[u8]) -> Result<Vec<u8>> {
        if record.is_empty() {
            return Err(CryptoError::InvalidArgument("Ciphertext record is empty".into()));
        }
        self.check_associated_data(associated_data)?;

        let mut dec = Decoder::new(record);
        let header = CiphertextHeader::decode(&mut dec)?;
        let iv_length = header.iv_length as usize;
        let ciphertext_length = header.ciphertext_length as usize;
        let mac_length = header.mac_length as usize;
        if iv_length > MAX_IV_LENGTH || mac_length > MAX_MAC_LENGTH {
            return Err(CryptoError::InvalidCiphertext(
                "Header field exceeds implementation limits".into(),
            ));
        }
        if dec.remaining() != header.total_length() {
            return Err(CryptoError::InvalidCiphertext(format!(
                "Header promises {} payload bytes, record carries {}",
                header.total_length(),
                dec.remaining()
            )));
        }
        if iv_length != self.kind.iv_length() {
            return Err(CryptoError::InvalidCiphertext(format!(
                "IV length {} does not fit {}",
                iv_length,
                self.kind.name()
            )));
        }

        let body = &record[CIPHERTEXT_HEADER_SIZE..];
        let iv = &body[..iv_length];
        if let Some(mac) = self.mac.as_mut() {
            // Encrypt-then-MAC: check before touching the ciphertext.
            let iv_and_ciphertext = &body[..iv_length + ciphertext_length];
            let tag = &body[iv_length + ciphertext_length..];
            if !mac.verify_buffer_signature(iv_and_ciphertext, tag)? {
                return Err(CryptoError::AuthenticationFailed);
            }
        } else if mac_length != GCM_TAG_SIZE {
            return Err(CryptoError::InvalidCiphertext(format!(
                "Tag length {mac_length} does not fit {}",
                self.kind.name()
            )));
        }
        let plaintext = if self.mac.is_some() {
            self.raw_decrypt(iv, &body[iv_length..iv_length + ciphertext_length], &[])?
        } else {
            // Ciphertext and tag are contiguous; the AEAD verifies the tag
            // before releasing plaintext.
            self.raw_decrypt(iv, &body[iv_length..], associated_data)?
        };

        self.decryptor_stats.update(plaintext.len());
        Ok(plaintext)
    }

    /// Authenticate and decrypt a record produced by [`Cipher::encrypt`].
    pub fn decrypt(&mut self, record: &[u8], associated_data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_impl(record, associated_data)
    }

    /// [`Cipher::decrypt`] into a zeroize-on-drop buffer.
    pub fn decrypt_secure(
        &mut self,
        record: &[u8],
        associated_data: &[u8],
    ) -> Result<SecureBytes> {
        Ok(SecureBytes::new(self.decrypt_impl(record, associated_data)?))
    }

    /// Strip and validate the outer frame header, then decrypt.
    pub fn decrypt_frame(&mut self, framed: &[u8], associated_data: &[u8]) -> Result<Vec<u8>> {
        let mut dec = Decoder::new(framed);
        let header = FrameHeader::decode(&mut dec)?;
        if header.key_id != *self.key.id() {
            return Err(CryptoError::InvalidCiphertext(
                "Record was framed under a different key".into(),
            ));
        }
        if dec.remaining() != header.payload_length as usize {
            return Err(CryptoError::InvalidCiphertext(format!(
                "Frame promises {} payload bytes, record carries {}",
                header.payload_length,
                dec.remaining()
            )));
        }
        self.decrypt_impl(&framed[FRAME_HEADER_SIZE..], associated_data)
    }
}
