/// Framing headers for encrypted records.
///
/// Inner 8-byte header: iv length (u16) | ciphertext length (u32) |
/// mac length (u16). Outer 36-byte header: key id (32) | payload length
/// (u32). Both big-endian.
use crate::error::{CryptoError, Result};
use crate::id::{Id, ID_SIZE};
use crate::serial::{Decoder, Encoder};

/// Size of the serialized [`CiphertextHeader`].
pub const CIPHERTEXT_HEADER_SIZE: usize = 8;

/// Size of the serialized [`FrameHeader`].
pub const FRAME_HEADER_SIZE: usize = ID_SIZE + 4;

/// Lengths of the three variable sections of an encrypted record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CiphertextHeader {
    pub iv_length: u16,
    pub ciphertext_length: u32,
    pub mac_length: u16,
}

impl CiphertextHeader {
    /// Combined length of iv, ciphertext and mac.
    pub fn total_length(&self) -> usize {
        self.iv_length as usize + self.ciphertext_length as usize + self.mac_length as usize
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.put_u16(self.iv_length);
        enc.put_u32(self.ciphertext_length);
        enc.put_u16(self.mac_length);
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            iv_length: dec.get_u16().map_err(truncated)?,
            ciphertext_length: dec.get_u32().map_err(truncated)?,
            mac_length: dec.get_u16().map_err(truncated)?,
        })
    }
}

/// Outer envelope identifying which key produced a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub key_id: Id,
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.put_id(&self.key_id);
        enc.put_u32(self.payload_length);
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            key_id: dec.get_id().map_err(truncated)?,
            payload_length: dec.get_u32().map_err(truncated)?,
        })
    }
}

fn truncated(_: CryptoError) -> CryptoError {
    CryptoError::InvalidCiphertext("Record too short for its header".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ciphertext_header_roundtrip() {
        let header = CiphertextHeader {
            iv_length: 12,
            ciphertext_length: 5,
            mac_length: 16,
        };
        let mut enc = Encoder::new();
        header.encode(&mut enc);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), CIPHERTEXT_HEADER_SIZE);

        let parsed = CiphertextHeader::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.total_length(), 33);
    }

    #[test]
    fn test_ciphertext_header_layout() {
        let header = CiphertextHeader {
            iv_length: 0x0102,
            ciphertext_length: 0x03040506,
            mac_length: 0x0708,
        };
        let mut enc = Encoder::new();
        header.encode(&mut enc);
        assert_eq!(enc.into_bytes(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_frame_header_roundtrip() {
        let header = FrameHeader {
            key_id: Id::from_bytes(b"frame key"),
            payload_length: 41,
        };
        let mut enc = Encoder::new();
        header.encode(&mut enc);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), FRAME_HEADER_SIZE);

        let parsed = FrameHeader::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_truncated_header() {
        assert!(CiphertextHeader::decode(&mut Decoder::new(&[0, 12])).is_err());
        assert!(FrameHeader::decode(&mut Decoder::new(&[0u8; 10])).is_err());
    }
}
