/// Length-prefixed, big-endian binary codec.
///
/// Layout rules: integers are network byte order, `bool` is a single byte,
/// strings and byte payloads are a `u32` length followed by the raw bytes.
/// Every persisted entity starts with a type tag string plus its id, name
/// and description.
use crate::error::{CryptoError, Result};
use crate::id::{Id, ID_SIZE};

/// Serialized size of a length-prefixed string or byte payload.
pub fn string_size(s: &str) -> usize {
    4 + s.len()
}

/// Serialized size of a length-prefixed byte payload.
pub fn bytes_size(b: &[u8]) -> usize {
    4 + b.len()
}

/// Growable big-endian encoder.
///
/// Callers that serialize secrets should preallocate the exact size so the
/// backing storage never reallocates and leaves stale copies behind.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_string(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    pub fn put_id(&mut self, id: &Id) {
        self.buf.extend_from_slice(id.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Positional big-endian decoder over a borrowed buffer.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(CryptoError::InvalidArgument(format!(
                "Truncated buffer: need {} bytes, {} remain",
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(CryptoError::InvalidArgument(format!(
                "Invalid bool encoding: {v}"
            ))),
        }
    }

    pub fn get_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn get_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    pub fn get_string(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CryptoError::InvalidArgument("Invalid UTF-8 in string".into()))
    }

    pub fn get_id(&mut self) -> Result<Id> {
        let bytes = self.take(ID_SIZE)?;
        let arr: [u8; ID_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::Internal("Id slice length mismatch".into())
        })?;
        Ok(Id(arr))
    }
}

/// Id, name and description shared by every persisted entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub id: Id,
    pub name: String,
    pub description: String,
}

impl Metadata {
    /// Fresh metadata under a random id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Id::random(),
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn with_id(id: Id, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn serialized_size(&self) -> usize {
        ID_SIZE + string_size(&self.name) + string_size(&self.description)
    }

    pub fn serialize(&self, enc: &mut Encoder) {
        enc.put_id(&self.id);
        enc.put_string(&self.name);
        enc.put_string(&self.description);
    }

    pub fn deserialize(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            id: dec.get_id()?,
            name: dec.get_string()?,
            description: dec.get_string()?,
        })
    }
}

/// Serialized size of an entity header (type tag + metadata).
pub fn header_size(type_tag: &str, meta: &Metadata) -> usize {
    string_size(type_tag) + meta.serialized_size()
}

/// Write an entity header: type tag, then id/name/description.
pub fn write_header(enc: &mut Encoder, type_tag: &str, meta: &Metadata) {
    enc.put_string(type_tag);
    meta.serialize(enc);
}

/// Read an entity header, returning the type tag and metadata.
pub fn read_header(dec: &mut Decoder<'_>) -> Result<(String, Metadata)> {
    let tag = dec.get_string()?;
    let meta = Metadata::deserialize(dec)?;
    Ok((tag, meta))
}

/// Read an entity header and require one specific type tag.
pub fn expect_header(dec: &mut Decoder<'_>, type_tag: &str) -> Result<Metadata> {
    let (tag, meta) = read_header(dec)?;
    if tag != type_tag {
        return Err(CryptoError::InvalidArgument(format!(
            "Expected type tag {type_tag:?}, found {tag:?}"
        )));
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut enc = Encoder::new();
        enc.put_u8(0xAB);
        enc.put_u16(0x1234);
        enc.put_u32(0xDEADBEEF);
        enc.put_i32(-42);
        enc.put_bool(true);
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_u8().unwrap(), 0xAB);
        assert_eq!(dec.get_u16().unwrap(), 0x1234);
        assert_eq!(dec.get_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(dec.get_i32().unwrap(), -42);
        assert!(dec.get_bool().unwrap());
        assert!(dec.is_empty());
    }

    #[test]
    fn test_big_endian_layout() {
        let mut enc = Encoder::new();
        enc.put_u32(1);
        assert_eq!(enc.into_bytes(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_string_roundtrip() {
        let mut enc = Encoder::new();
        enc.put_string("keyring");
        enc.put_string("");
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.get_string().unwrap(), "keyring");
        assert_eq!(dec.get_string().unwrap(), "");
    }

    #[test]
    fn test_truncated_buffer() {
        let mut dec = Decoder::new(&[0, 0, 0, 10, b'a']);
        assert!(dec.get_string().is_err());
    }

    #[test]
    fn test_invalid_bool() {
        let mut dec = Decoder::new(&[2]);
        assert!(dec.get_bool().is_err());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = Metadata::new("master", "test key");
        let mut enc = Encoder::with_capacity(header_size("SymmetricKey", &meta));
        write_header(&mut enc, "SymmetricKey", &meta);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), header_size("SymmetricKey", &meta));

        let mut dec = Decoder::new(&bytes);
        let parsed = expect_header(&mut dec, "SymmetricKey").unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_wrong_type_tag() {
        let meta = Metadata::new("", "");
        let mut enc = Encoder::new();
        write_header(&mut enc, "AsymmetricKey", &meta);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(expect_header(&mut dec, "SymmetricKey").is_err());
    }
}
