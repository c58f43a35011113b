/// Streaming message digest over the SHA-2 family.
///
/// One instance is reusable: `finalize_reset` returns the digest and rewinds
/// the state for the next message.
use sha2::{Digest, Sha256, Sha384, Sha512};

/// The digest algorithms a cipher suite may name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestKind {
    Sha2_256,
    Sha2_384,
    Sha2_512,
}

impl DigestKind {
    pub const ALL: [DigestKind; 3] = [
        DigestKind::Sha2_256,
        DigestKind::Sha2_384,
        DigestKind::Sha2_512,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SHA2-256" => Some(DigestKind::Sha2_256),
            "SHA2-384" => Some(DigestKind::Sha2_384),
            "SHA2-512" => Some(DigestKind::Sha2_512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DigestKind::Sha2_256 => "SHA2-256",
            DigestKind::Sha2_384 => "SHA2-384",
            DigestKind::Sha2_512 => "SHA2-512",
        }
    }

    /// Digest output length in bytes.
    pub fn size(&self) -> usize {
        match self {
            DigestKind::Sha2_256 => 32,
            DigestKind::Sha2_384 => 48,
            DigestKind::Sha2_512 => 64,
        }
    }
}

enum State {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// Incremental hash computation for one of the suite digests.
pub struct MessageDigest {
    kind: DigestKind,
    state: State,
}

impl MessageDigest {
    pub fn new(kind: DigestKind) -> Self {
        let state = match kind {
            DigestKind::Sha2_256 => State::Sha256(Sha256::new()),
            DigestKind::Sha2_384 => State::Sha384(Sha384::new()),
            DigestKind::Sha2_512 => State::Sha512(Sha512::new()),
        };
        Self { kind, state }
    }

    pub fn kind(&self) -> DigestKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.kind.size()
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Sha256(h) => h.update(data),
            State::Sha384(h) => h.update(data),
            State::Sha512(h) => h.update(data),
        }
    }

    /// Produce the digest and reset the state for the next message.
    pub fn finalize_reset(&mut self) -> Vec<u8> {
        match &mut self.state {
            State::Sha256(h) => h.finalize_reset().to_vec(),
            State::Sha384(h) => h.finalize_reset().to_vec(),
            State::Sha512(h) => h.finalize_reset().to_vec(),
        }
    }

    /// One-shot convenience.
    pub fn digest(kind: DigestKind, data: &[u8]) -> Vec<u8> {
        let mut md = MessageDigest::new(kind);
        md.update(data);
        md.finalize_reset()
    }
}
