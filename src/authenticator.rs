/// Sign-or-verify façade over the signer adapters.
///
/// An instance is fixed to one operation and one key. File variants stream
/// 4-KiB blocks through the underlying digest, so arbitrarily large inputs
/// never land in memory at once.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::digest::DigestKind;
use crate::error::{CryptoError, Result};
use crate::keys::AsymmetricKey;
use crate::signer::{Signer, Verifier};

const FILE_BLOCK_SIZE: usize = 4096;

/// The operation an authenticator was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Sign,
    Verify,
}

enum Inner {
    Sign(Signer),
    Verify(Verifier),
}

pub struct Authenticator {
    op: Op,
    inner: Inner,
}

impl Authenticator {
    pub fn new(op: Op, key: &AsymmetricKey, digest: DigestKind) -> Result<Self> {
        let inner = match op {
            Op::Sign => Inner::Sign(Signer::new(key, digest)?),
            Op::Verify => Inner::Verify(Verifier::new(key, digest)?),
        };
        Ok(Self { op, inner })
    }

    pub fn op(&self) -> Op {
        self.op
    }

    fn signer(&mut self) -> Result<&mut Signer> {
        match &mut self.inner {
            Inner::Sign(signer) => Ok(signer),
            Inner::Verify(_) => Err(CryptoError::InvalidArgument(
                "Authenticator was constructed for verification".into(),
            )),
        }
    }

    fn verifier(&mut self) -> Result<&mut Verifier> {
        match &mut self.inner {
            Inner::Verify(verifier) => Ok(verifier),
            Inner::Sign(_) => Err(CryptoError::InvalidArgument(
                "Authenticator was constructed for signing".into(),
            )),
        }
    }

    pub fn sign_buffer(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.signer()?.sign_buffer(data)
    }

    pub fn verify_buffer_signature(&mut self, data: &[u8], signature: &[u8]) -> Result<bool> {
        self.verifier()?.verify_buffer_signature(data, signature)
    }

    /// Sign a file's contents, streaming 4-KiB blocks.
    pub fn sign_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let signer = self.signer()?;
        let mut block = [0u8; FILE_BLOCK_SIZE];
        loop {
            let count = file.read(&mut block)?;
            if count == 0 {
                break;
            }
            signer.update(&block[..count]);
        }
        signer.finalize()
    }

    /// Verify a detached signature over a file's contents.
    pub fn verify_file_signature(
        &mut self,
        path: impl AsRef<Path>,
        signature: &[u8],
    ) -> Result<bool> {
        let mut file = File::open(path)?;
        let verifier = self.verifier()?;
        let mut block = [0u8; FILE_BLOCK_SIZE];
        loop {
            let count = file.read(&mut block)?;
            if count == 0 {
                break;
            }
            verifier.update(&block[..count]);
        }
        verifier.finalize_verify(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyData;
    use rand::rngs::OsRng;
    use std::io::Write;

    fn ed25519_key() -> AsymmetricKey {
        AsymmetricKey::new(
            KeyData::Ed25519Private(ed25519_dalek::SigningKey::generate(&mut OsRng)),
            "signer",
            "",
        )
    }

    #[test]
    fn test_buffer_sign_verify() {
        let key = ed25519_key();
        let mut signer = Authenticator::new(Op::Sign, &key, DigestKind::Sha2_256).unwrap();
        let sig = signer.sign_buffer(b"payload").unwrap();

        let mut verifier = Authenticator::new(Op::Verify, &key, DigestKind::Sha2_256).unwrap();
        assert!(verifier.verify_buffer_signature(b"payload", &sig).unwrap());
        assert!(!verifier.verify_buffer_signature(b"payloaf", &sig).unwrap());
    }

    #[test]
    fn test_op_mismatch() {
        let key = ed25519_key();
        let mut signer = Authenticator::new(Op::Sign, &key, DigestKind::Sha2_256).unwrap();
        assert!(signer.verify_buffer_signature(b"x", b"y").is_err());

        let mut verifier = Authenticator::new(Op::Verify, &key, DigestKind::Sha2_256).unwrap();
        assert!(verifier.sign_buffer(b"x").is_err());
    }

    #[test]
    fn test_file_sign_verify() {
        let key = ed25519_key();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // More than one 4-KiB block.
        let contents = vec![0x5A; 10_000];
        file.write_all(&contents).unwrap();

        let mut signer = Authenticator::new(Op::Sign, &key, DigestKind::Sha2_256).unwrap();
        let sig = signer.sign_file(file.path()).unwrap();

        let mut verifier = Authenticator::new(Op::Verify, &key, DigestKind::Sha2_256).unwrap();
        assert!(verifier.verify_file_signature(file.path(), &sig).unwrap());

        // File signature matches a buffer signature over the same bytes.
        let mut buffer_signer = Authenticator::new(Op::Sign, &key, DigestKind::Sha2_256).unwrap();
        let buffer_sig = buffer_signer.sign_buffer(&contents).unwrap();
        assert_eq!(sig, buffer_sig);
    }

    #[test]
    fn test_file_tamper_detected() {
        let key = ed25519_key();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"original contents").unwrap();

        let mut signer = Authenticator::new(Op::Sign, &key, DigestKind::Sha2_256).unwrap();
        let sig = signer.sign_file(file.path()).unwrap();

        file.write_all(b" plus tampering").unwrap();
        let mut verifier = Authenticator::new(Op::Verify, &key, DigestKind::Sha2_256).unwrap();
        assert!(!verifier.verify_file_signature(file.path(), &sig).unwrap());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let key = ed25519_key();
        let mut signer = Authenticator::new(Op::Sign, &key, DigestKind::Sha2_256).unwrap();
        assert!(matches!(
            signer.sign_file("/nonexistent/path"),
            Err(CryptoError::Io(_))
        ));
    }
}
