/// Cipher suites: a 4-tuple of algorithm tokens joined with `_`, e.g.
/// `ECDHE_ECDSA_AES-256-GCM_SHA2-512`.
///
/// The suite is the compatibility authority: it decides which keys and
/// parameters are legal for each role and constructs the matching stateful
/// objects.
use crate::authenticator::{Authenticator, Op};
use crate::cipher::{Cipher, CipherKind};
use crate::digest::{DigestKind, MessageDigest};
use crate::error::{CryptoError, Result};
use crate::keyexchange::KeyExchange;
use crate::keys::{AsymmetricKey, KeyData, KeyType, Params, SymmetricKey};
use crate::mac::Mac;
use crate::serial::{self, Decoder, Encoder};

/// Key-exchange algorithm tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyExchangeKind {
    Ecdhe,
    Dhe,
}

impl KeyExchangeKind {
    pub const ALL: [KeyExchangeKind; 2] = [KeyExchangeKind::Ecdhe, KeyExchangeKind::Dhe];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ECDHE" => Some(KeyExchangeKind::Ecdhe),
            "DHE" => Some(KeyExchangeKind::Dhe),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyExchangeKind::Ecdhe => "ECDHE",
            KeyExchangeKind::Dhe => "DHE",
        }
    }

    /// The key family this token exchanges with.
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyExchangeKind::Ecdhe => KeyType::Ec,
            KeyExchangeKind::Dhe => KeyType::Dh,
        }
    }
}

/// Authenticator algorithm tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthenticatorKind {
    Ecdsa,
    Dsa,
    Rsa,
    Ed25519,
}

impl AuthenticatorKind {
    pub const ALL: [AuthenticatorKind; 4] = [
        AuthenticatorKind::Ecdsa,
        AuthenticatorKind::Dsa,
        AuthenticatorKind::Rsa,
        AuthenticatorKind::Ed25519,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ECDSA" => Some(AuthenticatorKind::Ecdsa),
            "DSA" => Some(AuthenticatorKind::Dsa),
            "RSA" => Some(AuthenticatorKind::Rsa),
            "Ed25519" => Some(AuthenticatorKind::Ed25519),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthenticatorKind::Ecdsa => "ECDSA",
            AuthenticatorKind::Dsa => "DSA",
            AuthenticatorKind::Rsa => "RSA",
            AuthenticatorKind::Ed25519 => "Ed25519",
        }
    }

    /// The key family this token signs with.
    pub fn key_type(&self) -> KeyType {
        match self {
            AuthenticatorKind::Ecdsa => KeyType::Ec,
            AuthenticatorKind::Dsa => KeyType::Dsa,
            AuthenticatorKind::Rsa => KeyType::Rsa,
            AuthenticatorKind::Ed25519 => KeyType::Ed25519,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CipherSuite {
    key_exchange: KeyExchangeKind,
    authenticator: AuthenticatorKind,
    cipher: CipherKind,
    digest: DigestKind,
}

impl CipherSuite {
    pub fn new(
        key_exchange: KeyExchangeKind,
        authenticator: AuthenticatorKind,
        cipher: CipherKind,
        digest: DigestKind,
    ) -> Self {
        Self {
            key_exchange,
            authenticator,
            cipher,
            digest,
        }
    }

    /// Parse a `keyExchange_authenticator_cipher_digest` name. Any unknown
    /// token rejects the whole suite.
    pub fn parse(name: &str) -> Result<Self> {
        let unknown = || CryptoError::InvalidArgument(format!("Unknown cipher suite {name:?}"));
        let tokens: Vec<&str> = name.split('_').collect();
        if tokens.len() != 4 {
            return Err(unknown());
        }
        Ok(Self {
            key_exchange: KeyExchangeKind::parse(tokens[0]).ok_or_else(unknown)?,
            authenticator: AuthenticatorKind::parse(tokens[1]).ok_or_else(unknown)?,
            cipher: CipherKind::parse(tokens[2]).ok_or_else(unknown)?,
            digest: DigestKind::parse(tokens[3]).ok_or_else(unknown)?,
        })
    }

    pub fn name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.key_exchange.name(),
            self.authenticator.name(),
            self.cipher.name(),
            self.digest.name()
        )
    }

    /// Enumerate every legal suite.
    pub fn all() -> Vec<CipherSuite> {
        let mut suites = Vec::new();
        for key_exchange in KeyExchangeKind::ALL {
            for authenticator in AuthenticatorKind::ALL {
                for cipher in CipherKind::ALL {
                    for digest in DigestKind::ALL {
                        suites.push(CipherSuite::new(key_exchange, authenticator, cipher, digest));
                    }
                }
            }
        }
        suites
    }

    pub fn key_exchange(&self) -> KeyExchangeKind {
        self.key_exchange
    }

    pub fn authenticator(&self) -> AuthenticatorKind {
        self.authenticator
    }

    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub fn digest(&self) -> DigestKind {
        self.digest
    }

    pub fn verify_key_exchange_params(&self, params: &Params) -> bool {
        params.params_type() == self.key_exchange.key_type()
    }

    pub fn verify_key_exchange_key(&self, key: &AsymmetricKey) -> bool {
        key.key_type() == self.key_exchange.key_type()
    }

    pub fn verify_authenticator_params(&self, params: &Params) -> bool {
        params.params_type() == self.authenticator.key_type()
    }

    pub fn verify_authenticator_key(&self, key: &AsymmetricKey) -> bool {
        key.key_type() == self.authenticator.key_type()
    }

    /// A cipher key must carry exactly the cipher's key length.
    pub fn verify_cipher_key(&self, key: &SymmetricKey) -> bool {
        key.len() == self.cipher.key_length()
    }

    /// HMAC keys must match the digest output size, CMAC keys the cipher
    /// key length.
    pub fn verify_mac_key(&self, key: &AsymmetricKey) -> bool {
        match key.data() {
            KeyData::Hmac(bytes) => bytes.len() == self.digest.size(),
            KeyData::Cmac(bytes) => bytes.len() == self.cipher.key_length(),
            _ => false,
        }
    }

    /// Build the framing cipher for a compatible symmetric key.
    pub fn get_cipher(&self, key: &SymmetricKey) -> Result<Cipher> {
        if !self.verify_cipher_key(key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} has {} bytes, {} needs {}",
                key.id(),
                key.len(),
                self.cipher.name(),
                self.cipher.key_length()
            )));
        }
        Cipher::new(key.clone(), self.cipher, self.digest)
    }

    /// Build a signer or verifier for a compatible asymmetric key.
    /// Ed25519 keys get the whole-message signer with no digest state.
    pub fn get_authenticator(&self, op: Op, key: &AsymmetricKey) -> Result<Authenticator> {
        if !self.verify_authenticator_key(key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} is {}, suite authenticates with {}",
                key.id(),
                key.key_type().name(),
                self.authenticator.name()
            )));
        }
        Authenticator::new(op, key, self.digest)
    }

    /// Build a MAC for a compatible HMAC/CMAC key.
    pub fn get_mac(&self, key: &AsymmetricKey) -> Result<Mac> {
        if !self.verify_mac_key(key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} ({}) does not fit suite {}",
                key.id(),
                key.key_type().name(),
                self.name()
            )));
        }
        Mac::new(key, self.digest)
    }

    /// Build a key-exchange session from a compatible private key.
    pub fn get_key_exchange(&self, key: &AsymmetricKey) -> Result<KeyExchange> {
        if !self.verify_key_exchange_key(key) || !key.is_private() {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} cannot drive {} key exchange",
                key.id(),
                self.key_exchange.name()
            )));
        }
        KeyExchange::new(key)
    }

    /// Build an ephemeral key-exchange session from compatible parameters.
    pub fn get_key_exchange_from_params(&self, params: &Params) -> Result<KeyExchange> {
        if !self.verify_key_exchange_params(params) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Params {} cannot drive {} key exchange",
                params.id(),
                self.key_exchange.name()
            )));
        }
        KeyExchange::new(&params.create_key("", ""))
    }

    pub fn get_message_digest(&self) -> MessageDigest {
        MessageDigest::new(self.digest)
    }

    pub fn serialized_size(&self) -> usize {
        serial::string_size(self.key_exchange.name())
            + serial::string_size(self.authenticator.name())
            + serial::string_size(self.cipher.name())
            + serial::string_size(self.digest.name())
    }

    pub fn serialize(&self, enc: &mut Encoder) {
        enc.put_string(self.key_exchange.name());
        enc.put_string(self.authenticator.name());
        enc.put_string(self.cipher.name());
        enc.put_string(self.digest.name());
    }

    pub fn deserialize(dec: &mut Decoder<'_>) -> Result<Self> {
        let key_exchange = dec.get_string()?;
        let authenticator = dec.get_string()?;
        let cipher = dec.get_string()?;
        let digest = dec.get_string()?;
        Self::parse(&format!("{key_exchange}_{authenticator}_{cipher}_{digest}"))
    }
}

impl std::fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ParamsData;
    use rand::rngs::OsRng;

    const SUITE: &str = "ECDHE_ECDSA_AES-256-GCM_SHA2-512";

    #[test]
    fn test_parse_roundtrip() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        assert_eq!(suite.name(), SUITE);
        assert_eq!(suite.key_exchange(), KeyExchangeKind::Ecdhe);
        assert_eq!(suite.authenticator(), AuthenticatorKind::Ecdsa);
        assert_eq!(suite.cipher(), CipherKind::Aes256Gcm);
        assert_eq!(suite.digest(), DigestKind::Sha2_512);
    }

    #[test]
    fn test_parse_rejects_unknown_tokens() {
        for name in [
            "ECDHE_ECDSA_AES-256-GCM",
            "RSA_ECDSA_AES-256-GCM_SHA2-512",
            "ECDHE_ECDSA_CHACHA20_SHA2-512",
            "ECDHE_ECDSA_AES-256-GCM_SHA1",
            "",
            "garbage",
        ] {
            assert!(CipherSuite::parse(name).is_err(), "{name:?} parsed");
        }
    }

    #[test]
    fn test_all_enumerates_and_parses() {
        let suites = CipherSuite::all();
        assert_eq!(suites.len(), 2 * 4 * 6 * 3);
        for suite in suites {
            assert_eq!(CipherSuite::parse(&suite.name()).unwrap(), suite);
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let mut enc = Encoder::with_capacity(suite.serialized_size());
        suite.serialize(&mut enc);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), suite.serialized_size());
        assert_eq!(
            CipherSuite::deserialize(&mut Decoder::new(&bytes)).unwrap(),
            suite
        );
    }

    #[test]
    fn test_cipher_key_predicate() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let good = SymmetricKey::new(&[0u8; 32], "", "").unwrap();
        let short = SymmetricKey::new(&[0u8; 16], "", "").unwrap();
        assert!(suite.verify_cipher_key(&good));
        assert!(!suite.verify_cipher_key(&short));
        assert!(suite.get_cipher(&good).is_ok());
        assert!(matches!(
            suite.get_cipher(&short),
            Err(CryptoError::KeyTypeMismatch(_))
        ));
    }

    #[test]
    fn test_key_exchange_predicates() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let ec = Params::new(ParamsData::Ec, "", "").create_key("", "");
        let dh = Params::new(ParamsData::Dh, "", "").create_key("", "");
        assert!(suite.verify_key_exchange_key(&ec));
        assert!(!suite.verify_key_exchange_key(&dh));
        assert!(suite.get_key_exchange(&ec).is_ok());
        assert!(suite.get_key_exchange(&dh).is_err());

        let dhe_suite = CipherSuite::parse("DHE_Ed25519_AES-128-CBC_SHA2-256").unwrap();
        assert!(dhe_suite.verify_key_exchange_key(&dh));
        assert!(dhe_suite.get_key_exchange(&dh).is_ok());
    }

    #[test]
    fn test_authenticator_predicates() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let ec = AsymmetricKey::new(
            KeyData::EcPrivate(p256::SecretKey::random(&mut OsRng)),
            "",
            "",
        );
        let ed = AsymmetricKey::new(
            KeyData::Ed25519Private(ed25519_dalek::SigningKey::generate(&mut OsRng)),
            "",
            "",
        );
        assert!(suite.verify_authenticator_key(&ec));
        assert!(!suite.verify_authenticator_key(&ed));
        assert!(suite.get_authenticator(Op::Sign, &ec).is_ok());
        assert!(suite.get_authenticator(Op::Sign, &ed).is_err());
    }

    #[test]
    fn test_ed25519_authenticator_roundtrip() {
        let suite = CipherSuite::parse("DHE_Ed25519_AES-256-GCM_SHA2-256").unwrap();
        let key = AsymmetricKey::new(
            KeyData::Ed25519Private(ed25519_dalek::SigningKey::generate(&mut OsRng)),
            "",
            "",
        );
        let mut signer = suite.get_authenticator(Op::Sign, &key).unwrap();
        let sig = signer.sign_buffer(b"suite-bound signature").unwrap();
        let mut verifier = suite.get_authenticator(Op::Verify, &key).unwrap();
        assert!(verifier
            .verify_buffer_signature(b"suite-bound signature", &sig)
            .unwrap());
    }

    #[test]
    fn test_mac_key_predicate_tracks_digest_length() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let hmac512 =
            AsymmetricKey::hmac_key(b"s", b"", DigestKind::Sha2_512, 1, "", "").unwrap();
        let hmac256 =
            AsymmetricKey::hmac_key(b"s", b"", DigestKind::Sha2_256, 1, "", "").unwrap();
        assert!(suite.verify_mac_key(&hmac512));
        assert!(!suite.verify_mac_key(&hmac256));

        let cmac32 =
            AsymmetricKey::cmac_key(b"s", b"", 32, DigestKind::Sha2_256, 1, "", "").unwrap();
        let cmac16 =
            AsymmetricKey::cmac_key(b"s", b"", 16, DigestKind::Sha2_256, 1, "", "").unwrap();
        assert!(suite.verify_mac_key(&cmac32));
        assert!(!suite.verify_mac_key(&cmac16));

        assert!(suite.get_mac(&hmac512).is_ok());
        assert!(suite.get_mac(&hmac256).is_err());
    }

    #[test]
    fn test_key_exchange_ends_to_end() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let params = Params::new(ParamsData::Ec, "", "");
        let alice = suite.get_key_exchange_from_params(&params).unwrap();
        let bob = suite.get_key_exchange_from_params(&params).unwrap();

        let shared_a = alice
            .derive_shared_symmetric_key(
                &bob.public_key("", ""),
                suite.cipher().key_length(),
                b"session",
                suite.digest(),
                1,
                "",
                "",
            )
            .unwrap();
        let shared_b = bob
            .derive_shared_symmetric_key(
                &alice.public_key("", ""),
                suite.cipher().key_length(),
                b"session",
                suite.digest(),
                1,
                "",
                "",
            )
            .unwrap();
        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
        assert!(suite.verify_cipher_key(&shared_a));
    }
}
