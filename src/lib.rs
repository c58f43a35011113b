pub mod authenticator;
pub mod cipher;
pub mod digest;
pub mod error;
pub mod id;
pub mod keyexchange;
pub mod keys;
pub mod mac;
pub mod ring;
pub mod secure;
pub mod serial;
pub mod signer;
pub mod suite;

pub use authenticator::{Authenticator, Op};
pub use cipher::{Cipher, CipherKind, FrameHeader, MAX_PLAINTEXT_LENGTH};
pub use digest::{DigestKind, MessageDigest};
pub use error::{CryptoError, Result};
pub use id::Id;
pub use keyexchange::KeyExchange;
pub use keys::{AsymmetricKey, KeyData, KeyType, Params, ParamsData, SymmetricKey};
pub use mac::Mac;
pub use ring::KeyRing;
pub use secure::SecureBytes;
pub use suite::{AuthenticatorKind, CipherSuite, KeyExchangeKind};
