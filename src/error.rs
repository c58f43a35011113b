use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Key type mismatch: {0}")]
    KeyTypeMismatch(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Primitive failure: {0}")]
    Primitive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
