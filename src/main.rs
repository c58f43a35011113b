use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keyvault::cipher::FrameHeader;
use keyvault::serial::Decoder;
use keyvault::{
    AsymmetricKey, AuthenticatorKind, Cipher, CipherSuite, DigestKind, KeyExchangeKind, KeyRing,
    Op, Params, ParamsData, Result, SymmetricKey,
};

const DEFAULT_SUITE: &str = "ECDHE_ECDSA_AES-256-GCM_SHA2-512";

/// Stretch count for password-derived ring encryption keys.
const PASSWORD_STRETCH_COUNT: usize = 1000;

#[derive(Parser)]
#[command(name = "keyvault")]
#[command(about = "Key ring management and file encryption/signing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key ring with fresh keys and save it
    GenRing {
        #[arg(short = 'c', long, default_value = DEFAULT_SUITE)]
        suite: String,
        #[arg(short, long, default_value = "")]
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Encrypt the ring on disk under this password
        #[arg(short, long)]
        password: Option<String>,
        /// Where to write the ring
        path: PathBuf,
    },
    /// Encrypt a file under the ring's master cipher key
    Encrypt {
        #[arg(short = 'c', long, default_value = DEFAULT_SUITE)]
        suite: String,
        #[arg(short, long)]
        password: Option<String>,
        /// Ring file produced by gen-ring
        #[arg(short, long)]
        ring: PathBuf,
        /// File to encrypt; writes <file>.sealed
        path: PathBuf,
    },
    /// Decrypt a file produced by encrypt
    Decrypt {
        #[arg(short = 'c', long, default_value = DEFAULT_SUITE)]
        suite: String,
        #[arg(short, long)]
        password: Option<String>,
        #[arg(short, long)]
        ring: PathBuf,
        /// File to decrypt; writes <file>.plain
        path: PathBuf,
    },
    /// Sign a file with the ring's authenticator key
    Sign {
        #[arg(short = 'c', long, default_value = DEFAULT_SUITE)]
        suite: String,
        #[arg(short, long)]
        password: Option<String>,
        #[arg(short, long)]
        ring: PathBuf,
        /// File to sign; writes <file>.sig
        path: PathBuf,
    },
    /// Verify a detached signature produced by sign
    Verify {
        #[arg(short = 'c', long, default_value = DEFAULT_SUITE)]
        suite: String,
        #[arg(short, long)]
        password: Option<String>,
        #[arg(short, long)]
        ring: PathBuf,
        /// Signed file; expects <file>.sig next to it
        path: PathBuf,
    },
}

/// Password-derived cipher for sealing/unsealing the ring file itself.
fn ring_cipher(suite: &CipherSuite, password: &str) -> Result<Cipher> {
    let key = SymmetricKey::from_secret_and_salt(
        suite.cipher().key_length(),
        password.as_bytes(),
        password.as_bytes(),
        DigestKind::Sha2_256,
        PASSWORD_STRETCH_COUNT,
        "",
        "ring sealing key",
    )?;
    suite.get_cipher(&key)
}

fn load_ring(path: &Path, suite: &CipherSuite, password: Option<&str>) -> Result<KeyRing> {
    match password {
        Some(password) => {
            let mut cipher = ring_cipher(suite, password)?;
            KeyRing::load(path, Some(&mut cipher), b"")
        }
        None => KeyRing::load(path, None, b""),
    }
}

fn gen_ring(
    suite_name: &str,
    name: &str,
    description: &str,
    password: Option<&str>,
    path: &Path,
) -> Result<()> {
    let suite = CipherSuite::parse(suite_name)?;
    let mut ring = KeyRing::new(suite, None, name, description)?;

    let authenticator_key = match suite.authenticator() {
        AuthenticatorKind::Ecdsa => {
            Params::new(ParamsData::Ec, "", "").create_key("authenticator", "")
        }
        AuthenticatorKind::Ed25519 => {
            Params::new(ParamsData::Ed25519, "", "").create_key("authenticator", "")
        }
        AuthenticatorKind::Dsa => {
            let params = Params::generate_dsa(dsa::KeySize::DSA_2048_256, "dsa params", "");
            let key = params.create_key("authenticator", "");
            ring.add_authenticator_params(params)?;
            key
        }
        AuthenticatorKind::Rsa => AsymmetricKey::generate_rsa(2048, "authenticator", "")?,
    };
    ring.add_authenticator_key(authenticator_key)?;

    let exchange_params = match suite.key_exchange() {
        KeyExchangeKind::Ecdhe => Params::new(ParamsData::Ec, "exchange params", ""),
        KeyExchangeKind::Dhe => Params::new(ParamsData::Dh, "exchange params", ""),
    };
    ring.add_key_exchange_key(exchange_params.create_key("exchange", ""))?;
    ring.add_key_exchange_params(exchange_params)?;

    match password {
        Some(password) => {
            let mut cipher = ring_cipher(&suite, password)?;
            ring.save(path, Some(&mut cipher), b"")?;
        }
        None => ring.save(path, None, b"")?,
    }
    println!("wrote key ring {} to {}", ring.id(), path.display());
    Ok(())
}

fn encrypt(suite: &str, password: Option<&str>, ring: &Path, path: &Path) -> Result<()> {
    let suite = CipherSuite::parse(suite)?;
    let mut ring = load_ring(ring, &suite, password)?;
    let master_id = *ring.master_cipher_key().id();

    let plaintext = std::fs::read(path)?;
    let cipher = ring
        .get_cipher(&master_id, false)?
        .ok_or_else(|| keyvault::CryptoError::Internal("Master cipher unavailable".into()))?;
    let framed = cipher.encrypt_and_frame(&plaintext, b"")?;

    let output = path.with_extension(extended(path, "sealed"));
    std::fs::write(&output, framed)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn decrypt(suite: &str, password: Option<&str>, ring: &Path, path: &Path) -> Result<()> {
    let suite = CipherSuite::parse(suite)?;
    let mut ring = load_ring(ring, &suite, password)?;

    let framed = std::fs::read(path)?;
    let header = FrameHeader::decode(&mut Decoder::new(&framed))?;
    let cipher = ring.get_cipher(&header.key_id, true)?.ok_or_else(|| {
        keyvault::CryptoError::InvalidArgument(format!(
            "Ring holds no key {} for this file",
            header.key_id
        ))
    })?;
    let plaintext = cipher.decrypt_frame(&framed, b"")?;

    let output = path.with_extension(extended(path, "plain"));
    std::fs::write(&output, plaintext)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn signing_key_id(ring: &KeyRing) -> Result<keyvault::Id> {
    ring.get_authenticator_key_by(|key| key.is_private(), true)
        .map(|key| *key.id())
        .ok_or_else(|| {
            keyvault::CryptoError::InvalidArgument("Ring holds no private signing key".into())
        })
}

fn sign(suite: &str, password: Option<&str>, ring: &Path, path: &Path) -> Result<()> {
    let suite = CipherSuite::parse(suite)?;
    let mut ring = load_ring(ring, &suite, password)?;
    let key_id = signing_key_id(&ring)?;

    let signer = ring
        .get_authenticator(Op::Sign, &key_id, true)?
        .ok_or_else(|| keyvault::CryptoError::Internal("Signer unavailable".into()))?;
    let signature = signer.sign_file(path)?;

    let output = path.with_extension(extended(path, "sig"));
    std::fs::write(&output, signature)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn verify(suite: &str, password: Option<&str>, ring: &Path, path: &Path) -> Result<bool> {
    let suite = CipherSuite::parse(suite)?;
    let mut ring = load_ring(ring, &suite, password)?;
    let key_id = signing_key_id(&ring)?;

    let signature = std::fs::read(path.with_extension(extended(path, "sig")))?;
    let verifier = ring
        .get_authenticator(Op::Verify, &key_id, true)?
        .ok_or_else(|| keyvault::CryptoError::Internal("Verifier unavailable".into()))?;
    verifier.verify_file_signature(path, &signature)
}

/// `file.txt` + `sig` -> `txt.sig`, preserving the original extension.
fn extended(path: &Path, suffix: &str) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.{suffix}"),
        None => suffix.to_string(),
    }
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::GenRing {
            suite,
            name,
            description,
            password,
            path,
        } => gen_ring(&suite, &name, &description, password.as_deref(), &path).map(|()| true),
        Commands::Encrypt {
            suite,
            password,
            ring,
            path,
        } => encrypt(&suite, password.as_deref(), &ring, &path).map(|()| true),
        Commands::Decrypt {
            suite,
            password,
            ring,
            path,
        } => decrypt(&suite, password.as_deref(), &ring, &path).map(|()| true),
        Commands::Sign {
            suite,
            password,
            ring,
            path,
        } => sign(&suite, password.as_deref(), &ring, &path).map(|()| true),
        Commands::Verify {
            suite,
            password,
            ring,
            path,
        } => {
            let ok = verify(&suite, password.as_deref(), &ring, &path)?;
            println!("signature {}", if ok { "valid" } else { "INVALID" });
            Ok(ok)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
