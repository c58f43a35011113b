/// Key-generation parameters.
///
/// A `Params` names a key family (and, for DSA, its domain parameters); its
/// one operation mints a fresh private key of that family. The Curve25519
/// and P-256 families are fully determined by their curve, so their payload
/// is empty.
use num_bigint_dig::BigUint;
use rand::rngs::OsRng;

use crate::error::{CryptoError, Result};
use crate::id::Id;
use crate::keys::asymmetric::{AsymmetricKey, KeyData, KeyType};
use crate::serial::{self, Decoder, Encoder, Metadata};

pub(crate) const TYPE_TAG: &str = "Params";

#[derive(Clone)]
pub enum ParamsData {
    /// Ephemeral Diffie-Hellman over Curve25519.
    Dh,
    /// DSA domain parameters (p, q, g).
    Dsa(dsa::Components),
    /// NIST P-256.
    Ec,
    /// Ed25519 signatures.
    Ed25519,
}

#[derive(Clone)]
pub struct Params {
    meta: Metadata,
    data: ParamsData,
}

impl Params {
    pub fn new(
        data: ParamsData,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            meta: Metadata::new(name, description),
            data,
        }
    }

    /// Generate fresh DSA domain parameters.
    pub fn generate_dsa(
        key_size: dsa::KeySize,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let components = dsa::Components::generate(&mut OsRng, key_size);
        Self::new(ParamsData::Dsa(components), name, description)
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

    pub fn data(&self) -> &ParamsData {
        &self.data
    }

    /// The key family these parameters generate.
    pub fn params_type(&self) -> KeyType {
        match self.data {
            ParamsData::Dh => KeyType::Dh,
            ParamsData::Dsa(_) => KeyType::Dsa,
            ParamsData::Ec => KeyType::Ec,
            ParamsData::Ed25519 => KeyType::Ed25519,
        }
    }

    /// Mint a fresh private key of this family.
    pub fn create_key(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> AsymmetricKey {
        let data = match &self.data {
            ParamsData::Dh => {
                KeyData::DhPrivate(x25519_dalek::StaticSecret::random_from_rng(OsRng))
            }
            ParamsData::Dsa(components) => KeyData::DsaPrivate(dsa::SigningKey::generate(
                &mut OsRng,
                components.clone(),
            )),
            ParamsData::Ec => KeyData::EcPrivate(p256::SecretKey::random(&mut OsRng)),
            ParamsData::Ed25519 => {
                KeyData::Ed25519Private(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
        };
        AsymmetricKey::new(data, name, description)
    }

    fn payload(&self) -> Vec<u8> {
        match &self.data {
            ParamsData::Dsa(components) => {
                let p = components.p().to_bytes_be();
                let q = components.q().to_bytes_be();
                let g = components.g().to_bytes_be();
                let mut enc = Encoder::with_capacity(
                    serial::bytes_size(&p) + serial::bytes_size(&q) + serial::bytes_size(&g),
                );
                enc.put_bytes(&p);
                enc.put_bytes(&q);
                enc.put_bytes(&g);
                enc.into_bytes()
            }
            ParamsData::Dh | ParamsData::Ec | ParamsData::Ed25519 => Vec::new(),
        }
    }

    pub fn serialized_size(&self) -> usize {
        serial::header_size(TYPE_TAG, &self.meta) + 4 + serial::bytes_size(&self.payload())
    }

    pub fn serialize(&self, enc: &mut Encoder) {
        serial::write_header(enc, TYPE_TAG, &self.meta);
        enc.put_i32(self.params_type().code());
        enc.put_bytes(&self.payload());
    }

    pub fn deserialize(dec: &mut Decoder<'_>) -> Result<Self> {
        let meta = serial::expect_header(dec, TYPE_TAG)?;
        let code = dec.get_i32()?;
        let key_type = KeyType::from_code(code).ok_or_else(|| {
            CryptoError::InvalidArgument(format!("Unknown params type code {code}"))
        })?;
        let payload = dec.get_bytes()?;
        let data = match key_type {
            KeyType::Dh => ParamsData::Dh,
            KeyType::Ec => ParamsData::Ec,
            KeyType::Ed25519 => ParamsData::Ed25519,
            KeyType::Dsa => {
                let mut inner = Decoder::new(payload);
                let p = BigUint::from_bytes_be(inner.get_bytes()?);
                let q = BigUint::from_bytes_be(inner.get_bytes()?);
                let g = BigUint::from_bytes_be(inner.get_bytes()?);
                let components = dsa::Components::from_components(p, q, g)
                    .map_err(|e| CryptoError::Primitive(format!("DSA components: {e}")))?;
                ParamsData::Dsa(components)
            }
            other => {
                return Err(CryptoError::InvalidArgument(format!(
                    "{} is not a parameter family",
                    other.name()
                )))
            }
        };
        Ok(Self { meta, data })
    }
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Params")
            .field("id", self.id())
            .field("type", &self.params_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(params: &Params) -> Params {
        let mut enc = Encoder::with_capacity(params.serialized_size());
        params.serialize(&mut enc);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), params.serialized_size());
        let mut dec = Decoder::new(&bytes);
        let parsed = Params::deserialize(&mut dec).unwrap();
        assert!(dec.is_empty());
        assert_eq!(parsed.id(), params.id());
        assert_eq!(parsed.params_type(), params.params_type());
        parsed
    }

    #[test]
    fn test_marker_families_roundtrip() {
        for data in [ParamsData::Dh, ParamsData::Ec, ParamsData::Ed25519] {
            let params = Params::new(data, "family", "");
            roundtrip(&params);
        }
    }

    #[test]
    fn test_create_key_family() {
        let ec = Params::new(ParamsData::Ec, "", "");
        let key = ec.create_key("session", "");
        assert_eq!(key.key_type(), KeyType::Ec);
        assert!(key.is_private());

        let dh = Params::new(ParamsData::Dh, "", "");
        assert_eq!(dh.create_key("", "").key_type(), KeyType::Dh);

        let ed = Params::new(ParamsData::Ed25519, "", "");
        assert_eq!(ed.create_key("", "").key_type(), KeyType::Ed25519);
    }

    #[test]
    fn test_create_key_unique_ids() {
        let params = Params::new(ParamsData::Ec, "", "");
        assert_ne!(params.create_key("", "").id(), params.create_key("", "").id());
    }

    // DSA parameter generation is expensive; one test covers generate,
    // roundtrip and key creation together.
    #[test]
    fn test_dsa_params_roundtrip_and_create() {
        let params = Params::generate_dsa(dsa::KeySize::DSA_1024_160, "dsa", "legacy");
        let parsed = roundtrip(&params);
        let key = parsed.create_key("", "");
        assert_eq!(key.key_type(), KeyType::Dsa);
        assert!(key.is_private());
    }
}
