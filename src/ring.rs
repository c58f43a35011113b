/// The key ring: a tree of id-indexed parameters and keys bound to one
/// cipher suite, with lazily built caches of the stateful objects that
/// operate with those keys.
///
/// Lookup walks the local maps first and, when asked, descends into
/// subrings in ascending id order; the first hit wins. Lookup methods that
/// hand out ciphers, authenticators, MACs or key-exchange sessions mutate
/// the caches, so the ring requires external synchronization to share.
///
/// Cipher keys move through three states: active (encrypt + decrypt),
/// retired (decrypt only) and dropped. The master cipher key lives in its
/// own slot and also self-encrypts the ring on disk.
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::authenticator::{Authenticator, Op};
use crate::cipher::Cipher;
use crate::error::{CryptoError, Result};
use crate::id::Id;
use crate::keyexchange::KeyExchange;
use crate::keys::{AsymmetricKey, Params, SymmetricKey};
use crate::mac::Mac;
use crate::secure::SecureBytes;
use crate::serial::{self, Decoder, Encoder, Metadata};
use crate::suite::CipherSuite;

pub(crate) const TYPE_TAG: &str = "KeyRing";

pub struct KeyRing {
    meta: Metadata,
    suite: CipherSuite,
    master_cipher_key: SymmetricKey,
    key_exchange_params: BTreeMap<Id, Params>,
    key_exchange_keys: BTreeMap<Id, AsymmetricKey>,
    authenticator_params: BTreeMap<Id, Params>,
    authenticator_keys: BTreeMap<Id, AsymmetricKey>,
    active_cipher_keys: BTreeMap<Id, SymmetricKey>,
    retired_cipher_keys: BTreeMap<Id, SymmetricKey>,
    mac_keys: BTreeMap<Id, AsymmetricKey>,
    subrings: BTreeMap<Id, KeyRing>,
    // Derived caches, never persisted.
    key_exchange_cache: BTreeMap<Id, KeyExchange>,
    authenticator_cache: BTreeMap<(Op, Id), Authenticator>,
    cipher_cache: BTreeMap<Id, Cipher>,
    mac_cache: BTreeMap<Id, Mac>,
}

impl KeyRing {
    /// Create a ring for `suite`. Without a master key, a fresh random key
    /// of the suite cipher's length is generated.
    pub fn new(
        suite: CipherSuite,
        master_cipher_key: Option<SymmetricKey>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let master_cipher_key = match master_cipher_key {
            Some(key) => {
                if !suite.verify_cipher_key(&key) {
                    return Err(CryptoError::KeyTypeMismatch(format!(
                        "Master key {} does not fit suite {}",
                        key.id(),
                        suite.name()
                    )));
                }
                key
            }
            None => SymmetricKey::from_random(suite.cipher().key_length())?,
        };
        Ok(Self {
            meta: Metadata::new(name, description),
            suite,
            master_cipher_key,
            key_exchange_params: BTreeMap::new(),
            key_exchange_keys: BTreeMap::new(),
            authenticator_params: BTreeMap::new(),
            authenticator_keys: BTreeMap::new(),
            active_cipher_keys: BTreeMap::new(),
            retired_cipher_keys: BTreeMap::new(),
            mac_keys: BTreeMap::new(),
            subrings: BTreeMap::new(),
            key_exchange_cache: BTreeMap::new(),
            authenticator_cache: BTreeMap::new(),
            cipher_cache: BTreeMap::new(),
            mac_cache: BTreeMap::new(),
        })
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

    pub fn suite(&self) -> &CipherSuite {
        &self.suite
    }

    pub fn master_cipher_key(&self) -> &SymmetricKey {
        &self.master_cipher_key
    }

    /// Replace the master key after suite validation. Any cipher cached
    /// under the previous master is discarded.
    pub fn set_master_cipher_key(&mut self, key: SymmetricKey) -> Result<()> {
        if !self.suite.verify_cipher_key(&key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Master key {} does not fit suite {}",
                key.id(),
                self.suite.name()
            )));
        }
        self.cipher_cache.remove(self.master_cipher_key.id());
        self.master_cipher_key = key;
        Ok(())
    }

    // --- key exchange params -------------------------------------------------

    pub fn get_key_exchange_params(&self, params_id: &Id, recursive: bool) -> Option<&Params> {
        if let Some(params) = self.key_exchange_params.get(params_id) {
            return Some(params);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.get_key_exchange_params(params_id, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    pub fn get_key_exchange_params_by<F: Fn(&Params) -> bool>(
        &self,
        predicate: F,
        recursive: bool,
    ) -> Option<&Params> {
        self.key_exchange_params_by(&predicate, recursive)
    }

    fn key_exchange_params_by(
        &self,
        predicate: &dyn Fn(&Params) -> bool,
        recursive: bool,
    ) -> Option<&Params> {
        if let Some(params) = self.key_exchange_params.values().find(|p| predicate(p)) {
            return Some(params);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.key_exchange_params_by(predicate, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    pub fn add_key_exchange_params(&mut self, params: Params) -> Result<()> {
        if !self.suite.verify_key_exchange_params(&params) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Params {} do not fit {} key exchange",
                params.id(),
                self.suite.key_exchange().name()
            )));
        }
        match self.key_exchange_params.entry(*params.id()) {
            Entry::Vacant(slot) => {
                slot.insert(params);
                Ok(())
            }
            Entry::Occupied(_) => Err(CryptoError::DuplicateId(params.id().to_string())),
        }
    }

    pub fn drop_key_exchange_params(&mut self, params_id: &Id, recursive: bool) -> bool {
        if self.key_exchange_params.remove(params_id).is_some() {
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_key_exchange_params(params_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_all_key_exchange_params(&mut self, recursive: bool) {
        self.key_exchange_params.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_key_exchange_params(true);
            }
        }
    }

    // --- key exchange keys ---------------------------------------------------

    pub fn get_key_exchange_key(&self, key_id: &Id, recursive: bool) -> Option<&AsymmetricKey> {
        if let Some(key) = self.key_exchange_keys.get(key_id) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_key_exchange_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    pub fn get_key_exchange_key_by<F: Fn(&AsymmetricKey) -> bool>(
        &self,
        predicate: F,
        recursive: bool,
    ) -> Option<&AsymmetricKey> {
        self.key_exchange_key_by(&predicate, recursive)
    }

    fn key_exchange_key_by(
        &self,
        predicate: &dyn Fn(&AsymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<&AsymmetricKey> {
        if let Some(key) = self.key_exchange_keys.values().find(|k| predicate(k)) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.key_exchange_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    pub fn add_key_exchange_key(&mut self, key: AsymmetricKey) -> Result<()> {
        if !self.suite.verify_key_exchange_key(&key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} does not fit {} key exchange",
                key.id(),
                self.suite.key_exchange().name()
            )));
        }
        match self.key_exchange_keys.entry(*key.id()) {
            Entry::Vacant(slot) => {
                slot.insert(key);
                Ok(())
            }
            Entry::Occupied(_) => Err(CryptoError::DuplicateId(key.id().to_string())),
        }
    }

    pub fn drop_key_exchange_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.key_exchange_keys.remove(key_id).is_some() {
            self.key_exchange_cache.remove(key_id);
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_key_exchange_key(key_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_all_key_exchange_keys(&mut self, recursive: bool) {
        self.key_exchange_keys.clear();
        self.key_exchange_cache.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_key_exchange_keys(true);
            }
        }
    }

    /// Cached key-exchange session for the private key under `key_id`.
    pub fn get_key_exchange(
        &mut self,
        key_id: &Id,
        recursive: bool,
    ) -> Result<Option<&mut KeyExchange>> {
        if self.ensure_key_exchange(key_id, recursive)? {
            Ok(self.cached_key_exchange_mut(key_id))
        } else {
            Ok(None)
        }
    }

    fn ensure_key_exchange(&mut self, key_id: &Id, recursive: bool) -> Result<bool> {
        if self.key_exchange_cache.contains_key(key_id) {
            return Ok(true);
        }
        if let Some(key) = self.get_key_exchange_key(key_id, false).cloned() {
            let key_exchange = self.suite.get_key_exchange(&key)?;
            match self.key_exchange_cache.entry(*key_id) {
                Entry::Vacant(slot) => {
                    slot.insert(key_exchange);
                }
                Entry::Occupied(_) => {
                    return Err(CryptoError::Internal(format!(
                        "Key exchange cache already holds {key_id}"
                    )))
                }
            }
            return Ok(true);
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.ensure_key_exchange(key_id, true)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn has_cached_key_exchange(&self, key_id: &Id) -> bool {
        self.key_exchange_cache.contains_key(key_id)
            || self.subrings.values().any(|s| s.has_cached_key_exchange(key_id))
    }

    fn cached_key_exchange_mut(&mut self, key_id: &Id) -> Option<&mut KeyExchange> {
        if self.key_exchange_cache.contains_key(key_id) {
            return self.key_exchange_cache.get_mut(key_id);
        }
        let child = self
            .subrings
            .iter()
            .find(|(_, s)| s.has_cached_key_exchange(key_id))
            .map(|(id, _)| *id)?;
        self.subrings.get_mut(&child)?.cached_key_exchange_mut(key_id)
    }

    // --- authenticator params ------------------------------------------------

    pub fn get_authenticator_params(&self, params_id: &Id, recursive: bool) -> Option<&Params> {
        if let Some(params) = self.authenticator_params.get(params_id) {
            return Some(params);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.get_authenticator_params(params_id, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    pub fn get_authenticator_params_by<F: Fn(&Params) -> bool>(
        &self,
        predicate: F,
        recursive: bool,
    ) -> Option<&Params> {
        self.authenticator_params_by(&predicate, recursive)
    }

    fn authenticator_params_by(
        &self,
        predicate: &dyn Fn(&Params) -> bool,
        recursive: bool,
    ) -> Option<&Params> {
        if let Some(params) = self.authenticator_params.values().find(|p| predicate(p)) {
            return Some(params);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(params) = subring.authenticator_params_by(predicate, true) {
                    return Some(params);
                }
            }
        }
        None
    }

    pub fn add_authenticator_params(&mut self, params: Params) -> Result<()> {
        if !self.suite.verify_authenticator_params(&params) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Params {} do not fit {} authentication",
                params.id(),
                self.suite.authenticator().name()
            )));
        }
        match self.authenticator_params.entry(*params.id()) {
            Entry::Vacant(slot) => {
                slot.insert(params);
                Ok(())
            }
            Entry::Occupied(_) => Err(CryptoError::DuplicateId(params.id().to_string())),
        }
    }

    pub fn drop_authenticator_params(&mut self, params_id: &Id, recursive: bool) -> bool {
        if self.authenticator_params.remove(params_id).is_some() {
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_authenticator_params(params_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_all_authenticator_params(&mut self, recursive: bool) {
        self.authenticator_params.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_authenticator_params(true);
            }
        }
    }

    // --- authenticator keys --------------------------------------------------

    pub fn get_authenticator_key(&self, key_id: &Id, recursive: bool) -> Option<&AsymmetricKey> {
        if let Some(key) = self.authenticator_keys.get(key_id) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_authenticator_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    pub fn get_authenticator_key_by<F: Fn(&AsymmetricKey) -> bool>(
        &self,
        predicate: F,
        recursive: bool,
    ) -> Option<&AsymmetricKey> {
        self.authenticator_key_by(&predicate, recursive)
    }

    fn authenticator_key_by(
        &self,
        predicate: &dyn Fn(&AsymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<&AsymmetricKey> {
        if let Some(key) = self.authenticator_keys.values().find(|k| predicate(k)) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.authenticator_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    pub fn add_authenticator_key(&mut self, key: AsymmetricKey) -> Result<()> {
        if !self.suite.verify_authenticator_key(&key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} does not fit {} authentication",
                key.id(),
                self.suite.authenticator().name()
            )));
        }
        match self.authenticator_keys.entry(*key.id()) {
            Entry::Vacant(slot) => {
                slot.insert(key);
                Ok(())
            }
            Entry::Occupied(_) => Err(CryptoError::DuplicateId(key.id().to_string())),
        }
    }

    pub fn drop_authenticator_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.authenticator_keys.remove(key_id).is_some() {
            self.authenticator_cache.remove(&(Op::Sign, *key_id));
            self.authenticator_cache.remove(&(Op::Verify, *key_id));
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_authenticator_key(key_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_all_authenticator_keys(&mut self, recursive: bool) {
        self.authenticator_keys.clear();
        self.authenticator_cache.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_authenticator_keys(true);
            }
        }
    }

    /// Cached authenticator for `(op, key_id)`.
    pub fn get_authenticator(
        &mut self,
        op: Op,
        key_id: &Id,
        recursive: bool,
    ) -> Result<Option<&mut Authenticator>> {
        if self.ensure_authenticator(op, key_id, recursive)? {
            Ok(self.cached_authenticator_mut(op, key_id))
        } else {
            Ok(None)
        }
    }

    fn ensure_authenticator(&mut self, op: Op, key_id: &Id, recursive: bool) -> Result<bool> {
        if self.authenticator_cache.contains_key(&(op, *key_id)) {
            return Ok(true);
        }
        if let Some(key) = self.get_authenticator_key(key_id, false).cloned() {
            let authenticator = self.suite.get_authenticator(op, &key)?;
            match self.authenticator_cache.entry((op, *key_id)) {
                Entry::Vacant(slot) => {
                    slot.insert(authenticator);
                }
                Entry::Occupied(_) => {
                    return Err(CryptoError::Internal(format!(
                        "Authenticator cache already holds {key_id}"
                    )))
                }
            }
            return Ok(true);
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.ensure_authenticator(op, key_id, true)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn has_cached_authenticator(&self, op: Op, key_id: &Id) -> bool {
        self.authenticator_cache.contains_key(&(op, *key_id))
            || self
                .subrings
                .values()
                .any(|s| s.has_cached_authenticator(op, key_id))
    }

    fn cached_authenticator_mut(&mut self, op: Op, key_id: &Id) -> Option<&mut Authenticator> {
        if self.authenticator_cache.contains_key(&(op, *key_id)) {
            return self.authenticator_cache.get_mut(&(op, *key_id));
        }
        let child = self
            .subrings
            .iter()
            .find(|(_, s)| s.has_cached_authenticator(op, key_id))
            .map(|(id, _)| *id)?;
        self.subrings
            .get_mut(&child)?
            .cached_authenticator_mut(op, key_id)
    }

    // --- cipher keys ---------------------------------------------------------

    /// The master key answers first, then active keys, then retired keys.
    pub fn get_cipher_key(&self, key_id: &Id, recursive: bool) -> Option<&SymmetricKey> {
        if self.master_cipher_key.id() == key_id {
            return Some(&self.master_cipher_key);
        }
        if let Some(key) = self.active_cipher_keys.get(key_id) {
            return Some(key);
        }
        if let Some(key) = self.retired_cipher_keys.get(key_id) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_cipher_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    pub fn get_cipher_key_by<F: Fn(&SymmetricKey) -> bool>(
        &self,
        predicate: F,
        recursive: bool,
    ) -> Option<&SymmetricKey> {
        self.cipher_key_by(&predicate, recursive)
    }

    fn cipher_key_by(
        &self,
        predicate: &dyn Fn(&SymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<&SymmetricKey> {
        if predicate(&self.master_cipher_key) {
            return Some(&self.master_cipher_key);
        }
        if let Some(key) = self.active_cipher_keys.values().find(|k| predicate(k)) {
            return Some(key);
        }
        if let Some(key) = self.retired_cipher_keys.values().find(|k| predicate(k)) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.cipher_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    /// Offer a key for new encryption (and decryption).
    pub fn add_cipher_active_key(&mut self, key: SymmetricKey) -> Result<()> {
        if !self.suite.verify_cipher_key(&key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} does not fit cipher {}",
                key.id(),
                self.suite.cipher().name()
            )));
        }
        match self.active_cipher_keys.entry(*key.id()) {
            Entry::Vacant(slot) => {
                slot.insert(key);
                Ok(())
            }
            Entry::Occupied(_) => Err(CryptoError::DuplicateId(key.id().to_string())),
        }
    }

    /// Move a key from active to retired (decrypt-only). The cached cipher
    /// for that id is discarded everywhere along the search path.
    pub fn retire_active_cipher_key(&mut self, key_id: &Id, recursive: bool) -> Result<bool> {
        if self.active_cipher_keys.contains_key(key_id) {
            if self.retired_cipher_keys.contains_key(key_id) {
                return Err(CryptoError::Internal(format!(
                    "Key {key_id} is both active and retired"
                )));
            }
            let key = self
                .active_cipher_keys
                .remove(key_id)
                .ok_or_else(|| CryptoError::Internal("Active key vanished mid-retire".into()))?;
            self.retired_cipher_keys.insert(*key_id, key);
            self.cipher_cache.remove(key_id);
            return Ok(true);
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.retire_active_cipher_key(key_id, true)? {
                    self.cipher_cache.remove(key_id);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn drop_active_cipher_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.active_cipher_keys.remove(key_id).is_some() {
            self.cipher_cache.remove(key_id);
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_active_cipher_key(key_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_retired_cipher_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.retired_cipher_keys.remove(key_id).is_some() {
            self.cipher_cache.remove(key_id);
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_retired_cipher_key(key_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_active_cipher_keys(&mut self, recursive: bool) {
        for key_id in self.active_cipher_keys.keys() {
            self.cipher_cache.remove(key_id);
        }
        self.active_cipher_keys.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_active_cipher_keys(true);
            }
        }
    }

    pub fn drop_retired_cipher_keys(&mut self, recursive: bool) {
        for key_id in self.retired_cipher_keys.keys() {
            self.cipher_cache.remove(key_id);
        }
        self.retired_cipher_keys.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_retired_cipher_keys(true);
            }
        }
    }

    pub fn drop_all_cipher_keys(&mut self, recursive: bool) {
        self.active_cipher_keys.clear();
        self.retired_cipher_keys.clear();
        self.cipher_cache.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_cipher_keys(true);
            }
        }
    }

    /// Membership probes for the lifecycle states.
    pub fn is_active_cipher_key(&self, key_id: &Id) -> bool {
        self.active_cipher_keys.contains_key(key_id)
    }

    pub fn is_retired_cipher_key(&self, key_id: &Id) -> bool {
        self.retired_cipher_keys.contains_key(key_id)
    }

    /// Cached framing cipher for the key under `key_id` (master, active or
    /// retired).
    pub fn get_cipher(&mut self, key_id: &Id, recursive: bool) -> Result<Option<&mut Cipher>> {
        if self.ensure_cipher(key_id, recursive)? {
            Ok(self.cached_cipher_mut(key_id))
        } else {
            Ok(None)
        }
    }

    fn ensure_cipher(&mut self, key_id: &Id, recursive: bool) -> Result<bool> {
        if self.cipher_cache.contains_key(key_id) {
            return Ok(true);
        }
        if let Some(key) = self.get_cipher_key(key_id, false).cloned() {
            let cipher = self.suite.get_cipher(&key)?;
            match self.cipher_cache.entry(*key_id) {
                Entry::Vacant(slot) => {
                    slot.insert(cipher);
                }
                Entry::Occupied(_) => {
                    return Err(CryptoError::Internal(format!(
                        "Cipher cache already holds {key_id}"
                    )))
                }
            }
            return Ok(true);
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.ensure_cipher(key_id, true)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn has_cached_cipher(&self, key_id: &Id) -> bool {
        self.cipher_cache.contains_key(key_id)
            || self.subrings.values().any(|s| s.has_cached_cipher(key_id))
    }

    fn cached_cipher_mut(&mut self, key_id: &Id) -> Option<&mut Cipher> {
        if self.cipher_cache.contains_key(key_id) {
            return self.cipher_cache.get_mut(key_id);
        }
        let child = self
            .subrings
            .iter()
            .find(|(_, s)| s.has_cached_cipher(key_id))
            .map(|(id, _)| *id)?;
        self.subrings.get_mut(&child)?.cached_cipher_mut(key_id)
    }

    // --- MAC keys ------------------------------------------------------------

    pub fn get_mac_key(&self, key_id: &Id, recursive: bool) -> Option<&AsymmetricKey> {
        if let Some(key) = self.mac_keys.get(key_id) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.get_mac_key(key_id, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    pub fn get_mac_key_by<F: Fn(&AsymmetricKey) -> bool>(
        &self,
        predicate: F,
        recursive: bool,
    ) -> Option<&AsymmetricKey> {
        self.mac_key_by(&predicate, recursive)
    }

    fn mac_key_by(
        &self,
        predicate: &dyn Fn(&AsymmetricKey) -> bool,
        recursive: bool,
    ) -> Option<&AsymmetricKey> {
        if let Some(key) = self.mac_keys.values().find(|k| predicate(k)) {
            return Some(key);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(key) = subring.mac_key_by(predicate, true) {
                    return Some(key);
                }
            }
        }
        None
    }

    pub fn add_mac_key(&mut self, key: AsymmetricKey) -> Result<()> {
        if !self.suite.verify_mac_key(&key) {
            return Err(CryptoError::KeyTypeMismatch(format!(
                "Key {} does not fit suite {} as a MAC key",
                key.id(),
                self.suite.name()
            )));
        }
        match self.mac_keys.entry(*key.id()) {
            Entry::Vacant(slot) => {
                slot.insert(key);
                Ok(())
            }
            Entry::Occupied(_) => Err(CryptoError::DuplicateId(key.id().to_string())),
        }
    }

    pub fn drop_mac_key(&mut self, key_id: &Id, recursive: bool) -> bool {
        if self.mac_keys.remove(key_id).is_some() {
            self.mac_cache.remove(key_id);
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_mac_key(key_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_all_mac_keys(&mut self, recursive: bool) {
        self.mac_keys.clear();
        self.mac_cache.clear();
        if recursive {
            for subring in self.subrings.values_mut() {
                subring.drop_all_mac_keys(true);
            }
        }
    }

    /// Cached MAC for the key under `key_id`.
    pub fn get_mac(&mut self, key_id: &Id, recursive: bool) -> Result<Option<&mut Mac>> {
        if self.ensure_mac(key_id, recursive)? {
            Ok(self.cached_mac_mut(key_id))
        } else {
            Ok(None)
        }
    }

    fn ensure_mac(&mut self, key_id: &Id, recursive: bool) -> Result<bool> {
        if self.mac_cache.contains_key(key_id) {
            return Ok(true);
        }
        if let Some(key) = self.get_mac_key(key_id, false).cloned() {
            let mac = self.suite.get_mac(&key)?;
            match self.mac_cache.entry(*key_id) {
                Entry::Vacant(slot) => {
                    slot.insert(mac);
                }
                Entry::Occupied(_) => {
                    return Err(CryptoError::Internal(format!(
                        "MAC cache already holds {key_id}"
                    )))
                }
            }
            return Ok(true);
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.ensure_mac(key_id, true)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn has_cached_mac(&self, key_id: &Id) -> bool {
        self.mac_cache.contains_key(key_id)
            || self.subrings.values().any(|s| s.has_cached_mac(key_id))
    }

    fn cached_mac_mut(&mut self, key_id: &Id) -> Option<&mut Mac> {
        if self.mac_cache.contains_key(key_id) {
            return self.mac_cache.get_mut(key_id);
        }
        let child = self
            .subrings
            .iter()
            .find(|(_, s)| s.has_cached_mac(key_id))
            .map(|(id, _)| *id)?;
        self.subrings.get_mut(&child)?.cached_mac_mut(key_id)
    }

    // --- subrings ------------------------------------------------------------

    pub fn get_subring(&self, subring_id: &Id, recursive: bool) -> Option<&KeyRing> {
        if let Some(subring) = self.subrings.get(subring_id) {
            return Some(subring);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(found) = subring.get_subring(subring_id, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn get_subring_by<F: Fn(&KeyRing) -> bool>(
        &self,
        predicate: F,
        recursive: bool,
    ) -> Option<&KeyRing> {
        self.subring_by(&predicate, recursive)
    }

    fn subring_by(
        &self,
        predicate: &dyn Fn(&KeyRing) -> bool,
        recursive: bool,
    ) -> Option<&KeyRing> {
        if let Some(subring) = self.subrings.values().find(|s| predicate(s)) {
            return Some(subring);
        }
        if recursive {
            for subring in self.subrings.values() {
                if let Some(found) = subring.subring_by(predicate, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn get_subring_mut(&mut self, subring_id: &Id, recursive: bool) -> Option<&mut KeyRing> {
        if self.subrings.contains_key(subring_id) {
            return self.subrings.get_mut(subring_id);
        }
        if recursive {
            let child = self
                .subrings
                .iter()
                .find(|(_, s)| s.get_subring(subring_id, true).is_some())
                .map(|(id, _)| *id)?;
            return self.subrings.get_mut(&child)?.get_subring_mut(subring_id, true);
        }
        None
    }

    pub fn add_subring(&mut self, subring: KeyRing) -> Result<()> {
        match self.subrings.entry(*subring.id()) {
            Entry::Vacant(slot) => {
                slot.insert(subring);
                Ok(())
            }
            Entry::Occupied(_) => Err(CryptoError::DuplicateId(subring.id().to_string())),
        }
    }

    pub fn drop_subring(&mut self, subring_id: &Id, recursive: bool) -> bool {
        if self.subrings.remove(subring_id).is_some() {
            return true;
        }
        if recursive {
            for subring in self.subrings.values_mut() {
                if subring.drop_subring(subring_id, true) {
                    return true;
                }
            }
        }
        false
    }

    pub fn drop_all_subrings(&mut self) {
        self.subrings.clear();
    }

    pub fn subring_ids(&self) -> Vec<Id> {
        self.subrings.keys().copied().collect()
    }

    /// Drop every parameter, key, cache and subring. The suite and master
    /// key stay.
    pub fn clear(&mut self) {
        self.key_exchange_params.clear();
        self.key_exchange_keys.clear();
        self.key_exchange_cache.clear();
        self.authenticator_params.clear();
        self.authenticator_keys.clear();
        self.authenticator_cache.clear();
        self.active_cipher_keys.clear();
        self.retired_cipher_keys.clear();
        self.cipher_cache.clear();
        self.mac_keys.clear();
        self.mac_cache.clear();
        self.subrings.clear();
    }

    // --- persistence ---------------------------------------------------------

    pub fn serialized_size(&self) -> Result<usize> {
        let mut size = serial::header_size(TYPE_TAG, &self.meta) + self.suite.serialized_size();
        size += 4;
        for params in self.key_exchange_params.values() {
            size += params.serialized_size();
        }
        size += 4;
        for key in self.key_exchange_keys.values() {
            size += key.serialized_size()?;
        }
        size += 4;
        for params in self.authenticator_params.values() {
            size += params.serialized_size();
        }
        size += 4;
        for key in self.authenticator_keys.values() {
            size += key.serialized_size()?;
        }
        size += self.master_cipher_key.serialized_size();
        size += 4;
        for key in self.active_cipher_keys.values() {
            size += key.serialized_size();
        }
        size += 4;
        for key in self.retired_cipher_keys.values() {
            size += key.serialized_size();
        }
        size += 4;
        for key in self.mac_keys.values() {
            size += key.serialized_size()?;
        }
        size += 4;
        for subring in self.subrings.values() {
            size += subring.serialized_size()?;
        }
        Ok(size)
    }

    pub fn serialize(&self, enc: &mut Encoder) -> Result<()> {
        serial::write_header(enc, TYPE_TAG, &self.meta);
        self.suite.serialize(enc);
        enc.put_u32(self.key_exchange_params.len() as u32);
        for params in self.key_exchange_params.values() {
            params.serialize(enc);
        }
        enc.put_u32(self.key_exchange_keys.len() as u32);
        for key in self.key_exchange_keys.values() {
            key.serialize(enc)?;
        }
        enc.put_u32(self.authenticator_params.len() as u32);
        for params in self.authenticator_params.values() {
            params.serialize(enc);
        }
        enc.put_u32(self.authenticator_keys.len() as u32);
        for key in self.authenticator_keys.values() {
            key.serialize(enc)?;
        }
        self.master_cipher_key.serialize(enc);
        enc.put_u32(self.active_cipher_keys.len() as u32);
        for key in self.active_cipher_keys.values() {
            key.serialize(enc);
        }
        enc.put_u32(self.retired_cipher_keys.len() as u32);
        for key in self.retired_cipher_keys.values() {
            key.serialize(enc);
        }
        enc.put_u32(self.mac_keys.len() as u32);
        for key in self.mac_keys.values() {
            key.serialize(enc)?;
        }
        enc.put_u32(self.subrings.len() as u32);
        for subring in self.subrings.values() {
            subring.serialize(enc)?;
        }
        Ok(())
    }

    pub fn deserialize(dec: &mut Decoder<'_>) -> Result<Self> {
        let meta = serial::expect_header(dec, TYPE_TAG)?;
        let suite = CipherSuite::deserialize(dec)?;

        let mut key_exchange_params = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let params = Params::deserialize(dec)?;
            if key_exchange_params.insert(*params.id(), params).is_some() {
                return Err(CryptoError::DuplicateId(
                    "Key exchange params collide".into(),
                ));
            }
        }
        let mut key_exchange_keys = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let key = AsymmetricKey::deserialize(dec)?;
            if key_exchange_keys.insert(*key.id(), key).is_some() {
                return Err(CryptoError::DuplicateId("Key exchange keys collide".into()));
            }
        }
        let mut authenticator_params = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let params = Params::deserialize(dec)?;
            if authenticator_params.insert(*params.id(), params).is_some() {
                return Err(CryptoError::DuplicateId(
                    "Authenticator params collide".into(),
                ));
            }
        }
        let mut authenticator_keys = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let key = AsymmetricKey::deserialize(dec)?;
            if authenticator_keys.insert(*key.id(), key).is_some() {
                return Err(CryptoError::DuplicateId(
                    "Authenticator keys collide".into(),
                ));
            }
        }
        let master_cipher_key = SymmetricKey::deserialize(dec)?;
        let mut active_cipher_keys = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let key = SymmetricKey::deserialize(dec)?;
            if active_cipher_keys.insert(*key.id(), key).is_some() {
                return Err(CryptoError::DuplicateId("Active cipher keys collide".into()));
            }
        }
        let mut retired_cipher_keys = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let key = SymmetricKey::deserialize(dec)?;
            if retired_cipher_keys.insert(*key.id(), key).is_some() {
                return Err(CryptoError::DuplicateId(
                    "Retired cipher keys collide".into(),
                ));
            }
        }
        let mut mac_keys = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let key = AsymmetricKey::deserialize(dec)?;
            if mac_keys.insert(*key.id(), key).is_some() {
                return Err(CryptoError::DuplicateId("MAC keys collide".into()));
            }
        }
        let mut subrings = BTreeMap::new();
        for _ in 0..dec.get_u32()? {
            let subring = KeyRing::deserialize(dec)?;
            if subrings.insert(*subring.id(), subring).is_some() {
                return Err(CryptoError::DuplicateId("Subrings collide".into()));
            }
        }

        Ok(Self {
            meta,
            suite,
            master_cipher_key,
            key_exchange_params,
            key_exchange_keys,
            authenticator_params,
            authenticator_keys,
            active_cipher_keys,
            retired_cipher_keys,
            mac_keys,
            subrings,
            key_exchange_cache: BTreeMap::new(),
            authenticator_cache: BTreeMap::new(),
            cipher_cache: BTreeMap::new(),
            mac_cache: BTreeMap::new(),
        })
    }

    /// Serialize the ring and write it to `path`, optionally encrypting the
    /// image with `cipher` first. The plaintext image lives in a
    /// zeroize-on-drop buffer.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        cipher: Option<&mut Cipher>,
        associated_data: &[u8],
    ) -> Result<()> {
        let size = self.serialized_size()?;
        let mut enc = Encoder::with_capacity(size);
        self.serialize(&mut enc)?;
        let image = SecureBytes::new(enc.into_bytes());

        let output = match cipher {
            Some(cipher) => cipher.encrypt(image.as_bytes(), associated_data)?,
            None => image.as_bytes().to_vec(),
        };
        std::fs::write(&path, &output)?;
        debug!(
            ring = %self.meta.id,
            bytes = output.len(),
            encrypted = image.len() != output.len(),
            "saved key ring"
        );
        Ok(())
    }

    /// Read a ring previously written with [`KeyRing::save`].
    pub fn load(
        path: impl AsRef<Path>,
        cipher: Option<&mut Cipher>,
        associated_data: &[u8],
    ) -> Result<Self> {
        let raw = std::fs::read(&path)?;
        let image = match cipher {
            Some(cipher) => cipher.decrypt_secure(&raw, associated_data)?,
            None => SecureBytes::new(raw),
        };
        let mut dec = Decoder::new(image.as_bytes());
        let ring = Self::deserialize(&mut dec)?;
        if !dec.is_empty() {
            return Err(CryptoError::InvalidArgument(format!(
                "Key ring file has {} trailing bytes",
                dec.remaining()
            )));
        }
        debug!(ring = %ring.meta.id, bytes = image.len(), "loaded key ring");
        Ok(ring)
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("id", self.id())
            .field("suite", &self.suite.name())
            .field("active_cipher_keys", &self.active_cipher_keys.len())
            .field("retired_cipher_keys", &self.retired_cipher_keys.len())
            .field("subrings", &self.subrings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestKind;
    use crate::keys::{KeyData, ParamsData};
    use rand::rngs::OsRng;

    const SUITE: &str = "ECDHE_ECDSA_AES-256-GCM_SHA2-512";

    fn ring() -> KeyRing {
        KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "root", "").unwrap()
    }

    fn ec_key() -> AsymmetricKey {
        AsymmetricKey::new(
            KeyData::EcPrivate(p256::SecretKey::random(&mut OsRng)),
            "",
            "",
        )
    }

    fn mac_key() -> AsymmetricKey {
        AsymmetricKey::hmac_key(b"mac secret", b"", DigestKind::Sha2_512, 1, "", "").unwrap()
    }

    fn cipher_key() -> SymmetricKey {
        SymmetricKey::from_random(32).unwrap()
    }

    /// Id sets of every map, compared node by node.
    fn assert_same_shape(a: &KeyRing, b: &KeyRing) {
        assert_eq!(a.id(), b.id());
        assert_eq!(a.suite(), b.suite());
        assert_eq!(a.master_cipher_key.id(), b.master_cipher_key.id());
        assert_eq!(
            a.key_exchange_params.keys().collect::<Vec<_>>(),
            b.key_exchange_params.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            a.key_exchange_keys.keys().collect::<Vec<_>>(),
            b.key_exchange_keys.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            a.authenticator_params.keys().collect::<Vec<_>>(),
            b.authenticator_params.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            a.authenticator_keys.keys().collect::<Vec<_>>(),
            b.authenticator_keys.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            a.active_cipher_keys.keys().collect::<Vec<_>>(),
            b.active_cipher_keys.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            a.retired_cipher_keys.keys().collect::<Vec<_>>(),
            b.retired_cipher_keys.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            a.mac_keys.keys().collect::<Vec<_>>(),
            b.mac_keys.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            a.subrings.keys().collect::<Vec<_>>(),
            b.subrings.keys().collect::<Vec<_>>()
        );
        for (id, subring) in &a.subrings {
            assert_same_shape(subring, &b.subrings[id]);
        }
    }

    #[test]
    fn test_new_generates_master_of_suite_length() {
        let ring = ring();
        assert_eq!(ring.master_cipher_key().len(), 32);
        assert!(ring.suite().verify_cipher_key(ring.master_cipher_key()));
    }

    #[test]
    fn test_new_rejects_bad_master() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let short = SymmetricKey::new(&[0u8; 16], "", "").unwrap();
        assert!(matches!(
            KeyRing::new(suite, Some(short), "", ""),
            Err(CryptoError::KeyTypeMismatch(_))
        ));
    }

    #[test]
    fn test_add_get_drop_cipher_key() {
        let mut ring = ring();
        let key = cipher_key();
        let id = *key.id();
        ring.add_cipher_active_key(key).unwrap();

        assert!(ring.is_active_cipher_key(&id));
        assert!(ring.get_cipher_key(&id, false).is_some());
        assert!(ring.drop_active_cipher_key(&id, false));
        assert!(ring.get_cipher_key(&id, false).is_none());
        assert!(!ring.drop_active_cipher_key(&id, false));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut ring = ring();
        let key = cipher_key();
        ring.add_cipher_active_key(key.clone()).unwrap();
        assert!(matches!(
            ring.add_cipher_active_key(key),
            Err(CryptoError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_incompatible_key_rejected() {
        let mut ring = ring();
        let short = SymmetricKey::new(&[0u8; 16], "", "").unwrap();
        assert!(matches!(
            ring.add_cipher_active_key(short),
            Err(CryptoError::KeyTypeMismatch(_))
        ));

        let dh = Params::new(ParamsData::Dh, "", "").create_key("", "");
        assert!(matches!(
            ring.add_key_exchange_key(dh),
            Err(CryptoError::KeyTypeMismatch(_))
        ));

        let hmac256 =
            AsymmetricKey::hmac_key(b"s", b"", DigestKind::Sha2_256, 1, "", "").unwrap();
        assert!(ring.add_mac_key(hmac256).is_err());
    }

    #[test]
    fn test_master_key_answers_cipher_lookups() {
        let mut ring = ring();
        let master_id = *ring.master_cipher_key().id();
        assert!(ring.get_cipher_key(&master_id, false).is_some());
        assert!(ring.get_cipher(&master_id, false).unwrap().is_some());
    }

    #[test]
    fn test_get_cipher_caches_and_reuses() {
        let mut ring = ring();
        let key = cipher_key();
        let id = *key.id();
        ring.add_cipher_active_key(key).unwrap();

        let record = {
            let cipher = ring.get_cipher(&id, false).unwrap().unwrap();
            cipher.encrypt(b"cached", b"").unwrap()
        };
        // Second lookup returns the same instance: stats carry over.
        let cipher = ring.get_cipher(&id, false).unwrap().unwrap();
        assert_eq!(cipher.encryptor_stats().use_count(), 1);
        assert_eq!(cipher.decrypt(&record, b"").unwrap(), b"cached");
    }

    #[test]
    fn test_get_cipher_recursive_reaches_subring() {
        let mut ring = ring();
        let mut subring =
            KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "child", "").unwrap();
        let key = cipher_key();
        let id = *key.id();
        subring.add_cipher_active_key(key).unwrap();
        ring.add_subring(subring).unwrap();

        assert!(ring.get_cipher(&id, false).unwrap().is_none());
        assert!(ring.get_cipher(&id, true).unwrap().is_some());
        // The cache now answers without descending again.
        assert!(ring.get_cipher(&id, true).unwrap().is_some());
    }

    #[test]
    fn test_retire_moves_key_and_invalidates_cipher() {
        let mut ring = ring();
        let key = cipher_key();
        let id = *key.id();
        ring.add_cipher_active_key(key).unwrap();

        // Build and use a cached cipher, then retire the key.
        let record = {
            let cipher = ring.get_cipher(&id, false).unwrap().unwrap();
            cipher.encrypt(b"rotation traffic", b"").unwrap()
        };
        assert!(ring.retire_active_cipher_key(&id, false).unwrap());
        assert!(!ring.is_active_cipher_key(&id));
        assert!(ring.is_retired_cipher_key(&id));

        // A fresh cipher is materialized (zeroed stats proves invalidation)
        // and can still decrypt traffic produced under the key.
        let cipher = ring.get_cipher(&id, false).unwrap().unwrap();
        assert_eq!(cipher.encryptor_stats().use_count(), 0);
        assert_eq!(cipher.decrypt(&record, b"").unwrap(), b"rotation traffic");
    }

    #[test]
    fn test_recursive_retire_invalidates_parent_cache() {
        let mut ring = ring();
        let mut subring =
            KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "child", "").unwrap();
        let key = cipher_key();
        let id = *key.id();
        subring.add_cipher_active_key(key).unwrap();
        ring.add_subring(subring).unwrap();

        // Materialize the cipher somewhere down the tree, then retire
        // through the root: the root's view must rebuild afterwards.
        {
            let cipher = ring.get_cipher(&id, true).unwrap().unwrap();
            cipher.encrypt(b"x", b"").unwrap();
        }
        assert!(ring.retire_active_cipher_key(&id, true).unwrap());
        let cipher = ring.get_cipher(&id, true).unwrap().unwrap();
        assert_eq!(cipher.encryptor_stats().use_count(), 0);
    }

    #[test]
    fn test_set_master_invalidates_old_cipher() {
        let mut ring = ring();
        let old_id = *ring.master_cipher_key().id();
        {
            let cipher = ring.get_cipher(&old_id, false).unwrap().unwrap();
            cipher.encrypt(b"under old master", b"").unwrap();
        }
        ring.set_master_cipher_key(cipher_key()).unwrap();
        // The old master is gone from the slot and its cipher discarded.
        assert!(ring.get_cipher(&old_id, false).unwrap().is_none());
        let new_id = *ring.master_cipher_key().id();
        assert!(ring.get_cipher(&new_id, false).unwrap().is_some());
    }

    #[test]
    fn test_recursive_lookup_prefers_lowest_subring_id() {
        let mut ring = ring();
        let shared = cipher_key();
        let id = *shared.id();

        let mut a = KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "a", "").unwrap();
        let mut b = KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "b", "").unwrap();
        // Same id in both subrings, distinguishable by name.
        a.add_cipher_active_key(
            SymmetricKey::with_id(id, shared.as_bytes(), "in-a", "").unwrap(),
        )
        .unwrap();
        b.add_cipher_active_key(
            SymmetricKey::with_id(id, shared.as_bytes(), "in-b", "").unwrap(),
        )
        .unwrap();

        let (low, high) = if a.id() < b.id() { (a, b) } else { (b, a) };
        let expected = low
            .get_cipher_key(&id, false)
            .map(|k| k.name().to_string())
            .unwrap();
        ring.add_subring(low).unwrap();
        ring.add_subring(high).unwrap();

        let found = ring.get_cipher_key(&id, true).unwrap();
        assert_eq!(found.name(), expected);
    }

    #[test]
    fn test_predicate_lookup_by_name() {
        let mut ring = ring();
        let key = ec_key();
        let id = *key.id();
        ring.add_authenticator_key(key).unwrap();

        let found = ring.get_authenticator_key_by(|k| k.id() == &id, false);
        assert!(found.is_some());
        assert!(ring
            .get_authenticator_key_by(|k| k.name() == "no such key", true)
            .is_none());
    }

    #[test]
    fn test_get_authenticator_both_ops() {
        let mut ring = ring();
        let key = ec_key();
        let id = *key.id();
        ring.add_authenticator_key(key).unwrap();

        let sig = {
            let signer = ring.get_authenticator(Op::Sign, &id, false).unwrap().unwrap();
            signer.sign_buffer(b"ring signed").unwrap()
        };
        let verifier = ring.get_authenticator(Op::Verify, &id, false).unwrap().unwrap();
        assert!(verifier.verify_buffer_signature(b"ring signed", &sig).unwrap());
    }

    #[test]
    fn test_get_mac_and_key_exchange_objects() {
        let mut ring = ring();
        let mac_key = mac_key();
        let mac_id = *mac_key.id();
        ring.add_mac_key(mac_key).unwrap();

        let tag = {
            let mac = ring.get_mac(&mac_id, false).unwrap().unwrap();
            mac.sign_buffer(b"ring mac").unwrap()
        };
        let mac = ring.get_mac(&mac_id, false).unwrap().unwrap();
        assert!(mac.verify_buffer_signature(b"ring mac", &tag).unwrap());

        let kx_key = ec_key();
        let kx_id = *kx_key.id();
        ring.add_key_exchange_key(kx_key).unwrap();
        let peer = KeyExchange::ephemeral_ecdhe();
        let peer_public = peer.public_key("", "");
        let kx = ring.get_key_exchange(&kx_id, false).unwrap().unwrap();
        let derived = kx
            .derive_shared_symmetric_key(
                &peer_public,
                32,
                b"",
                DigestKind::Sha2_512,
                1,
                "",
                "",
            )
            .unwrap();
        assert_eq!(derived.len(), 32);
    }

    #[test]
    fn test_unknown_id_lookups_return_empty() {
        let mut ring = ring();
        let missing = Id::from_bytes(b"not in the ring");
        assert!(ring.get_cipher_key(&missing, true).is_none());
        assert!(ring.get_authenticator_key(&missing, true).is_none());
        assert!(ring.get_mac_key(&missing, true).is_none());
        assert!(ring.get_cipher(&missing, true).unwrap().is_none());
        assert!(ring
            .get_authenticator(Op::Sign, &missing, true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_serialize_roundtrip_is_byte_identical() {
        let mut ring = ring();
        ring.add_authenticator_key(ec_key()).unwrap();
        ring.add_key_exchange_key(ec_key()).unwrap();
        ring.add_key_exchange_params(Params::new(ParamsData::Ec, "p", ""))
            .unwrap();
        ring.add_cipher_active_key(cipher_key()).unwrap();
        ring.add_mac_key(mac_key()).unwrap();

        let mut enc = Encoder::with_capacity(ring.serialized_size().unwrap());
        ring.serialize(&mut enc).unwrap();
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), ring.serialized_size().unwrap());

        let parsed = KeyRing::deserialize(&mut Decoder::new(&bytes)).unwrap();
        assert_same_shape(&ring, &parsed);

        let mut enc2 = Encoder::with_capacity(parsed.serialized_size().unwrap());
        parsed.serialize(&mut enc2).unwrap();
        assert_eq!(enc2.into_bytes(), bytes);
    }

    #[test]
    fn test_plain_ring_file_roundtrip() {
        let mut ring = ring();
        ring.add_authenticator_key(ec_key()).unwrap();
        let empty =
            KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "empty", "").unwrap();
        let mut with_mac =
            KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "macs", "").unwrap();
        with_mac.add_mac_key(mac_key()).unwrap();
        ring.add_subring(empty).unwrap();
        ring.add_subring(with_mac).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.bin");
        ring.save(&path, None, b"").unwrap();
        let loaded = KeyRing::load(&path, None, b"").unwrap();
        assert_same_shape(&ring, &loaded);
    }

    #[test]
    fn test_password_wrapped_ring_roundtrip() {
        let suite = CipherSuite::parse(SUITE).unwrap();
        let mut ring = ring();
        ring.add_cipher_active_key(cipher_key()).unwrap();

        let wrap_key = |password: &[u8]| {
            SymmetricKey::from_secret_and_salt(
                32,
                password,
                password,
                DigestKind::Sha2_256,
                1000,
                "",
                "",
            )
            .unwrap()
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.sealed");
        let mut seal = suite.get_cipher(&wrap_key(b"correct horse")).unwrap();
        ring.save(&path, Some(&mut seal), b"ring").unwrap();

        let mut open = suite.get_cipher(&wrap_key(b"correct horse")).unwrap();
        let loaded = KeyRing::load(&path, Some(&mut open), b"ring").unwrap();
        assert_same_shape(&ring, &loaded);

        let mut wrong = suite.get_cipher(&wrap_key(b"correct hoRse")).unwrap();
        assert!(matches!(
            KeyRing::load(&path, Some(&mut wrong), b"ring"),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_clear_empties_everything_but_master() {
        let mut ring = ring();
        ring.add_cipher_active_key(cipher_key()).unwrap();
        ring.add_mac_key(mac_key()).unwrap();
        ring.add_subring(
            KeyRing::new(CipherSuite::parse(SUITE).unwrap(), None, "", "").unwrap(),
        )
        .unwrap();

        ring.clear();
        assert!(ring.active_cipher_keys.is_empty());
        assert!(ring.mac_keys.is_empty());
        assert!(ring.subrings.is_empty());
        // Master survives.
        let master_id = *ring.master_cipher_key().id();
        assert!(ring.get_cipher_key(&master_id, false).is_some());
    }

    #[test]
    fn test_drop_bulk_variants() {
        let mut ring = ring();
        let active = cipher_key();
        let retiring = cipher_key();
        let retiring_id = *retiring.id();
        ring.add_cipher_active_key(active).unwrap();
        ring.add_cipher_active_key(retiring).unwrap();
        ring.retire_active_cipher_key(&retiring_id, false).unwrap();

        ring.drop_active_cipher_keys(false);
        assert!(ring.active_cipher_keys.is_empty());
        assert!(ring.is_retired_cipher_key(&retiring_id));

        ring.drop_retired_cipher_keys(false);
        assert!(ring.retired_cipher_keys.is_empty());
    }
}
