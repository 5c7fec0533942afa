// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS cookie sealing under rotating master keys (RFC 8915 §6).
//!
//! A cookie is opaque to the client and carries everything the server needs
//! to recover a session's keys, so the server keeps no per-client state:
//!
//! ```text
//! key_id (4) || nonce (16) || AES-SIV-CMAC-512(master, ad = [key_id], nonce, plaintext)
//!
//! plaintext = aead_id (2) || reserved (2) || c2s || s2c
//! ```

use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;
use zeroize::Zeroizing;

use ntsec_proto::CryptoError;
use ntsec_proto::crypto::{AeadAlgorithm, AesSivKey};
use ntsec_proto::ke::SessionKeys;
use ntsec_proto::nts::EntropySource;

/// Length of the master key id prefix.
pub const KEY_ID_LEN: usize = 4;
/// Length of the per-cookie nonce.
pub const COOKIE_NONCE_LEN: usize = 16;
/// Master keys are AES-SIV-CMAC-512 keys.
pub const MASTER_KEY_LEN: usize = 64;

const PLAINTEXT_HEADER_LEN: usize = 4;
const SIV_LEN: usize = 16;

/// Default time a retired master key keeps opening cookies.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Length of a cookie carrying keys for `algorithm`.
pub fn cookie_len(algorithm: AeadAlgorithm) -> usize {
    KEY_ID_LEN + COOKIE_NONCE_LEN + SIV_LEN + PLAINTEXT_HEADER_LEN + 2 * algorithm.key_len()
}

/// A master key for cookie encryption.
struct MasterKey {
    key_id: u32,
    key: Zeroizing<[u8; MASTER_KEY_LEN]>,
    created: Instant,
}

impl MasterKey {
    fn generate(key_id: u32) -> Self {
        let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        rand::fill(&mut key[..]);
        MasterKey {
            key_id,
            key,
            created: Instant::now(),
        }
    }

    fn cipher(&self) -> Result<AesSivKey, CryptoError> {
        AeadAlgorithm::AesSivCmac512.key(&self.key[..])
    }
}

/// The current master key plus recently retired ones.
///
/// Cookies are always sealed with the current key. Retired keys still open
/// cookies until their grace period expires, so clients holding cookies
/// issued just before a rotation are not forced back through NTS-KE.
pub struct MasterKeyStore {
    current: MasterKey,
    /// Retired keys, newest first, with the time they were retired.
    retired: Vec<(MasterKey, Instant)>,
    grace_period: Duration,
    next_key_id: u32,
}

impl std::fmt::Debug for MasterKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyStore")
            .field("current_key_id", &self.current.key_id)
            .field("retired", &self.retired.len())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

impl MasterKeyStore {
    /// Create a store with a freshly generated master key.
    pub fn new(grace_period: Duration) -> Self {
        let first_id: u32 = rand::random();
        MasterKeyStore {
            current: MasterKey::generate(first_id),
            retired: Vec::new(),
            grace_period,
            next_key_id: first_id.wrapping_add(1),
        }
    }

    /// Id of the key new cookies are sealed with.
    pub fn current_key_id(&self) -> u32 {
        self.current.key_id
    }

    /// Age of the current key.
    pub fn current_key_age(&self) -> Duration {
        self.current.created.elapsed()
    }

    /// Number of retired keys still inside their grace period.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Generate a new current key and retire the old one.
    pub fn rotate(&mut self) {
        let key_id = self.next_key_id;
        self.next_key_id = self.next_key_id.wrapping_add(1);
        let old = std::mem::replace(&mut self.current, MasterKey::generate(key_id));
        debug!(old_key_id = old.key_id, new_key_id = key_id, "rotated NTS master key");
        self.retired.insert(0, (old, Instant::now()));
        self.purge_expired();
    }

    /// Drop retired keys whose grace period has passed.
    pub fn purge_expired(&mut self) {
        let grace = self.grace_period;
        let before = self.retired.len();
        self.retired.retain(|(_, retired_at)| retired_at.elapsed() < grace);
        let purged = before - self.retired.len();
        if purged > 0 {
            debug!(purged, "purged expired NTS master keys");
        }
    }

    fn find_key(&self, key_id: u32) -> Option<&MasterKey> {
        if self.current.key_id == key_id {
            return Some(&self.current);
        }
        self.retired
            .iter()
            .find(|(key, retired_at)| {
                key.key_id == key_id && retired_at.elapsed() < self.grace_period
            })
            .map(|(key, _)| key)
    }

    /// Seal session keys into a cookie under the current master key.
    pub fn encrypt_cookie(
        &self,
        keys: &SessionKeys,
        entropy: &mut dyn EntropySource,
    ) -> Result<Vec<u8>, CryptoError> {
        let c2s = keys.c2s.as_bytes();
        let s2c = keys.s2c.as_bytes();
        let mut plaintext =
            Zeroizing::new(Vec::with_capacity(PLAINTEXT_HEADER_LEN + c2s.len() + s2c.len()));
        plaintext.extend_from_slice(&keys.algorithm.id().to_be_bytes());
        plaintext.extend_from_slice(&[0, 0]);
        plaintext.extend_from_slice(c2s);
        plaintext.extend_from_slice(s2c);

        let key_id = self.current.key_id.to_be_bytes();
        let mut nonce = [0u8; COOKIE_NONCE_LEN];
        entropy.fill_bytes(&mut nonce);
        let sealed = self.current.cipher()?.encrypt(&[&key_id[..]], &nonce, &plaintext)?;

        let mut cookie = Vec::with_capacity(KEY_ID_LEN + COOKIE_NONCE_LEN + sealed.len());
        cookie.extend_from_slice(&key_id);
        cookie.extend_from_slice(&nonce);
        cookie.extend_from_slice(&sealed);
        Ok(cookie)
    }

    /// Open a cookie, recovering the session keys.
    ///
    /// Returns `None` for unknown or expired key ids, tampered cookies and
    /// malformed plaintexts alike.
    pub fn decrypt_cookie(&self, cookie: &[u8]) -> Option<SessionKeys> {
        if cookie.len() < KEY_ID_LEN + COOKIE_NONCE_LEN + SIV_LEN + PLAINTEXT_HEADER_LEN {
            debug!(len = cookie.len(), "cookie too short");
            return None;
        }
        let (key_id, rest) = cookie.split_at(KEY_ID_LEN);
        let (nonce, sealed) = rest.split_at(COOKIE_NONCE_LEN);

        let Some(master) = self.find_key(BigEndian::read_u32(key_id)) else {
            debug!(key_id = BigEndian::read_u32(key_id), "cookie sealed under unknown key");
            return None;
        };
        let plaintext = match master.cipher().ok()?.decrypt(&[key_id], nonce, sealed) {
            Ok(pt) => Zeroizing::new(pt),
            Err(_) => {
                debug!("cookie failed authentication");
                return None;
            }
        };

        let algorithm = AeadAlgorithm::from_id(BigEndian::read_u16(&plaintext[0..2]))?;
        let keys = &plaintext[PLAINTEXT_HEADER_LEN..];
        if keys.len() != 2 * algorithm.key_len() {
            return None;
        }
        let (c2s, s2c) = keys.split_at(algorithm.key_len());
        Some(SessionKeys {
            algorithm,
            c2s: algorithm.key(c2s).ok()?,
            s2c: algorithm.key(s2c).ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntsec_proto::nts::{CountingEntropy, OsEntropy};

    fn session_keys(algorithm: AeadAlgorithm) -> SessionKeys {
        let len = algorithm.key_len();
        SessionKeys {
            algorithm,
            c2s: algorithm.key(&vec![0x11; len]).unwrap(),
            s2c: algorithm.key(&vec![0x22; len]).unwrap(),
        }
    }

    #[test]
    fn test_cookie_roundtrip_256() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let cookie = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();

        let opened = store.decrypt_cookie(&cookie).unwrap();
        assert_eq!(opened.algorithm, AeadAlgorithm::AesSivCmac256);
        assert_eq!(opened.c2s.as_bytes(), keys.c2s.as_bytes());
        assert_eq!(opened.s2c.as_bytes(), keys.s2c.as_bytes());
    }

    #[test]
    fn test_cookie_roundtrip_512() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac512);
        let cookie = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        assert_eq!(cookie.len(), cookie_len(AeadAlgorithm::AesSivCmac512));
        let opened = store.decrypt_cookie(&cookie).unwrap();
        assert_eq!(opened.algorithm, AeadAlgorithm::AesSivCmac512);
        assert_eq!(opened.s2c.as_bytes(), keys.s2c.as_bytes());
    }

    #[test]
    fn test_cookie_layout() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let cookie = store
            .encrypt_cookie(&keys, &mut CountingEntropy::new(5))
            .unwrap();
        // key id, nonce, SIV, then 4 + 2 * 32 bytes of ciphertext.
        assert_eq!(cookie.len(), 4 + 16 + 16 + 68);
        assert_eq!(cookie.len(), cookie_len(AeadAlgorithm::AesSivCmac256));
        assert_eq!(cookie.len() % 4, 0);
        assert_eq!(BigEndian::read_u32(&cookie[..4]), store.current_key_id());
        assert_eq!(&cookie[4..12], &5u64.to_be_bytes());
        assert_eq!(&cookie[12..20], &6u64.to_be_bytes());
    }

    #[test]
    fn test_cookies_are_unlinkable() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let a = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        let b = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        assert_ne!(a[KEY_ID_LEN..], b[KEY_ID_LEN..]);
    }

    #[test]
    fn test_tampered_cookie() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let mut cookie = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        let last = cookie.len() - 1;
        cookie[last] ^= 0x01;
        assert!(store.decrypt_cookie(&cookie).is_none());
    }

    #[test]
    fn test_cookie_too_short() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        assert!(store.decrypt_cookie(&[0u8; 10]).is_none());
        assert!(store.decrypt_cookie(&[]).is_none());
    }

    #[test]
    fn test_unknown_key_id() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let mut cookie = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        let bogus = store.current_key_id().wrapping_add(1000);
        cookie[..4].copy_from_slice(&bogus.to_be_bytes());
        assert!(store.decrypt_cookie(&cookie).is_none());
    }

    #[test]
    fn test_cookie_from_other_store_rejected() {
        let a = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let mut b = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let cookie = a.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        // Make b's current key id collide with a's; the key material still differs.
        while b.current_key_id() != a.current_key_id() {
            b.next_key_id = a.current_key_id();
            b.rotate();
        }
        assert!(b.decrypt_cookie(&cookie).is_none());
    }

    #[test]
    fn test_rotation_keeps_retired_keys_within_grace() {
        let mut store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let old_id = store.current_key_id();
        let cookie = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();

        store.rotate();
        assert_ne!(store.current_key_id(), old_id);
        assert_eq!(store.retired_count(), 1);
        assert!(store.decrypt_cookie(&cookie).is_some());

        let fresh = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        assert_eq!(BigEndian::read_u32(&fresh[..4]), store.current_key_id());
    }

    #[test]
    fn test_rotation_without_grace_drops_old_keys() {
        let mut store = MasterKeyStore::new(Duration::ZERO);
        let keys = session_keys(AeadAlgorithm::AesSivCmac256);
        let cookie = store.encrypt_cookie(&keys, &mut OsEntropy).unwrap();
        store.rotate();
        assert_eq!(store.retired_count(), 0);
        assert!(store.decrypt_cookie(&cookie).is_none());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let store = MasterKeyStore::new(DEFAULT_GRACE_PERIOD);
        let rendered = format!("{store:?}");
        assert!(rendered.contains("current_key_id"));
        assert!(!rendered.contains("key:"));
    }
}
