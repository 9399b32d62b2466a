//! Device fingerprint correlation.
//!
//! Clients submit an opaque device token on connect. Only a salted
//! HMAC-SHA256 of it is kept: the raw token is never stored or logged. The
//! salt rotates every `salt_rotation_ms`; the previous salt is retained for
//! one period so [`DeviceRegistry::verify_token`] accepts recent hashes.
//!
//! Hashes are not recomputed after a rotation, so two registrations only
//! correlate when they happened in the same salt epoch.

use std::collections::{BTreeSet, HashMap};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use skillguard_core::config::RiskConfig;
use skillguard_core::error::DeviceTokenError;
use skillguard_core::types::PlayerId;

use crate::anomaly::PlayerAnomalyTracker;

type HmacSha256 = Hmac<Sha256>;

/// Salt length in random bytes (hex-encoded before use as the HMAC key).
const SALT_LEN: usize = 32;

fn fresh_salt() -> Zeroizing<String> {
    let mut bytes = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let salt = Zeroizing::new(hex::encode(bytes));
    bytes.zeroize();
    salt
}

fn hmac_hex(salt: &str, raw: &str) -> Result<String, DeviceTokenError> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .map_err(|e| DeviceTokenError::Hmac(e.to_string()))?;
    mac.update(raw.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn hmac_matches(salt: &str, raw: &str, expected: &[u8]) -> bool {
    match HmacSha256::new_from_slice(salt.as_bytes()) {
        Ok(mut mac) => {
            mac.update(raw.as_bytes());
            mac.verify_slice(expected).is_ok()
        }
        Err(_) => false,
    }
}

/// Token hash -> wallets seen with it, plus the rotating HMAC salt.
pub struct DeviceRegistry {
    rotation_ms: u64,
    min_len: usize,
    current_salt: Zeroizing<String>,
    previous_salt: Option<Zeroizing<String>>,
    rotated_at: u64,
    hash_to_wallets: HashMap<String, BTreeSet<String>>,
}

impl DeviceRegistry {
    pub fn new(config: &RiskConfig, now: u64) -> Self {
        Self {
            rotation_ms: config.salt_rotation_ms,
            min_len: config.device_token_min_len,
            current_salt: fresh_salt(),
            previous_salt: None,
            rotated_at: now,
            hash_to_wallets: HashMap::new(),
        }
    }

    /// Rotate the salt once the current one is older than the rotation
    /// interval. Returns whether a rotation happened.
    pub fn rotate_salt_if_needed(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.rotated_at) <= self.rotation_ms {
            return false;
        }
        let retired = std::mem::replace(&mut self.current_salt, fresh_salt());
        self.previous_salt = Some(retired);
        self.rotated_at = now;
        info!("device_token: salt rotated");
        true
    }

    /// Salted hash of a raw token under the current salt.
    pub fn hash_token(&mut self, raw: &str, now: u64) -> Result<String, DeviceTokenError> {
        if raw.chars().count() < self.min_len {
            return Err(DeviceTokenError::TooShort {
                len: raw.chars().count(),
                min: self.min_len,
            });
        }
        self.rotate_salt_if_needed(now);
        hmac_hex(&self.current_salt, raw)
    }

    /// Hash `raw`, store the hash on the player's anomaly record and link it
    /// to `wallet`. Undersized tokens are rejected with no state touched.
    pub fn register(
        &mut self,
        anomaly: &mut PlayerAnomalyTracker,
        player: &PlayerId,
        raw: &str,
        wallet: Option<&str>,
        now: u64,
    ) -> Result<String, DeviceTokenError> {
        let hash = self.hash_token(raw, now)?;
        anomaly.set_device_token_hash(player, hash.clone());

        if let Some(wallet) = wallet {
            let wallets = self.hash_to_wallets.entry(hash.clone()).or_default();
            if wallets.insert(wallet.to_string()) && wallets.len() > 1 {
                info!(player = %player, wallets = wallets.len(),
                    "device_token: device shared across wallets");
            }
        }
        debug!(player = %player, has_wallet = wallet.is_some(), "device_token: registered");
        Ok(hash)
    }

    /// `true` if `hash` is the HMAC of `raw` under the current or the
    /// previous salt.
    pub fn verify_token(&self, raw: &str, hash: &str) -> bool {
        let Ok(expected) = hex::decode(hash) else {
            return false;
        };
        if hmac_matches(&self.current_salt, raw, &expected) {
            return true;
        }
        self.previous_salt
            .as_ref()
            .is_some_and(|salt| hmac_matches(salt, raw, &expected))
    }

    /// Wallets that share `hash`, if more than one does.
    pub fn shared_device_wallets(&self, hash: &str) -> Option<Vec<String>> {
        self.hash_to_wallets
            .get(hash)
            .filter(|wallets| wallets.len() > 1)
            .map(|wallets| wallets.iter().cloned().collect())
    }

    /// Compare the hashes stored on two players' records. Never recomputes.
    pub fn players_share_device(anomaly: &PlayerAnomalyTracker, a: &PlayerId, b: &PlayerId) -> bool {
        match (anomaly.device_token_hash(a), anomaly.device_token_hash(b)) {
            (Some(ha), Some(hb)) => ha == hb,
            _ => false,
        }
    }

    pub fn rotated_at(&self) -> u64 {
        self.rotated_at
    }

    pub fn known_hashes(&self) -> usize {
        self.hash_to_wallets.len()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("rotated_at", &self.rotated_at)
            .field("has_previous_salt", &self.previous_salt.is_some())
            .field("known_hashes", &self.hash_to_wallets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_A: &str = "device-token-aaaaaaaa";
    const TOKEN_B: &str = "device-token-bbbbbbbb";

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn setup() -> (DeviceRegistry, PlayerAnomalyTracker) {
        (
            DeviceRegistry::new(&RiskConfig::default(), 0),
            PlayerAnomalyTracker::default(),
        )
    }

    #[test]
    fn short_token_rejected_without_state() {
        let (mut reg, mut anomaly) = setup();
        let err = reg.register(&mut anomaly, &pid("p"), "short", Some("W"), 0).unwrap_err();
        assert_eq!(err, DeviceTokenError::TooShort { len: 5, min: 16 });
        assert!(anomaly.record(&pid("p")).is_none());
        assert_eq!(reg.known_hashes(), 0);
    }

    #[test]
    fn hash_is_hex_sha256_and_stable() {
        let (mut reg, mut anomaly) = setup();
        let h1 = reg.register(&mut anomaly, &pid("p"), TOKEN_A, None, 0).unwrap();
        let h2 = reg.hash_token(TOKEN_A, 10).unwrap();
        assert_eq!(h1.len(), 64);
        assert_eq!(h1, h2);
        assert!(!h1.contains(TOKEN_A));
        assert_eq!(anomaly.device_token_hash(&pid("p")), Some(h1.as_str()));
    }

    #[test]
    fn shared_wallets_reported_only_when_multiple() {
        let (mut reg, mut anomaly) = setup();
        let h = reg.register(&mut anomaly, &pid("p1"), TOKEN_A, Some("W1"), 0).unwrap();
        assert_eq!(reg.shared_device_wallets(&h), None);
        reg.register(&mut anomaly, &pid("p1"), TOKEN_A, Some("W1"), 1).unwrap();
        assert_eq!(reg.shared_device_wallets(&h), None);
        reg.register(&mut anomaly, &pid("p2"), TOKEN_A, Some("W2"), 2).unwrap();
        assert_eq!(
            reg.shared_device_wallets(&h),
            Some(vec!["W1".to_string(), "W2".to_string()])
        );
    }

    #[test]
    fn players_share_device_compares_stored_hashes() {
        let (mut reg, mut anomaly) = setup();
        reg.register(&mut anomaly, &pid("a"), TOKEN_A, None, 0).unwrap();
        reg.register(&mut anomaly, &pid("b"), TOKEN_A, None, 0).unwrap();
        reg.register(&mut anomaly, &pid("c"), TOKEN_B, None, 0).unwrap();
        assert!(DeviceRegistry::players_share_device(&anomaly, &pid("a"), &pid("b")));
        assert!(!DeviceRegistry::players_share_device(&anomaly, &pid("a"), &pid("c")));
        assert!(!DeviceRegistry::players_share_device(&anomaly, &pid("a"), &pid("zed")));
    }

    #[test]
    fn rotation_breaks_cross_epoch_correlation() {
        let (mut reg, mut anomaly) = setup();
        let day = RiskConfig::default().salt_rotation_ms;
        let before = reg.register(&mut anomaly, &pid("a"), TOKEN_A, None, 0).unwrap();
        let after = reg.register(&mut anomaly, &pid("b"), TOKEN_A, None, day + 1).unwrap();
        assert_ne!(before, after);
        assert_eq!(reg.rotated_at(), day + 1);
        assert!(!DeviceRegistry::players_share_device(&anomaly, &pid("a"), &pid("b")));
    }

    #[test]
    fn verify_accepts_current_and_previous_salt() {
        let (mut reg, _) = setup();
        let day = RiskConfig::default().salt_rotation_ms;
        let old = reg.hash_token(TOKEN_A, 0).unwrap();
        assert!(reg.verify_token(TOKEN_A, &old));
        assert!(!reg.verify_token(TOKEN_B, &old));

        assert!(reg.rotate_salt_if_needed(day + 1));
        assert!(reg.verify_token(TOKEN_A, &old));

        assert!(reg.rotate_salt_if_needed(2 * day + 2));
        assert!(!reg.verify_token(TOKEN_A, &old));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        let (reg, _) = setup();
        assert!(!reg.verify_token(TOKEN_A, "not-hex"));
    }

    #[test]
    fn no_rotation_inside_interval() {
        let (mut reg, _) = setup();
        let day = RiskConfig::default().salt_rotation_ms;
        assert!(!reg.rotate_salt_if_needed(day));
    }
}
