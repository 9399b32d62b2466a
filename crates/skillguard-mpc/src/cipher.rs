//! Feature encryption for MPC submission.
//!
//! Each scoring call uses a fresh X25519 key pair. The shared secret with the
//! MXE's public key is stretched with BLAKE3 into an AES-256-GCM key, and every
//! fixed-point feature is sealed separately so the network can address them as
//! individual ciphertexts.
//!
//! # Wire format
//! ```text
//! feature i: AES-256-GCM(key, nonce ^ i, u16_le)   (2 bytes + 16 byte tag)
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use curve25519_dalek::montgomery::MontgomeryPoint;
use rand::RngCore;
use zeroize::Zeroizing;

use skillguard_core::constants::MPC_SCALE;
use skillguard_core::error::MpcError;
use skillguard_core::scoring::clamp_unit;
use skillguard_core::types::PairFeatures;

/// BLAKE3 KDF context for the per-session feature key.
const KDF_CONTEXT: &str = "skillguard-mpc-feature-cipher-v1";

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Number of encrypted pair features.
pub const FEATURE_COUNT: usize = 5;

/// Scale a `[0, 1]` feature to `0..=MPC_SCALE`.
pub fn scale_u16(value: f64) -> u16 {
    (clamp_unit(value) * MPC_SCALE as f64).round() as u16
}

/// Inverse of [`scale_u16`].
pub fn unscale(value: u16) -> f64 {
    clamp_unit(value as f64 / MPC_SCALE as f64)
}

/// Fixed-point features in circuit order.
pub fn plaintext(f: &PairFeatures) -> [u16; FEATURE_COUNT] {
    [
        scale_u16(f.time_in_proximity),
        scale_u16(f.non_aggression),
        scale_u16(f.farm_loop),
        scale_u16(f.damage_symmetry),
        scale_u16(f.repeated_encounters_normalized),
    ]
}

/// Nonce for the `index`-th value of a batch.
fn value_nonce(base: &[u8; NONCE_LEN], index: u32) -> [u8; NONCE_LEN] {
    let mut nonce = *base;
    for (b, i) in nonce[NONCE_LEN - 4..].iter_mut().zip(index.to_le_bytes()) {
        *b ^= i;
    }
    nonce
}

pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// One side of an X25519 session and the derived symmetric key.
pub struct SessionCipher {
    public_key: [u8; 32],
    key: Zeroizing<[u8; 32]>,
}

impl SessionCipher {
    /// Derive a session from our secret scalar and the peer's public key.
    /// Both sides of the exchange get the same symmetric key.
    pub fn derive(secret: &[u8; 32], peer_public: &[u8; 32]) -> Result<Self, MpcError> {
        let public_key = MontgomeryPoint::mul_base_clamped(*secret).to_bytes();
        let shared = Zeroizing::new(MontgomeryPoint(*peer_public).mul_clamped(*secret).to_bytes());
        if shared.iter().all(|b| *b == 0) {
            return Err(MpcError::Crypto("peer public key is a low-order point".into()));
        }
        let key = Zeroizing::new(blake3::derive_key(KDF_CONTEXT, shared.as_ref()));
        Ok(Self { public_key, key })
    }

    /// Fresh ephemeral session against the MXE's public key.
    pub fn ephemeral(mxe_public: &[u8; 32]) -> Result<Self, MpcError> {
        let mut secret = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(secret.as_mut());
        Self::derive(&secret, mxe_public)
    }

    /// Our public key, sent alongside the ciphertexts.
    pub fn public_key(&self) -> [u8; 32] {
        self.public_key
    }

    fn aead(&self) -> Result<Aes256Gcm, MpcError> {
        Aes256Gcm::new_from_slice(self.key.as_ref()).map_err(|e| MpcError::Crypto(e.to_string()))
    }

    /// Seal each value under its own derived nonce.
    pub fn encrypt(&self, values: &[u16], nonce: &[u8; NONCE_LEN]) -> Result<Vec<Vec<u8>>, MpcError> {
        let aead = self.aead()?;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let n = value_nonce(nonce, i as u32);
                aead.encrypt(Nonce::from_slice(&n), v.to_le_bytes().as_ref())
                    .map_err(|e| MpcError::Crypto(e.to_string()))
            })
            .collect()
    }

    /// Open the `index`-th value of a batch sealed with `nonce`.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_LEN], index: u32) -> Result<u16, MpcError> {
        let aead = self.aead()?;
        let n = value_nonce(nonce, index);
        let plain = aead
            .decrypt(Nonce::from_slice(&n), ciphertext)
            .map_err(|e| MpcError::Crypto(e.to_string()))?;
        let bytes: [u8; 2] = plain
            .as_slice()
            .try_into()
            .map_err(|_| MpcError::MalformedResponse(format!("expected 2 plaintext bytes, got {}", plain.len())))?;
        Ok(u16::from_le_bytes(bytes))
    }
}

/// Parse a hex-encoded 32-byte key.
pub fn parse_key(hex_str: &str) -> Result<[u8; 32], MpcError> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| MpcError::MalformedResponse(format!("key is not hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| MpcError::MalformedResponse(format!("key must be 32 bytes, got {}", b.len())))
}

/// Parse a hex-encoded nonce.
pub fn parse_nonce(hex_str: &str) -> Result<[u8; NONCE_LEN], MpcError> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| MpcError::MalformedResponse(format!("nonce is not hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| MpcError::MalformedResponse(format!("nonce must be {NONCE_LEN} bytes, got {}", b.len())))
}
