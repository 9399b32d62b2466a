//! Transport to the MPC network.
//!
//! [`MpcGateway`] is the seam between [`MpcClient`](crate::client::MpcClient)
//! and whatever relays computations to the MXE (the MPC execution cluster):
//!
//! - [`RpcGateway`]: JSON-RPC 2.0 over HTTP to a relay node
//! - [`LoopbackGateway`]: in-process MXE emulator, for simulations and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use curve25519_dalek::montgomery::MontgomeryPoint;
use parking_lot::Mutex;
use rand::RngCore;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use zeroize::Zeroizing;

use skillguard_core::config::PairWeights;
use skillguard_core::constants::MPC_SCALE;
use skillguard_core::error::MpcError;

use crate::cipher::{self, FEATURE_COUNT, SessionCipher};
use crate::config::MpcConfig;

/// Encrypted `score_pair` computation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePairRequest {
    pub program_id: String,
    /// Client-chosen identifier of this computation.
    pub computation_offset: u64,
    /// Hex ciphertexts in circuit order.
    pub ciphertexts: Vec<String>,
    /// Hex X25519 public key of the submitting session.
    pub public_key: String,
    pub nonce: String,
}

/// Queued computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub program_id: String,
    pub tx_signature: String,
    pub computation_offset: u64,
}

/// Finalized computation carrying the encrypted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalization {
    pub finalize_signature: String,
    pub encrypted_score: String,
    pub nonce: String,
}

#[async_trait]
pub trait MpcGateway: Send + Sync {
    /// X25519 public key of the MXE serving `program_id`.
    async fn mxe_public_key(&self, program_id: &str) -> Result<[u8; 32], MpcError>;

    async fn submit(&self, request: &ScorePairRequest) -> Result<Submission, MpcError>;

    /// Wait until the computation is finalized. May block for a long time;
    /// callers bound it with a timeout.
    async fn await_finalization(&self, submission: &Submission) -> Result<Finalization, MpcError>;
}

// ---------------------------------------------------------------------------
// JSON-RPC gateway
// ---------------------------------------------------------------------------

pub struct RpcGateway {
    client: Client,
    endpoint: String,
}

impl RpcGateway {
    pub fn new(config: &MpcConfig) -> Result<Self, MpcError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| MpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.rpc_url.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, MpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        let resp: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MpcError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| MpcError::MalformedResponse(e.to_string()))?;

        if let Some(err) = resp.get("error") {
            if !err.is_null() {
                return Err(MpcError::Rpc(format!("{method}: {err}")));
            }
        }
        serde_json::from_value(resp["result"].clone())
            .map_err(|e| MpcError::MalformedResponse(format!("{method}: {e}")))
    }
}

#[async_trait]
impl MpcGateway for RpcGateway {
    async fn mxe_public_key(&self, program_id: &str) -> Result<[u8; 32], MpcError> {
        let key: String = self.call("arcium_getMxePublicKey", json!([program_id])).await?;
        cipher::parse_key(&key)
    }

    async fn submit(&self, request: &ScorePairRequest) -> Result<Submission, MpcError> {
        self.call("arcium_submitScorePair", json!([request])).await
    }

    async fn await_finalization(&self, submission: &Submission) -> Result<Finalization, MpcError> {
        self.call(
            "arcium_awaitComputationFinalization",
            json!([submission.program_id, submission.computation_offset]),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Loopback gateway
// ---------------------------------------------------------------------------

/// In-process MXE: decrypts submitted features, evaluates the weighted sum
/// in fixed point and returns the encrypted result, like the deployed circuit.
pub struct LoopbackGateway {
    secret: Zeroizing<[u8; 32]>,
    public_key: [u8; 32],
    /// Pair weights in fixed point, circuit order.
    weights: [u32; FEATURE_COUNT],
    pending: Mutex<HashMap<u64, ScorePairRequest>>,
    signatures: AtomicU64,
}

impl LoopbackGateway {
    pub fn new(weights: &PairWeights) -> Self {
        let mut secret = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(secret.as_mut());
        let public_key = MontgomeryPoint::mul_base_clamped(*secret).to_bytes();
        let scale = MPC_SCALE as f64;
        let fixed = |w: f64| (w * scale).round().max(0.0) as u32;
        Self {
            secret,
            public_key,
            weights: [
                fixed(weights.proximity),
                fixed(weights.non_aggression),
                fixed(weights.farm_loop),
                fixed(weights.damage_symmetry),
                fixed(weights.repeated_encounter),
            ],
            pending: Mutex::new(HashMap::new()),
            signatures: AtomicU64::new(0),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn signature(&self, kind: &str) -> String {
        let n = self.signatures.fetch_add(1, Ordering::Relaxed);
        format!("loopback-{kind}-{n:08}")
    }

    fn evaluate(&self, request: &ScorePairRequest) -> Result<Finalization, MpcError> {
        let client_key = cipher::parse_key(&request.public_key)?;
        let nonce = cipher::parse_nonce(&request.nonce)?;
        let session = SessionCipher::derive(&self.secret, &client_key)?;

        if request.ciphertexts.len() != FEATURE_COUNT {
            return Err(MpcError::MalformedResponse(format!(
                "expected {FEATURE_COUNT} ciphertexts, got {}",
                request.ciphertexts.len()
            )));
        }
        let mut acc: u64 = 0;
        for (i, (ct, w)) in request.ciphertexts.iter().zip(self.weights).enumerate() {
            let bytes = hex::decode(ct).map_err(|e| MpcError::MalformedResponse(e.to_string()))?;
            let x = session.decrypt(&bytes, &nonce, i as u32)?.min(MPC_SCALE);
            acc += x as u64 * w as u64;
        }
        let score = (acc / MPC_SCALE as u64).min(MPC_SCALE as u64) as u16;

        let out_nonce = cipher::random_nonce();
        let sealed = session.encrypt(&[score], &out_nonce)?;
        let encrypted_score = sealed
            .first()
            .map(hex::encode)
            .ok_or_else(|| MpcError::Crypto("empty result ciphertext".into()))?;
        Ok(Finalization {
            finalize_signature: self.signature("finalize"),
            encrypted_score,
            nonce: hex::encode(out_nonce),
        })
    }
}

#[async_trait]
impl MpcGateway for LoopbackGateway {
    async fn mxe_public_key(&self, _program_id: &str) -> Result<[u8; 32], MpcError> {
        Ok(self.public_key)
    }

    async fn submit(&self, request: &ScorePairRequest) -> Result<Submission, MpcError> {
        self.pending.lock().insert(request.computation_offset, request.clone());
        debug!(offset = request.computation_offset, "mpc: loopback queued computation");
        Ok(Submission {
            program_id: request.program_id.clone(),
            tx_signature: self.signature("queue"),
            computation_offset: request.computation_offset,
        })
    }

    async fn await_finalization(&self, submission: &Submission) -> Result<Finalization, MpcError> {
        let request = self
            .pending
            .lock()
            .remove(&submission.computation_offset)
            .ok_or_else(|| {
                MpcError::Rpc(format!("unknown computation {}", submission.computation_offset))
            })?;
        self.evaluate(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(gateway: &LoopbackGateway, values: [u16; FEATURE_COUNT]) -> (SessionCipher, ScorePairRequest) {
        let session = SessionCipher::ephemeral(&gateway.public_key).unwrap();
        let nonce = cipher::random_nonce();
        let ciphertexts = session
            .encrypt(&values, &nonce)
            .unwrap()
            .iter()
            .map(hex::encode)
            .collect();
        let req = ScorePairRequest {
            program_id: "prog".into(),
            computation_offset: 7,
            ciphertexts,
            public_key: hex::encode(session.public_key()),
            nonce: hex::encode(nonce),
        };
        (session, req)
    }

    #[tokio::test]
    async fn loopback_computes_weighted_sum() {
        let gateway = LoopbackGateway::new(&PairWeights::default());
        let (session, req) = request(&gateway, [10_000, 10_000, 0, 0, 0]);
        let sub = gateway.submit(&req).await.unwrap();
        assert_eq!(gateway.pending_count(), 1);
        let fin = gateway.await_finalization(&sub).await.unwrap();
        assert_eq!(gateway.pending_count(), 0);

        let ct = hex::decode(&fin.encrypted_score).unwrap();
        let nonce = cipher::parse_nonce(&fin.nonce).unwrap();
        // proximity 0.20 + non-aggression 0.25
        assert_eq!(session.decrypt(&ct, &nonce, 0).unwrap(), 4_500);
    }

    #[tokio::test]
    async fn unknown_computation_is_rpc_error() {
        let gateway = LoopbackGateway::new(&PairWeights::default());
        let sub = Submission {
            program_id: "prog".into(),
            tx_signature: "x".into(),
            computation_offset: 99,
        };
        assert!(matches!(gateway.await_finalization(&sub).await, Err(MpcError::Rpc(_))));
    }

    #[tokio::test]
    async fn truncated_request_is_rejected() {
        let gateway = LoopbackGateway::new(&PairWeights::default());
        let (_, mut req) = request(&gateway, [1, 2, 3, 4, 5]);
        req.ciphertexts.pop();
        let sub = gateway.submit(&req).await.unwrap();
        assert!(matches!(
            gateway.await_finalization(&sub).await,
            Err(MpcError::MalformedResponse(_))
        ));
    }

    #[test]
    fn request_serializes_camel_case() {
        let req = ScorePairRequest {
            program_id: "p".into(),
            computation_offset: 1,
            ciphertexts: vec!["00".into()],
            public_key: "aa".into(),
            nonce: "bb".into(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["programId"], "p");
        assert_eq!(v["computationOffset"], 1);
        assert_eq!(v["publicKey"], "aa");
    }

    #[test]
    fn rpc_gateway_builds_from_config() {
        let gateway = RpcGateway::new(&MpcConfig::default()).unwrap();
        assert_eq!(gateway.endpoint(), crate::config::DEFAULT_RPC_URL);
    }
}
