//! One encrypted `score_pair` round trip.
//!
//! fetch MXE key (cached) -> ephemeral session -> encrypt features -> submit
//! -> await finalization -> decrypt score. The whole sequence runs under a
//! single `finalize_timeout_ms` deadline.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use skillguard_core::constants::MPC_SCALE;
use skillguard_core::error::MpcError;
use skillguard_core::types::PairFeatures;

use crate::cipher::{self, SessionCipher};
use crate::config::MpcConfig;
use crate::gateway::{MpcGateway, RpcGateway, ScorePairRequest};

/// Decrypted MPC result with its on-chain receipts.
#[derive(Debug, Clone, PartialEq)]
pub struct MpcScore {
    pub score: f64,
    pub tx_signature: String,
    pub finalize_signature: String,
}

pub struct MpcClient {
    program_id: String,
    finalize_timeout_ms: u64,
    gateway: Arc<dyn MpcGateway>,
    mxe_key: OnceCell<[u8; 32]>,
}

impl MpcClient {
    pub fn new(program_id: impl Into<String>, finalize_timeout_ms: u64, gateway: Arc<dyn MpcGateway>) -> Self {
        Self {
            program_id: program_id.into(),
            finalize_timeout_ms,
            gateway,
            mxe_key: OnceCell::new(),
        }
    }

    /// Client over the JSON-RPC gateway. Fails when no program id is set.
    pub fn from_config(config: &MpcConfig) -> Result<Self, MpcError> {
        let program_id = config
            .program_id
            .clone()
            .ok_or_else(|| MpcError::NotConfigured("ARCIUM_PROGRAM_ID is not set".into()))?;
        let gateway = RpcGateway::new(config)?;
        Ok(Self::new(program_id, config.finalize_timeout_ms, Arc::new(gateway)))
    }

    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    async fn mxe_key(&self) -> Result<[u8; 32], MpcError> {
        self.mxe_key
            .get_or_try_init(|| self.gateway.mxe_public_key(&self.program_id))
            .await
            .copied()
    }

    /// Score a pair on the MPC network, bounded by the finalize timeout.
    pub async fn submit_pair_score(&self, features: &PairFeatures) -> Result<MpcScore, MpcError> {
        let timeout_ms = self.finalize_timeout_ms;
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.round_trip(features))
            .await
            .map_err(|_| MpcError::Timeout { timeout_ms })?
    }

    async fn round_trip(&self, features: &PairFeatures) -> Result<MpcScore, MpcError> {
        let mxe_key = self.mxe_key().await?;
        let session = SessionCipher::ephemeral(&mxe_key)?;
        let nonce = cipher::random_nonce();
        let ciphertexts = session
            .encrypt(&cipher::plaintext(features), &nonce)?
            .iter()
            .map(hex::encode)
            .collect();

        let request = ScorePairRequest {
            program_id: self.program_id.clone(),
            computation_offset: rand::rngs::OsRng.next_u64(),
            ciphertexts,
            public_key: hex::encode(session.public_key()),
            nonce: hex::encode(nonce),
        };
        let submission = self.gateway.submit(&request).await?;
        debug!(tx = %submission.tx_signature, offset = submission.computation_offset,
            "mpc: score_pair queued");

        let finalization = self.gateway.await_finalization(&submission).await?;
        let sealed = hex::decode(&finalization.encrypted_score)
            .map_err(|e| MpcError::MalformedResponse(format!("encrypted score is not hex: {e}")))?;
        let out_nonce = cipher::parse_nonce(&finalization.nonce)?;
        let raw = session.decrypt(&sealed, &out_nonce, 0)?;
        if raw > MPC_SCALE {
            return Err(MpcError::MalformedResponse(format!("score {raw} exceeds {MPC_SCALE}")));
        }

        let score = cipher::unscale(raw);
        info!(tx = %submission.tx_signature, finalize = %finalization.finalize_signature,
            score, "mpc: score_pair finalized");
        Ok(MpcScore {
            score,
            tx_signature: submission.tx_signature,
            finalize_signature: finalization.finalize_signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use skillguard_core::config::PairWeights;

    use crate::gateway::{Finalization, LoopbackGateway, Submission};

    fn features() -> PairFeatures {
        PairFeatures {
            time_in_proximity: 0.5,
            non_aggression: 0.8,
            farm_loop: 0.0,
            repeated_encounters_normalized: 0.25,
            damage_symmetry: 0.0,
            ..Default::default()
        }
    }

    /// Counts key fetches, delegates everything else.
    struct Counting {
        inner: LoopbackGateway,
        key_fetches: AtomicUsize,
    }

    #[async_trait]
    impl MpcGateway for Counting {
        async fn mxe_public_key(&self, program_id: &str) -> Result<[u8; 32], MpcError> {
            self.key_fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.mxe_public_key(program_id).await
        }

        async fn submit(&self, request: &ScorePairRequest) -> Result<Submission, MpcError> {
            self.inner.submit(request).await
        }

        async fn await_finalization(&self, submission: &Submission) -> Result<Finalization, MpcError> {
            self.inner.await_finalization(submission).await
        }
    }

    #[tokio::test]
    async fn loopback_round_trip_and_key_cache() {
        let gateway = Arc::new(Counting {
            inner: LoopbackGateway::new(&PairWeights::default()),
            key_fetches: AtomicUsize::new(0),
        });
        let client = MpcClient::new("prog", 5_000, gateway.clone());

        let first = client.submit_pair_score(&features()).await.unwrap();
        // 0.5*0.20 + 0.8*0.25 + 0.25*0.15
        assert!((first.score - 0.3375).abs() < 1e-3);
        assert!(first.tx_signature.starts_with("loopback-queue-"));
        assert!(first.finalize_signature.starts_with("loopback-finalize-"));

        client.submit_pair_score(&features()).await.unwrap();
        assert_eq!(gateway.key_fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_config_requires_program_id() {
        let err = MpcClient::from_config(&MpcConfig::default()).err();
        assert!(matches!(err, Some(MpcError::NotConfigured(_))));

        let cfg = MpcConfig {
            program_id: Some("prog".into()),
            ..MpcConfig::default()
        };
        assert_eq!(MpcClient::from_config(&cfg).unwrap().program_id(), "prog");
    }
}
