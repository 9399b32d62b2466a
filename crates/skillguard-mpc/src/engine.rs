//! MPC-backed [`RiskEngine`] and the engine factory.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use skillguard_core::config::RiskConfig;
use skillguard_core::scoring::LocalRiskEngine;
use skillguard_core::traits::RiskEngine;
use skillguard_core::types::{CashoutAction, PairFeatures, PairScore, PlayerFeatures, PlayerScore};

use crate::client::MpcClient;
use crate::config::MpcConfig;

pub const LOCAL_ENGINE_NAME: &str = "LocalRiskEngine";
pub const ARCIUM_ENGINE_NAME: &str = "ArciumRiskEngine";

/// Pair scores come from the MPC network when it answers, from the wrapped
/// local engine otherwise. Reason codes are always computed locally from the
/// plaintext features. Player scoring and cashout verdicts never leave the
/// process.
pub struct ArciumRiskEngine {
    local: LocalRiskEngine,
    client: Option<MpcClient>,
}

impl ArciumRiskEngine {
    pub fn new(config: RiskConfig, client: MpcClient) -> Self {
        Self {
            local: LocalRiskEngine::new(config),
            client: Some(client),
        }
    }

    /// An engine whose MPC path is unavailable; every call falls back.
    pub fn unconfigured(config: RiskConfig) -> Self {
        Self {
            local: LocalRiskEngine::new(config),
            client: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl RiskEngine for ArciumRiskEngine {
    async fn score_pair(&self, features: &PairFeatures) -> PairScore {
        let fallback = self.local.score_pair_now(features);
        let Some(client) = &self.client else {
            warn!("mpc: client not configured, using local pair score");
            return fallback;
        };
        match client.submit_pair_score(features).await {
            Ok(mpc) => PairScore {
                score: mpc.score,
                reasons: fallback.reasons,
            },
            Err(e) => {
                warn!(error = %e, "mpc: score_pair failed, using local pair score");
                fallback
            }
        }
    }

    async fn score_player(&self, features: &PlayerFeatures) -> PlayerScore {
        self.local.score_player(features).await
    }

    async fn cashout_verdict(&self, player_score: f64, max_pair_score: f64) -> CashoutAction {
        self.local.cashout_verdict(player_score, max_pair_score).await
    }
}

/// Engine picked at startup, with the name reported on the dashboard.
#[derive(Clone)]
pub struct SelectedEngine {
    pub engine: Arc<dyn RiskEngine>,
    pub name: &'static str,
}

impl std::fmt::Debug for SelectedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedEngine").field("name", &self.name).finish_non_exhaustive()
    }
}

impl SelectedEngine {
    pub fn local(config: RiskConfig) -> Self {
        Self {
            engine: Arc::new(LocalRiskEngine::new(config)),
            name: LOCAL_ENGINE_NAME,
        }
    }

    pub fn arcium(engine: ArciumRiskEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            name: ARCIUM_ENGINE_NAME,
        }
    }
}

/// Local engine unless a program id is configured. A configured but unusable
/// MPC backend still yields the MPC engine, which then falls back per call.
pub fn create_engine(risk: &RiskConfig, mpc: &MpcConfig) -> SelectedEngine {
    if !mpc.is_enabled() {
        info!("mpc: no program id configured, using local engine");
        return SelectedEngine::local(risk.clone());
    }
    match MpcClient::from_config(mpc) {
        Ok(client) => {
            info!(program = %client.program_id(), rpc = %mpc.rpc_url, "mpc: arcium engine enabled");
            SelectedEngine::arcium(ArciumRiskEngine::new(risk.clone(), client))
        }
        Err(e) => {
            warn!(error = %e, "mpc: client unavailable, arcium engine will fall back on every call");
            SelectedEngine::arcium(ArciumRiskEngine::unconfigured(risk.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use skillguard_core::error::MpcError;
    use skillguard_core::types::ReasonCode;

    use crate::gateway::{Finalization, LoopbackGateway, MpcGateway, ScorePairRequest, Submission};

    fn collusive() -> PairFeatures {
        PairFeatures {
            time_in_proximity: 0.9,
            non_aggression: 0.95,
            farm_loop: 0.8,
            repeated_encounters_normalized: 0.6,
            damage_symmetry: 0.85,
            repeated_encounters: 12,
            total_kills: 4.0,
            total_damage: 240.0,
            peak_damage: 130.0,
        }
    }

    struct Failing;

    #[async_trait]
    impl MpcGateway for Failing {
        async fn mxe_public_key(&self, _program_id: &str) -> Result<[u8; 32], MpcError> {
            Err(MpcError::Transport("connection refused".into()))
        }

        async fn submit(&self, _request: &ScorePairRequest) -> Result<Submission, MpcError> {
            Err(MpcError::Transport("connection refused".into()))
        }

        async fn await_finalization(&self, _submission: &Submission) -> Result<Finalization, MpcError> {
            Err(MpcError::Transport("connection refused".into()))
        }
    }

    /// Accepts submissions, never finalizes.
    struct Hanging(LoopbackGateway);

    #[async_trait]
    impl MpcGateway for Hanging {
        async fn mxe_public_key(&self, program_id: &str) -> Result<[u8; 32], MpcError> {
            self.0.mxe_public_key(program_id).await
        }

        async fn submit(&self, request: &ScorePairRequest) -> Result<Submission, MpcError> {
            self.0.submit(request).await
        }

        async fn await_finalization(&self, _submission: &Submission) -> Result<Finalization, MpcError> {
            std::future::pending().await
        }
    }

    /// Finalizes with a result sealed under an unrelated key.
    struct Garbled;

    #[async_trait]
    impl MpcGateway for Garbled {
        async fn mxe_public_key(&self, _program_id: &str) -> Result<[u8; 32], MpcError> {
            Ok(curve25519_dalek::montgomery::MontgomeryPoint::mul_base_clamped([5; 32]).to_bytes())
        }

        async fn submit(&self, request: &ScorePairRequest) -> Result<Submission, MpcError> {
            Ok(Submission {
                program_id: request.program_id.clone(),
                tx_signature: "sig".into(),
                computation_offset: request.computation_offset,
            })
        }

        async fn await_finalization(&self, _submission: &Submission) -> Result<Finalization, MpcError> {
            Ok(Finalization {
                finalize_signature: "fin".into(),
                encrypted_score: hex::encode([0u8; 18]),
                nonce: hex::encode([0u8; 12]),
            })
        }
    }

    fn engine_with(gateway: Arc<dyn MpcGateway>, timeout_ms: u64) -> ArciumRiskEngine {
        ArciumRiskEngine::new(RiskConfig::default(), MpcClient::new("prog", timeout_ms, gateway))
    }

    // -----------------------------------------------------------------------
    // Fallback
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn transport_failure_equals_local() {
        let local = LocalRiskEngine::default();
        let engine = engine_with(Arc::new(Failing), 1_000);
        let f = collusive();
        assert_eq!(engine.score_pair(&f).await, local.score_pair(&f).await);
    }

    #[tokio::test]
    async fn timeout_equals_local() {
        let local = LocalRiskEngine::default();
        let engine = engine_with(
            Arc::new(Hanging(LoopbackGateway::new(&RiskConfig::default().pair_weights))),
            50,
        );
        let f = collusive();
        assert_eq!(engine.score_pair(&f).await, local.score_pair(&f).await);
    }

    #[tokio::test]
    async fn garbled_result_equals_local() {
        let local = LocalRiskEngine::default();
        let engine = engine_with(Arc::new(Garbled), 1_000);
        let f = collusive();
        assert_eq!(engine.score_pair(&f).await, local.score_pair(&f).await);
    }

    #[tokio::test]
    async fn unconfigured_equals_local() {
        let local = LocalRiskEngine::default();
        let engine = ArciumRiskEngine::unconfigured(RiskConfig::default());
        assert!(!engine.is_connected());
        let f = collusive();
        assert_eq!(engine.score_pair(&f).await, local.score_pair(&f).await);
    }

    // -----------------------------------------------------------------------
    // MPC path
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn loopback_score_matches_local_within_fixed_point() {
        let local = LocalRiskEngine::default();
        let engine = engine_with(
            Arc::new(LoopbackGateway::new(&RiskConfig::default().pair_weights)),
            5_000,
        );
        let f = collusive();
        let mpc = engine.score_pair(&f).await;
        let expected = local.score_pair(&f).await;
        assert!((mpc.score - expected.score).abs() < 1e-3);
        assert_eq!(mpc.reasons, expected.reasons);
        assert!(mpc.reasons.contains(&ReasonCode::FarmLoop));
    }

    #[tokio::test]
    async fn player_and_cashout_stay_local() {
        let local = LocalRiskEngine::default();
        let engine = engine_with(Arc::new(Failing), 1_000);
        let pf = PlayerFeatures {
            fire_rate_anomaly: 1.0,
            hit_ratio_anomaly: 0.5,
            ..Default::default()
        };
        assert_eq!(engine.score_player(&pf).await, local.score_player(&pf).await);
        assert_eq!(
            engine.cashout_verdict(0.5, 0.1).await,
            local.cashout_verdict(0.5, 0.1).await
        );
    }

    // -----------------------------------------------------------------------
    // Factory
    // -----------------------------------------------------------------------

    #[test]
    fn factory_selects_local_without_program_id() {
        let selected = create_engine(&RiskConfig::default(), &MpcConfig::default());
        assert_eq!(selected.name, LOCAL_ENGINE_NAME);
    }

    #[test]
    fn factory_selects_arcium_with_program_id() {
        let mpc = MpcConfig {
            program_id: Some("prog".into()),
            ..MpcConfig::default()
        };
        let selected = create_engine(&RiskConfig::default(), &mpc);
        assert_eq!(selected.name, ARCIUM_ENGINE_NAME);
    }
}
