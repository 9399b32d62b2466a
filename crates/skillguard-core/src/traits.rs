//! Trait interfaces between Skillguard crates and the embedding game server.
//!
//! - [`PlayerDirectory`]: read-only view of the host's live players and wallets
//!   (the game server implements)
//! - [`RiskEngine`]: pluggable pair/player/cashout scoring backend
//!   (`LocalRiskEngine` here, `ArciumRiskEngine` in skillguard-mpc)
//! - [`RiskSink`]: fire-and-forget persistence (skillguard-service implements)

use async_trait::async_trait;

use crate::types::{
    CashoutAction, DeviceTokenRow, PairFeatures, PairScore, PlayerFeatures, PlayerId,
    PlayerScore, PlayerSnapshot, RiskEventRow, WalletPairEncounterRow,
};

/// Read-only access to the host's player map and wallet bindings.
///
/// Skillguard never mutates host state. Implementations must be cheap: the
/// proximity scanner calls [`live_players`](Self::live_players) every scan.
pub trait PlayerDirectory: Send + Sync {
    /// Every player currently known to the host, including bots and the dead.
    fn live_players(&self) -> Vec<PlayerSnapshot>;

    /// Wallet address bound to a player, if they have authenticated.
    fn wallet_address(&self, player: &PlayerId) -> Option<String>;
}

/// Scoring backend.
///
/// Implementations never fail: a backend that cannot answer must fall back to
/// a local result internally, so callers never learn which backend answered.
#[async_trait]
pub trait RiskEngine: Send + Sync {
    async fn score_pair(&self, features: &PairFeatures) -> PairScore;

    async fn score_player(&self, features: &PlayerFeatures) -> PlayerScore;

    async fn cashout_verdict(&self, player_score: f64, max_pair_score: f64) -> CashoutAction;
}

/// Append-only persistence of notable events.
///
/// Every method must return immediately. Write failures are the sink's
/// problem: they are logged and dropped, never reported to the caller.
pub trait RiskSink: Send + Sync {
    fn risk_event(&self, row: RiskEventRow);

    fn wallet_pair_encounters(&self, rows: Vec<WalletPairEncounterRow>);

    /// Upsert on `token_hash`.
    fn device_token(&self, row: DeviceTokenRow);
}
