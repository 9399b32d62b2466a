//! Domain types shared by every Skillguard crate.
//!
//! Scores are `f64` in `[0, 1]`. Timestamps are Unix milliseconds (`u64`)
//! supplied by the host's clock, so every component is deterministic under test.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque player identifier assigned by the game server.
///
/// Ordering is plain string ordering and defines the canonical `(a, b)`
/// orientation of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Read-only view of one live player, taken from the host's player map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub position: Position,
    pub alive: bool,
    pub joined: bool,
    pub is_bot: bool,
    /// Whether the player is holding the fire button this frame.
    pub shooting: bool,
}

impl PlayerSnapshot {
    /// Only alive, joined humans take part in proximity scanning.
    pub fn is_scannable(&self) -> bool {
        self.alive && self.joined && !self.is_bot
    }
}

// ---------------------------------------------------------------------------
// Reason codes and flags
// ---------------------------------------------------------------------------

/// Why a pair score is elevated. Raised on raw feature thresholds,
/// independently of the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NonAggression,
    FarmLoop,
    DamageSymmetry,
    RepeatedPair,
    Stalking,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonAggression => "NON_AGGRESSION",
            Self::FarmLoop => "FARM_LOOP",
            Self::DamageSymmetry => "DAMAGE_SYMMETRY",
            Self::RepeatedPair => "REPEATED_PAIR",
            Self::Stalking => "STALKING",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which single-player anomaly axes crossed their cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyFlag {
    FireRateAnomaly,
    HitRatioAnomaly,
    AimStabilityAnomaly,
}

impl AnomalyFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FireRateAnomaly => "FIRE_RATE_ANOMALY",
            Self::HitRatioAnomaly => "HIT_RATIO_ANOMALY",
            Self::AimStabilityAnomaly => "AIM_STABILITY_ANOMALY",
        }
    }
}

impl fmt::Display for AnomalyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a list of codes as `A,B,C` for log lines.
pub fn join_codes<T: fmt::Display>(codes: &[T]) -> String {
    codes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",")
}

// ---------------------------------------------------------------------------
// Feature vectors and scores
// ---------------------------------------------------------------------------

/// Everything a [`RiskEngine`](crate::traits::RiskEngine) needs to score a pair.
///
/// The first five fields are the scored features, each in `[0, 1]`.
/// The rest is raw context used by reason codes and the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairFeatures {
    pub time_in_proximity: f64,
    pub non_aggression: f64,
    pub farm_loop: f64,
    pub repeated_encounters_normalized: f64,
    pub damage_symmetry: f64,
    /// Raw wallet-level encounters in the trailing 24 h.
    pub repeated_encounters: u32,
    pub total_kills: f64,
    pub total_damage: f64,
    /// Larger of the two directional damage accumulators.
    pub peak_damage: f64,
}

/// Result of pair scoring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PairScore {
    pub score: f64,
    pub reasons: Vec<ReasonCode>,
}

/// Everything a [`RiskEngine`](crate::traits::RiskEngine) needs to score a player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerFeatures {
    pub fire_rate_anomaly: f64,
    pub hit_ratio_anomaly: f64,
    pub aim_stability_anomaly: f64,
    pub shots_total: u64,
    pub hits_total: u64,
    /// `None` until enough shots are buffered.
    pub median_inter_shot_ms: Option<f64>,
    pub avg_hit_distance: f64,
    /// `None` until enough angles are buffered.
    pub aim_angle_std_dev: Option<f64>,
}

/// Result of player scoring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerScore {
    pub score: f64,
    pub flags: Vec<AnomalyFlag>,
}

// ---------------------------------------------------------------------------
// Cashout
// ---------------------------------------------------------------------------

/// The three outcomes of the cashout decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashoutAction {
    Allow,
    Delay,
    SoftHold,
}

impl CashoutAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Delay => "delay",
            Self::SoftHold => "soft_hold",
        }
    }
}

impl fmt::Display for CashoutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict returned to the host for one cashout request.
///
/// Serialises as `{"action":"allow"}`, `{"action":"delay","delayMs":..}` or
/// `{"action":"soft_hold",..}`. An allow carries no further data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CashoutVerdict {
    Allow,
    Delay {
        delay_ms: u64,
        reasons: Vec<ReasonCode>,
        player_score: f64,
        max_pair_score: f64,
    },
    SoftHold {
        reasons: Vec<ReasonCode>,
        player_score: f64,
        max_pair_score: f64,
    },
}

impl CashoutVerdict {
    pub fn action(&self) -> CashoutAction {
        match self {
            Self::Allow => CashoutAction::Allow,
            Self::Delay { .. } => CashoutAction::Delay,
            Self::SoftHold { .. } => CashoutAction::SoftHold,
        }
    }

    pub fn delay_ms(&self) -> Option<u64> {
        match self {
            Self::Delay { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        }
    }

    pub fn reasons(&self) -> &[ReasonCode] {
        match self {
            Self::Allow => &[],
            Self::Delay { reasons, .. } | Self::SoftHold { reasons, .. } => reasons,
        }
    }

    pub fn player_score(&self) -> f64 {
        match self {
            Self::Allow => 0.0,
            Self::Delay { player_score, .. } | Self::SoftHold { player_score, .. } => *player_score,
        }
    }

    pub fn max_pair_score(&self) -> f64 {
        match self {
            Self::Allow => 0.0,
            Self::Delay { max_pair_score, .. } | Self::SoftHold { max_pair_score, .. } => {
                *max_pair_score
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

/// `risk_events` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEventRow {
    pub event_type: String,
    pub player_id: PlayerId,
    pub wallet_address: Option<String>,
    pub pair_risk_score: Option<f64>,
    pub player_risk_score: Option<f64>,
    pub reason_codes: Vec<ReasonCode>,
    pub metadata: RiskEventMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskEventMetadata {
    pub action: CashoutAction,
    pub delay_ms: Option<u64>,
}

/// `wallet_pair_encounters` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletPairEncounterRow {
    pub wallet_a: String,
    pub wallet_b: String,
    pub encounter_count: u32,
    pub proximity_duration_ms: u64,
    pub latest_at: DateTime<Utc>,
}

/// `device_tokens` row, upserted on `token_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTokenRow {
    pub token_hash: String,
    pub wallet_address: String,
    pub last_seen_at: DateTime<Utc>,
}

/// Convert a host millisecond timestamp for persistence.
pub fn ms_to_datetime(ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms as i64).unwrap_or_default()
}
