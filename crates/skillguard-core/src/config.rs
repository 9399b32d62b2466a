//! Risk tunables as a single value passed to every component.
//!
//! [`RiskConfig::default`] mirrors [`crate::constants`]. All structs carry
//! `#[serde(default)]` so an override file only needs the keys it changes.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;

/// Tolerance used when checking that a weight category sums to 1.0.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Weights of the five pair features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairWeights {
    pub proximity: f64,
    pub non_aggression: f64,
    pub farm_loop: f64,
    pub repeated_encounter: f64,
    pub damage_symmetry: f64,
}

impl PairWeights {
    pub fn sum(&self) -> f64 {
        self.proximity
            + self.non_aggression
            + self.farm_loop
            + self.repeated_encounter
            + self.damage_symmetry
    }
}

impl Default for PairWeights {
    fn default() -> Self {
        Self {
            proximity: PAIR_WEIGHT_PROXIMITY,
            non_aggression: PAIR_WEIGHT_NON_AGGRESSION,
            farm_loop: PAIR_WEIGHT_FARM_LOOP,
            repeated_encounter: PAIR_WEIGHT_REPEATED_ENCOUNTER,
            damage_symmetry: PAIR_WEIGHT_DAMAGE_SYMMETRY,
        }
    }
}

/// Weights of the three player anomaly axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerWeights {
    pub fire_rate: f64,
    pub hit_ratio: f64,
    pub aim_stability: f64,
}

impl PlayerWeights {
    pub fn sum(&self) -> f64 {
        self.fire_rate + self.hit_ratio + self.aim_stability
    }
}

impl Default for PlayerWeights {
    fn default() -> Self {
        Self {
            fire_rate: PLAYER_WEIGHT_FIRE_RATE,
            hit_ratio: PLAYER_WEIGHT_HIT_RATIO,
            aim_stability: PLAYER_WEIGHT_AIM_STABILITY,
        }
    }
}

/// Reason-code thresholds and feature shaping constants for pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairThresholds {
    pub non_aggression: f64,
    pub farm_loop: f64,
    pub damage_symmetry: f64,
    pub repeated_encounter: u32,
    pub stalking_proximity: f64,
    pub damage_noise_floor: f64,
    pub damage_symmetry_min_damage: f64,
    pub farm_loop_kill_saturation: f64,
}

impl Default for PairThresholds {
    fn default() -> Self {
        Self {
            non_aggression: NON_AGGRESSION_THRESHOLD,
            farm_loop: FARM_LOOP_THRESHOLD,
            damage_symmetry: DAMAGE_SYMMETRY_THRESHOLD,
            repeated_encounter: REPEATED_ENCOUNTER_THRESHOLD,
            stalking_proximity: STALKING_PROXIMITY_THRESHOLD,
            damage_noise_floor: DAMAGE_NOISE_FLOOR,
            damage_symmetry_min_damage: DAMAGE_SYMMETRY_MIN_DAMAGE,
            farm_loop_kill_saturation: FARM_LOOP_KILL_SATURATION,
        }
    }
}

/// Per-axis thresholds for single-player anomaly scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerThresholds {
    pub fire_rate_suspect_ms: f64,
    pub fire_rate_floor_ms: f64,
    pub fire_rate_min_shots: usize,
    pub hit_ratio_suspect: f64,
    pub hit_ratio_dist_floor: f64,
    pub hit_ratio_dist_saturation: f64,
    pub hit_ratio_min_shots: u64,
    pub aim_variance_suspect: f64,
    pub aim_min_samples: usize,
    pub flag_cutoff: f64,
}

impl Default for PlayerThresholds {
    fn default() -> Self {
        Self {
            fire_rate_suspect_ms: FIRE_RATE_SUSPECT_MS,
            fire_rate_floor_ms: FIRE_RATE_FLOOR_MS,
            fire_rate_min_shots: FIRE_RATE_MIN_SHOTS,
            hit_ratio_suspect: HIT_RATIO_SUSPECT,
            hit_ratio_dist_floor: HIT_RATIO_DIST_FLOOR,
            hit_ratio_dist_saturation: HIT_RATIO_DIST_SATURATION,
            hit_ratio_min_shots: HIT_RATIO_MIN_SHOTS,
            aim_variance_suspect: AIM_VARIANCE_SUSPECT,
            aim_min_samples: AIM_MIN_SAMPLES,
            flag_cutoff: PLAYER_FLAG_CUTOFF,
        }
    }
}

/// Cashout cutoffs and orb payout damping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutThresholds {
    pub cashout_allow: f64,
    pub cashout_soft_hold: f64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub farm_diminish_start: f64,
    pub farm_diminish_floor: f64,
}

impl Default for PayoutThresholds {
    fn default() -> Self {
        Self {
            cashout_allow: CASHOUT_ALLOW,
            cashout_soft_hold: CASHOUT_SOFT_HOLD,
            delay_min_ms: CASHOUT_DELAY_MIN_MS,
            delay_max_ms: CASHOUT_DELAY_MAX_MS,
            farm_diminish_start: FARM_DIMINISH_START,
            farm_diminish_floor: FARM_DIMINISH_FLOOR,
        }
    }
}

/// Ring buffer capacities of the per-player anomaly record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSizes {
    pub shots: usize,
    pub hit_distances: usize,
    pub angles: usize,
}

impl Default for BufferSizes {
    fn default() -> Self {
        Self {
            shots: SHOT_BUFFER_SIZE,
            hit_distances: HIT_DIST_BUFFER,
            angles: ANGLE_BUFFER_SIZE,
        }
    }
}

/// Every tunable of the risk subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub scan_interval_ms: u64,
    pub proximity_threshold: f64,
    pub pair_stale_timeout_ms: u64,
    pub window_duration_ms: u64,
    pub decay_factor: f64,
    pub encounter_window_ms: u64,
    pub orb_kill_window_ms: u64,
    pub bullet_damage: f64,
    pub salt_rotation_ms: u64,
    pub device_token_min_len: usize,
    pub pair_weights: PairWeights,
    pub player_weights: PlayerWeights,
    pub pair_thresholds: PairThresholds,
    pub player_thresholds: PlayerThresholds,
    pub payout: PayoutThresholds,
    pub buffers: BufferSizes,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: SCAN_INTERVAL_MS,
            proximity_threshold: PROXIMITY_THRESHOLD,
            pair_stale_timeout_ms: PAIR_STALE_TIMEOUT_MS,
            window_duration_ms: WINDOW_DURATION_MS,
            decay_factor: DECAY_FACTOR,
            encounter_window_ms: ENCOUNTER_WINDOW_MS,
            orb_kill_window_ms: ORB_KILL_WINDOW_MS,
            bullet_damage: BULLET_DAMAGE,
            salt_rotation_ms: SALT_ROTATION_MS,
            device_token_min_len: DEVICE_TOKEN_MIN_LEN,
            pair_weights: PairWeights::default(),
            player_weights: PlayerWeights::default(),
            pair_thresholds: PairThresholds::default(),
            player_thresholds: PlayerThresholds::default(),
            payout: PayoutThresholds::default(),
            buffers: BufferSizes::default(),
        }
    }
}

impl RiskConfig {
    /// Proximity ticks a pair would collect if near each other for a whole window.
    pub fn expected_ticks_per_window(&self) -> f64 {
        (self.window_duration_ms / self.scan_interval_ms.max(1)).max(1) as f64
    }

    /// Check internal consistency. Called once at startup; components assume
    /// a validated config afterwards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pair_sum = self.pair_weights.sum();
        if (pair_sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::WeightSum { category: "pair", sum: pair_sum });
        }
        let player_sum = self.player_weights.sum();
        if (player_sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::WeightSum { category: "player", sum: player_sum });
        }
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid("scan_interval_ms must be positive".into()));
        }
        if !(self.proximity_threshold > 0.0) {
            return Err(ConfigError::Invalid("proximity_threshold must be positive".into()));
        }
        if self.window_duration_ms == 0 {
            return Err(ConfigError::Invalid("window_duration_ms must be positive".into()));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "decay_factor must be in (0, 1], got {}",
                self.decay_factor
            )));
        }
        let p = &self.payout;
        if p.cashout_allow >= p.cashout_soft_hold {
            return Err(ConfigError::Invalid(format!(
                "cashout_allow ({}) must be below cashout_soft_hold ({})",
                p.cashout_allow, p.cashout_soft_hold
            )));
        }
        if p.delay_min_ms > p.delay_max_ms {
            return Err(ConfigError::Invalid(format!(
                "delay_min_ms ({}) exceeds delay_max_ms ({})",
                p.delay_min_ms, p.delay_max_ms
            )));
        }
        if !(p.farm_diminish_start < 1.0) || !(0.0..=1.0).contains(&p.farm_diminish_floor) {
            return Err(ConfigError::Invalid(
                "farm_diminish_start must be below 1.0 and farm_diminish_floor in [0, 1]".into(),
            ));
        }
        let b = &self.buffers;
        if b.shots == 0 || b.hit_distances == 0 || b.angles == 0 {
            return Err(ConfigError::Invalid("ring buffer sizes must be positive".into()));
        }
        if self.player_thresholds.fire_rate_suspect_ms <= self.player_thresholds.fire_rate_floor_ms {
            return Err(ConfigError::Invalid(
                "fire_rate_suspect_ms must exceed fire_rate_floor_ms".into(),
            ));
        }
        if self.player_thresholds.hit_ratio_suspect >= 1.0
            || self.player_thresholds.aim_variance_suspect <= 0.0
        {
            return Err(ConfigError::Invalid(
                "hit_ratio_suspect must be below 1.0 and aim_variance_suspect positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RiskConfig::default().validate().unwrap();
    }

    #[test]
    fn default_weights_sum_to_one() {
        let cfg = RiskConfig::default();
        assert!((cfg.pair_weights.sum() - 1.0).abs() < 1e-9);
        assert!((cfg.player_weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn expected_ticks_is_window_over_interval() {
        let cfg = RiskConfig::default();
        assert_eq!(cfg.expected_ticks_per_window(), 60.0);
    }

    #[test]
    fn rejects_unbalanced_pair_weights() {
        let mut cfg = RiskConfig::default();
        cfg.pair_weights.farm_loop = 0.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WeightSum { category: "pair", .. })
        ));
    }

    #[test]
    fn rejects_inverted_cashout_cutoffs() {
        let mut cfg = RiskConfig::default();
        cfg.payout.cashout_allow = 0.8;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_decay_factor_out_of_range() {
        let mut cfg = RiskConfig::default();
        cfg.decay_factor = 0.0;
        assert!(cfg.validate().is_err());
        cfg.decay_factor = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_buffers() {
        let mut cfg = RiskConfig::default();
        cfg.buffers.angles = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RiskConfig =
            serde_json::from_str(r#"{ "scan_interval_ms": 1000, "payout": { "cashout_allow": 0.3 } }"#)
                .unwrap();
        assert_eq!(cfg.scan_interval_ms, 1000);
        assert_eq!(cfg.payout.cashout_allow, 0.3);
        assert_eq!(cfg.payout.cashout_soft_hold, CASHOUT_SOFT_HOLD);
        assert_eq!(cfg.decay_factor, DECAY_FACTOR);
    }
}
