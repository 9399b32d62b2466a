//! Closed-form scoring formulas.
//!
//! Every score in the system goes through these functions: the pair and
//! anomaly trackers when they rescore, the cashout gate when it decides, and
//! [`LocalRiskEngine`] when a caller goes through the pluggable engine. There
//! is exactly one copy of each formula.

use async_trait::async_trait;

use crate::config::{PairThresholds, PayoutThresholds, PlayerThresholds, RiskConfig};
use crate::traits::RiskEngine;
use crate::types::{
    AnomalyFlag, CashoutAction, PairFeatures, PairScore, PlayerFeatures, PlayerScore, ReasonCode,
};

/// Clamp to `[0, 1]`. NaN maps to 0.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

// ---------------------------------------------------------------------------
// Pair features
// ---------------------------------------------------------------------------

/// Fraction of a full window the pair spent near each other.
pub fn time_in_proximity(proximity_ticks: f64, cfg: &RiskConfig) -> f64 {
    clamp_unit(proximity_ticks / cfg.expected_ticks_per_window())
}

/// Fraction of proximity ticks where neither player fired.
pub fn non_aggression(close_no_shot_ticks: f64, proximity_ticks: f64) -> f64 {
    if proximity_ticks > 0.0 {
        clamp_unit(close_no_shot_ticks / proximity_ticks)
    } else {
        0.0
    }
}

/// Kill-adjacent orb pickups per kill, scaled down until kills reach the
/// saturation count so one coincidence cannot max the signal.
pub fn farm_loop(orb_pickups_near_kill: f64, total_kills: f64, t: &PairThresholds) -> f64 {
    if total_kills <= 0.0 {
        return 0.0;
    }
    let per_kill = orb_pickups_near_kill / total_kills.max(1.0);
    let confidence = (total_kills / t.farm_loop_kill_saturation).min(1.0);
    clamp_unit(per_kill * confidence)
}

/// 24 h encounter count, saturating at twice the reason threshold.
pub fn encounters_normalized(count: u32, t: &PairThresholds) -> f64 {
    let cap = (t.repeated_encounter.saturating_mul(2)).max(1) as f64;
    clamp_unit(count as f64 / cap)
}

/// `min / max` of directional damage, zero until the larger side clears the
/// noise floor.
pub fn damage_symmetry(damage_a_to_b: f64, damage_b_to_a: f64, t: &PairThresholds) -> f64 {
    let max = damage_a_to_b.max(damage_b_to_a).max(1.0);
    let min = damage_a_to_b.min(damage_b_to_a);
    if max > t.damage_noise_floor { clamp_unit(min / max) } else { 0.0 }
}

/// Threshold crossings on the raw features, in a fixed order.
pub fn pair_reasons(f: &PairFeatures, t: &PairThresholds) -> Vec<ReasonCode> {
    let mut reasons = Vec::new();
    if f.non_aggression > t.non_aggression {
        reasons.push(ReasonCode::NonAggression);
    }
    if f.farm_loop > t.farm_loop {
        reasons.push(ReasonCode::FarmLoop);
    }
    if f.damage_symmetry > t.damage_symmetry && f.peak_damage > t.damage_symmetry_min_damage {
        reasons.push(ReasonCode::DamageSymmetry);
    }
    let repeated = f.repeated_encounters > t.repeated_encounter;
    if repeated {
        reasons.push(ReasonCode::RepeatedPair);
    }
    if repeated && f.time_in_proximity > t.stalking_proximity {
        reasons.push(ReasonCode::Stalking);
    }
    reasons
}

/// Convex weighted sum of the five pair features, plus reason codes.
pub fn pair_score(f: &PairFeatures, cfg: &RiskConfig) -> PairScore {
    let w = &cfg.pair_weights;
    let raw = f.time_in_proximity * w.proximity
        + f.non_aggression * w.non_aggression
        + f.farm_loop * w.farm_loop
        + f.repeated_encounters_normalized * w.repeated_encounter
        + f.damage_symmetry * w.damage_symmetry;
    PairScore {
        score: clamp_unit(raw),
        reasons: pair_reasons(f, &cfg.pair_thresholds),
    }
}

// ---------------------------------------------------------------------------
// Player features
// ---------------------------------------------------------------------------

/// Median gap between consecutive shots. `None` with fewer than three
/// timestamps.
pub fn median_interval(timestamps: &[u64]) -> Option<f64> {
    if timestamps.len() < 3 {
        return None;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    let mut intervals: Vec<u64> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.sort_unstable();
    Some(intervals[intervals.len() / 2] as f64)
}

/// Population standard deviation. `None` below `min_samples`.
pub fn population_std_dev(samples: &[f64], min_samples: usize) -> Option<f64> {
    if samples.is_empty() || samples.len() < min_samples {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Grows linearly as the median interval falls from the suspect threshold
/// toward the cooldown floor.
pub fn fire_rate_anomaly(median_ms: Option<f64>, buffered_shots: usize, t: &PlayerThresholds) -> f64 {
    match median_ms {
        Some(median)
            if median < t.fire_rate_suspect_ms && buffered_shots >= t.fire_rate_min_shots =>
        {
            let span = t.fire_rate_suspect_ms - t.fire_rate_floor_ms;
            clamp_unit((t.fire_rate_suspect_ms - median) / span)
        }
        _ => 0.0,
    }
}

/// Accuracy above the suspect ratio, weighted up by average hit distance.
/// Close-range accuracy is never flagged.
pub fn hit_ratio_anomaly(shots: u64, hits: u64, avg_hit_distance: f64, t: &PlayerThresholds) -> f64 {
    if shots < t.hit_ratio_min_shots || shots == 0 {
        return 0.0;
    }
    let ratio = hits as f64 / shots as f64;
    if ratio <= t.hit_ratio_suspect || avg_hit_distance <= t.hit_ratio_dist_floor {
        return 0.0;
    }
    let dist_factor = (avg_hit_distance / t.hit_ratio_dist_saturation).min(1.0);
    clamp_unit((ratio - t.hit_ratio_suspect) / (1.0 - t.hit_ratio_suspect) * (0.5 + 0.5 * dist_factor))
}

/// Near-constant aim angles score high. Missing data scores zero.
pub fn aim_stability_anomaly(std_dev: Option<f64>, t: &PlayerThresholds) -> f64 {
    match std_dev {
        Some(sd) if sd < t.aim_variance_suspect => {
            clamp_unit((t.aim_variance_suspect - sd) / t.aim_variance_suspect)
        }
        _ => 0.0,
    }
}

/// Weighted sum of the three axes, plus per-axis flags.
pub fn player_score(f: &PlayerFeatures, cfg: &RiskConfig) -> PlayerScore {
    let w = &cfg.player_weights;
    let raw = f.fire_rate_anomaly * w.fire_rate
        + f.hit_ratio_anomaly * w.hit_ratio
        + f.aim_stability_anomaly * w.aim_stability;

    let cutoff = cfg.player_thresholds.flag_cutoff;
    let mut flags = Vec::new();
    if f.fire_rate_anomaly > cutoff {
        flags.push(AnomalyFlag::FireRateAnomaly);
    }
    if f.hit_ratio_anomaly > cutoff {
        flags.push(AnomalyFlag::HitRatioAnomaly);
    }
    if f.aim_stability_anomaly > cutoff {
        flags.push(AnomalyFlag::AimStabilityAnomaly);
    }

    PlayerScore { score: clamp_unit(raw), flags }
}

// ---------------------------------------------------------------------------
// Cashout and payout
// ---------------------------------------------------------------------------

/// Either signal alone can escalate.
pub fn combined_score(player_score: f64, max_pair_score: f64) -> f64 {
    clamp_unit(player_score.max(max_pair_score))
}

pub fn cashout_action(player_score: f64, max_pair_score: f64, p: &PayoutThresholds) -> CashoutAction {
    let combined = combined_score(player_score, max_pair_score);
    if combined < p.cashout_allow {
        CashoutAction::Allow
    } else if combined < p.cashout_soft_hold {
        CashoutAction::Delay
    } else {
        CashoutAction::SoftHold
    }
}

/// Orb value multiplier in `[floor, 1]`, shrinking linearly once farm-loop
/// passes the diminish start.
pub fn orb_multiplier(farm_loop: f64, p: &PayoutThresholds) -> f64 {
    if farm_loop <= p.farm_diminish_start {
        return 1.0;
    }
    let progress = (farm_loop - p.farm_diminish_start) / (1.0 - p.farm_diminish_start);
    let m = 1.0 - progress * (1.0 - p.farm_diminish_floor);
    m.clamp(p.farm_diminish_floor, 1.0)
}

// ---------------------------------------------------------------------------
// LocalRiskEngine
// ---------------------------------------------------------------------------

/// In-process engine: deterministic weighted sums and threshold lookups.
#[derive(Debug, Clone, Default)]
pub struct LocalRiskEngine {
    config: RiskConfig,
}

impl LocalRiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Synchronous form of [`RiskEngine::score_pair`], used by fallbacks.
    pub fn score_pair_now(&self, features: &PairFeatures) -> PairScore {
        pair_score(features, &self.config)
    }
}

#[async_trait]
impl RiskEngine for LocalRiskEngine {
    async fn score_pair(&self, features: &PairFeatures) -> PairScore {
        pair_score(features, &self.config)
    }

    async fn score_player(&self, features: &PlayerFeatures) -> PlayerScore {
        player_score(features, &self.config)
    }

    async fn cashout_verdict(&self, player_score: f64, max_pair_score: f64) -> CashoutAction {
        cashout_action(player_score, max_pair_score, &self.config.payout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RiskConfig {
        RiskConfig::default()
    }

    // -----------------------------------------------------------------------
    // Pair features
    // -----------------------------------------------------------------------

    #[test]
    fn time_in_proximity_saturates_at_one() {
        let c = cfg();
        assert_eq!(time_in_proximity(30.0, &c), 0.5);
        assert_eq!(time_in_proximity(600.0, &c), 1.0);
    }

    #[test]
    fn non_aggression_zero_without_ticks() {
        assert_eq!(non_aggression(0.0, 0.0), 0.0);
        assert_eq!(non_aggression(8.0, 10.0), 0.8);
    }

    #[test]
    fn farm_loop_scales_down_low_kill_counts() {
        let t = PairThresholds::default();
        // One kill, one pickup: capped at 1/3.
        assert!((farm_loop(1.0, 1.0, &t) - 1.0 / 3.0).abs() < 1e-12);
        // Three kills, three pickups: full signal.
        assert_eq!(farm_loop(3.0, 3.0, &t), 1.0);
        assert_eq!(farm_loop(5.0, 0.0, &t), 0.0);
    }

    #[test]
    fn encounters_normalize_against_twice_threshold() {
        let t = PairThresholds::default();
        assert_eq!(encounters_normalized(10, &t), 0.5);
        assert_eq!(encounters_normalized(40, &t), 1.0);
    }

    #[test]
    fn damage_symmetry_respects_noise_floor() {
        let t = PairThresholds::default();
        assert_eq!(damage_symmetry(10.0, 10.0, &t), 0.0);
        assert_eq!(damage_symmetry(80.0, 100.0, &t), 0.8);
        assert_eq!(damage_symmetry(0.0, 100.0, &t), 0.0);
    }

    #[test]
    fn stalking_requires_repeats_and_proximity() {
        let t = PairThresholds::default();
        let mut f = PairFeatures {
            repeated_encounters: 11,
            time_in_proximity: 0.2,
            ..Default::default()
        };
        assert_eq!(pair_reasons(&f, &t), vec![ReasonCode::RepeatedPair]);
        f.time_in_proximity = 0.4;
        assert_eq!(
            pair_reasons(&f, &t),
            vec![ReasonCode::RepeatedPair, ReasonCode::Stalking]
        );
    }

    #[test]
    fn damage_symmetry_reason_needs_peak_damage() {
        let t = PairThresholds::default();
        let mut f = PairFeatures {
            damage_symmetry: 0.9,
            peak_damage: 40.0,
            ..Default::default()
        };
        assert!(pair_reasons(&f, &t).is_empty());
        f.peak_damage = 60.0;
        assert_eq!(pair_reasons(&f, &t), vec![ReasonCode::DamageSymmetry]);
    }

    #[test]
    fn pair_score_is_weighted_sum() {
        let f = PairFeatures {
            time_in_proximity: 1.0,
            non_aggression: 1.0,
            farm_loop: 0.0,
            repeated_encounters_normalized: 0.0,
            damage_symmetry: 0.0,
            ..Default::default()
        };
        let s = pair_score(&f, &cfg());
        assert!((s.score - 0.45).abs() < 1e-12);
        assert_eq!(s.reasons, vec![ReasonCode::NonAggression]);
    }

    #[test]
    fn saturated_pair_scores_one() {
        let f = PairFeatures {
            time_in_proximity: 1.0,
            non_aggression: 1.0,
            farm_loop: 1.0,
            repeated_encounters_normalized: 1.0,
            damage_symmetry: 1.0,
            ..Default::default()
        };
        assert!((pair_score(&f, &cfg()).score - 1.0).abs() < 1e-12);
    }

    // -----------------------------------------------------------------------
    // Player features
    // -----------------------------------------------------------------------

    #[test]
    fn median_interval_needs_three_timestamps() {
        assert_eq!(median_interval(&[100, 200]), None);
        assert_eq!(median_interval(&[0, 100, 300]), Some(200.0));
    }

    #[test]
    fn median_interval_sorts_out_of_order_input() {
        assert_eq!(median_interval(&[300, 0, 110, 220]), Some(110.0));
    }

    #[test]
    fn std_dev_is_population() {
        let sd = population_std_dev(&[1.0, 1.0, 3.0, 3.0, 2.0], 5).unwrap();
        assert!((sd - (0.8f64).sqrt()).abs() < 1e-12);
        assert_eq!(population_std_dev(&[1.0, 2.0], 5), None);
    }

    #[test]
    fn fire_rate_anomaly_ramps_toward_floor() {
        let t = PlayerThresholds::default();
        assert_eq!(fire_rate_anomaly(Some(130.0), 30, &t), 0.0);
        assert!((fire_rate_anomaly(Some(112.5), 30, &t) - 0.5).abs() < 1e-12);
        assert_eq!(fire_rate_anomaly(Some(90.0), 30, &t), 1.0);
        assert_eq!(fire_rate_anomaly(Some(90.0), 5, &t), 0.0);
        assert_eq!(fire_rate_anomaly(None, 30, &t), 0.0);
    }

    #[test]
    fn hit_ratio_ignores_close_range() {
        let t = PlayerThresholds::default();
        assert_eq!(hit_ratio_anomaly(100, 95, 150.0, &t), 0.0);
        assert_eq!(hit_ratio_anomaly(10, 10, 700.0, &t), 0.0);
        // ratio 1.0 at saturation distance
        assert_eq!(hit_ratio_anomaly(100, 100, 700.0, &t), 1.0);
        // ratio 0.8, distance 300: 0.5 * (0.5 + 0.25)
        assert!((hit_ratio_anomaly(100, 80, 300.0, &t) - 0.375).abs() < 1e-9);
    }

    #[test]
    fn aim_stability_scores_low_variance() {
        let t = PlayerThresholds::default();
        assert_eq!(aim_stability_anomaly(Some(0.0), &t), 1.0);
        assert!((aim_stability_anomaly(Some(0.01), &t) - 0.5).abs() < 1e-12);
        assert_eq!(aim_stability_anomaly(Some(0.5), &t), 0.0);
        assert_eq!(aim_stability_anomaly(None, &t), 0.0);
    }

    #[test]
    fn player_flags_use_per_axis_cutoff() {
        let f = PlayerFeatures {
            fire_rate_anomaly: 0.31,
            hit_ratio_anomaly: 0.3,
            aim_stability_anomaly: 1.0,
            ..Default::default()
        };
        let s = player_score(&f, &cfg());
        assert_eq!(
            s.flags,
            vec![AnomalyFlag::FireRateAnomaly, AnomalyFlag::AimStabilityAnomaly]
        );
        assert!((s.score - (0.31 * 0.35 + 0.3 * 0.35 + 0.3)).abs() < 1e-12);
    }

    // -----------------------------------------------------------------------
    // Cashout and payout
    // -----------------------------------------------------------------------

    #[test]
    fn cashout_table_boundaries() {
        let p = PayoutThresholds::default();
        assert_eq!(cashout_action(0.0, 0.0, &p), CashoutAction::Allow);
        assert_eq!(cashout_action(0.39, 0.0, &p), CashoutAction::Allow);
        assert_eq!(cashout_action(0.4, 0.0, &p), CashoutAction::Delay);
        assert_eq!(cashout_action(0.0, 0.69, &p), CashoutAction::Delay);
        assert_eq!(cashout_action(0.0, 0.7, &p), CashoutAction::SoftHold);
        assert_eq!(cashout_action(0.85, 0.1, &p), CashoutAction::SoftHold);
    }

    #[test]
    fn orb_multiplier_linear_to_floor() {
        let p = PayoutThresholds::default();
        assert_eq!(orb_multiplier(0.0, &p), 1.0);
        assert_eq!(orb_multiplier(0.5, &p), 1.0);
        let expected = 1.0 - ((0.9 - 0.5) / (1.0 - 0.5)) * (1.0 - 0.3);
        assert!((orb_multiplier(0.9, &p) - expected).abs() < 1e-12);
        assert!((orb_multiplier(1.0, &p) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn clamp_unit_maps_nan_to_zero() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(-1.0), 0.0);
        assert_eq!(clamp_unit(2.0), 1.0);
    }

    // -----------------------------------------------------------------------
    // LocalRiskEngine
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn local_engine_matches_pure_functions() {
        let engine = LocalRiskEngine::default();
        let f = PairFeatures {
            non_aggression: 0.9,
            farm_loop: 0.6,
            ..Default::default()
        };
        assert_eq!(engine.score_pair(&f).await, pair_score(&f, &cfg()));
        assert_eq!(engine.score_pair_now(&f), pair_score(&f, &cfg()));
        assert_eq!(engine.cashout_verdict(0.5, 0.1).await, CashoutAction::Delay);
        let pf = PlayerFeatures {
            aim_stability_anomaly: 0.8,
            ..Default::default()
        };
        assert_eq!(engine.score_player(&pf).await, player_score(&pf, &cfg()));
    }
}
