//! Single-player input anomaly tracking.
//!
//! Each player gets an [`AnomalyRecord`] with three fixed-size rings (shot
//! timestamps, hit distances, aim angles) and lifetime shot/hit counters.
//! Scoring is a pure function of that state: fire-rate, hit-ratio and
//! aim-stability subscores combined by fixed weights.

use std::collections::HashMap;

use tracing::debug;

use skillguard_core::config::{BufferSizes, RiskConfig};
use skillguard_core::ring::Ring;
use skillguard_core::scoring;
use skillguard_core::types::{AnomalyFlag, PlayerFeatures, PlayerId, PlayerScore};

/// Per-player history and the subscores of the last scoring pass.
#[derive(Debug, Clone)]
pub struct AnomalyRecord {
    pub player: PlayerId,
    shot_times: Ring<u64>,
    hit_distances: Ring<f64>,
    angles: Ring<f64>,
    pub shots_total: u64,
    pub hits_total: u64,
    pub fire_rate_anomaly: f64,
    pub hit_ratio_anomaly: f64,
    pub aim_stability_anomaly: f64,
    pub score: f64,
    pub flags: Vec<AnomalyFlag>,
    pub last_scored_at: Option<u64>,
    /// Set once per connection by the device registry.
    pub device_token_hash: Option<String>,
}

impl AnomalyRecord {
    fn new(player: PlayerId, sizes: &BufferSizes) -> Self {
        Self {
            player,
            shot_times: Ring::with_capacity(sizes.shots),
            hit_distances: Ring::with_capacity(sizes.hit_distances),
            angles: Ring::with_capacity(sizes.angles),
            shots_total: 0,
            hits_total: 0,
            fire_rate_anomaly: 0.0,
            hit_ratio_anomaly: 0.0,
            aim_stability_anomaly: 0.0,
            score: 0.0,
            flags: Vec::new(),
            last_scored_at: None,
            device_token_hash: None,
        }
    }

    pub fn buffered_shots(&self) -> usize {
        self.shot_times.len()
    }

    pub fn median_inter_shot_ms(&self) -> Option<f64> {
        scoring::median_interval(&self.shot_times.to_vec())
    }

    pub fn avg_hit_distance(&self) -> f64 {
        scoring::mean(&self.hit_distances.to_vec())
    }

    pub fn aim_std_dev(&self, min_samples: usize) -> Option<f64> {
        scoring::population_std_dev(&self.angles.to_vec(), min_samples)
    }

    /// Recompute the three subscores from the buffered history.
    pub fn features(&self, cfg: &RiskConfig) -> PlayerFeatures {
        let t = &cfg.player_thresholds;
        let median = self.median_inter_shot_ms();
        let avg_dist = self.avg_hit_distance();
        let std_dev = self.aim_std_dev(t.aim_min_samples);
        PlayerFeatures {
            fire_rate_anomaly: scoring::fire_rate_anomaly(median, self.buffered_shots(), t),
            hit_ratio_anomaly: scoring::hit_ratio_anomaly(self.shots_total, self.hits_total, avg_dist, t),
            aim_stability_anomaly: scoring::aim_stability_anomaly(std_dev, t),
            shots_total: self.shots_total,
            hits_total: self.hits_total,
            median_inter_shot_ms: median,
            avg_hit_distance: avg_dist,
            aim_angle_std_dev: std_dev,
        }
    }
}

/// Owns every [`AnomalyRecord`].
#[derive(Debug, Clone)]
pub struct PlayerAnomalyTracker {
    config: RiskConfig,
    players: HashMap<PlayerId, AnomalyRecord>,
}

impl PlayerAnomalyTracker {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            players: HashMap::new(),
        }
    }

    fn entry(&mut self, player: &PlayerId) -> &mut AnomalyRecord {
        let sizes = self.config.buffers;
        self.players
            .entry(player.clone())
            .or_insert_with(|| AnomalyRecord::new(player.clone(), &sizes))
    }

    // -----------------------------------------------------------------------
    // Event recorders
    // -----------------------------------------------------------------------

    /// A shot left `player`'s gun at `angle` radians.
    pub fn record_shot(&mut self, player: &PlayerId, angle: f64, now: u64) {
        let rec = self.entry(player);
        rec.shot_times.push(now);
        rec.shots_total = rec.shots_total.saturating_add(1);
        if angle.is_finite() {
            rec.angles.push(angle);
        }
    }

    /// `attacker` hit `victim` from `distance` world units away.
    pub fn record_hit(&mut self, attacker: &PlayerId, victim: &PlayerId, distance: f64) {
        let rec = self.entry(attacker);
        rec.hits_total = rec.hits_total.saturating_add(1);
        if distance.is_finite() && distance >= 0.0 {
            rec.hit_distances.push(distance);
        }
        debug!(attacker = %attacker, victim = %victim, distance, "anomaly: hit recorded");
    }

    pub fn set_device_token_hash(&mut self, player: &PlayerId, hash: String) {
        self.entry(player).device_token_hash = Some(hash);
    }

    pub fn device_token_hash(&self, player: &PlayerId) -> Option<&str> {
        self.players.get(player).and_then(|r| r.device_token_hash.as_deref())
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    /// Recompute and store `player`'s subscores, score and flags.
    pub fn score_player(&mut self, player: &PlayerId, now: u64) -> PlayerScore {
        let sizes = self.config.buffers;
        let rec = self
            .players
            .entry(player.clone())
            .or_insert_with(|| AnomalyRecord::new(player.clone(), &sizes));
        let features = rec.features(&self.config);
        let result = scoring::player_score(&features, &self.config);

        rec.fire_rate_anomaly = features.fire_rate_anomaly;
        rec.hit_ratio_anomaly = features.hit_ratio_anomaly;
        rec.aim_stability_anomaly = features.aim_stability_anomaly;
        rec.score = result.score;
        rec.flags = result.flags.clone();
        rec.last_scored_at = Some(now);

        if !result.flags.is_empty() {
            debug!(player = %player, score = result.score,
                flags = %skillguard_core::types::join_codes(&result.flags),
                "anomaly: player flagged");
        }
        result
    }

    /// Rescore every tracked player.
    pub fn score_all(&mut self, now: u64) -> usize {
        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        for id in &ids {
            self.score_player(id, now);
        }
        ids.len()
    }

    /// Fresh features of a player. Defaults for unknown players.
    pub fn extract_features(&self, player: &PlayerId) -> PlayerFeatures {
        self.players
            .get(player)
            .map(|r| r.features(&self.config))
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Last stored score; zero for unknown players.
    pub fn score(&self, player: &PlayerId) -> f64 {
        self.players.get(player).map(|r| r.score).unwrap_or(0.0)
    }

    pub fn record(&self, player: &PlayerId) -> Option<&AnomalyRecord> {
        self.players.get(player)
    }

    pub fn records(&self) -> impl Iterator<Item = &AnomalyRecord> {
        self.players.values()
    }

    /// Players with a stored score at or above `threshold`, highest first.
    pub fn flagged_players(&self, threshold: f64) -> Vec<&AnomalyRecord> {
        let mut out: Vec<&AnomalyRecord> =
            self.players.values().filter(|r| r.score >= threshold).collect();
        out.sort_by(|x, y| y.score.total_cmp(&x.score).then_with(|| x.player.cmp(&y.player)));
        out
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Records survive disconnect so the other side of a pair can still be
    /// evaluated. Use [`remove_player`](Self::remove_player) to drop one.
    pub fn on_player_disconnect(&self, player: &PlayerId) {
        debug!(player = %player, tracked = self.players.contains_key(player),
            "anomaly: player disconnected, record retained");
    }

    pub fn remove_player(&mut self, player: &PlayerId) -> bool {
        let removed = self.players.remove(player).is_some();
        if removed {
            debug!(player = %player, "anomaly: record removed");
        }
        removed
    }
}

impl Default for PlayerAnomalyTracker {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    /// Shots at a fixed cadence with jittered angles.
    fn fire(t: &mut PlayerAnomalyTracker, p: &PlayerId, n: u64, interval: u64, start: u64) {
        for i in 0..n {
            let angle = if i % 2 == 0 { 0.5 } else { -0.5 };
            t.record_shot(p, angle, start + i * interval);
        }
    }

    // -------------------------------------------------------------------------
    // Fire rate
    // -------------------------------------------------------------------------

    #[test]
    fn human_cadence_is_clean() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("human");
        fire(&mut t, &p, 30, 250, 0);
        let s = t.score_player(&p, 10_000);
        assert_eq!(s.score, 0.0);
        assert!(s.flags.is_empty());
    }

    #[test]
    fn cooldown_cadence_is_flagged() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("macro");
        fire(&mut t, &p, 30, 100, 0);
        let s = t.score_player(&p, 10_000);
        assert_eq!(t.record(&p).unwrap().fire_rate_anomaly, 1.0);
        assert!(s.flags.contains(&AnomalyFlag::FireRateAnomaly));
        assert!((s.score - 0.35).abs() < 1e-12);
    }

    #[test]
    fn fire_rate_needs_min_buffered_shots() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("p");
        fire(&mut t, &p, 9, 100, 0);
        t.score_player(&p, 1_000);
        assert_eq!(t.record(&p).unwrap().fire_rate_anomaly, 0.0);
    }

    // -------------------------------------------------------------------------
    // Hit ratio
    // -------------------------------------------------------------------------

    #[test]
    fn long_range_accuracy_is_flagged() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("sniper");
        fire(&mut t, &p, 20, 300, 0);
        for _ in 0..20 {
            t.record_hit(&p, &pid("v"), 700.0);
        }
        let s = t.score_player(&p, 10_000);
        assert_eq!(t.record(&p).unwrap().hit_ratio_anomaly, 1.0);
        assert!(s.flags.contains(&AnomalyFlag::HitRatioAnomaly));
    }

    #[test]
    fn close_range_accuracy_is_not_flagged() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("brawler");
        fire(&mut t, &p, 20, 300, 0);
        for _ in 0..20 {
            t.record_hit(&p, &pid("v"), 50.0);
        }
        t.score_player(&p, 10_000);
        assert_eq!(t.record(&p).unwrap().hit_ratio_anomaly, 0.0);
    }

    #[test]
    fn hits_credit_attacker_only() {
        let mut t = PlayerAnomalyTracker::default();
        t.record_hit(&pid("a"), &pid("b"), 100.0);
        assert_eq!(t.record(&pid("a")).unwrap().hits_total, 1);
        assert!(t.record(&pid("b")).is_none());
    }

    // -------------------------------------------------------------------------
    // Aim stability
    // -------------------------------------------------------------------------

    #[test]
    fn constant_angles_are_flagged() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("bot");
        for i in 0..20 {
            t.record_shot(&p, 0.5, i * 400);
        }
        let s = t.score_player(&p, 10_000);
        assert_eq!(t.record(&p).unwrap().aim_stability_anomaly, 1.0);
        assert_eq!(s.flags, vec![AnomalyFlag::AimStabilityAnomaly]);
    }

    #[test]
    fn few_angles_get_benefit_of_doubt() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("new");
        for i in 0..4 {
            t.record_shot(&p, 0.0, i * 400);
        }
        t.score_player(&p, 10_000);
        assert_eq!(t.record(&p).unwrap().aim_stability_anomaly, 0.0);
    }

    #[test]
    fn non_finite_angle_counts_shot_only() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("p");
        t.record_shot(&p, f64::NAN, 0);
        let f = t.extract_features(&p);
        assert_eq!(f.shots_total, 1);
        assert_eq!(f.aim_angle_std_dev, None);
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[test]
    fn unknown_player_scores_zero() {
        let t = PlayerAnomalyTracker::default();
        assert_eq!(t.score(&pid("ghost")), 0.0);
        assert_eq!(t.extract_features(&pid("ghost")), PlayerFeatures::default());
    }

    #[test]
    fn disconnect_retains_record_remove_drops_it() {
        let mut t = PlayerAnomalyTracker::default();
        let p = pid("p");
        t.record_shot(&p, 0.1, 0);
        t.on_player_disconnect(&p);
        assert_eq!(t.len(), 1);
        assert!(t.remove_player(&p));
        assert!(!t.remove_player(&p));
        assert!(t.is_empty());
    }

    #[test]
    fn flagged_players_threshold() {
        let mut t = PlayerAnomalyTracker::default();
        fire(&mut t, &pid("macro"), 30, 100, 0);
        fire(&mut t, &pid("human"), 30, 250, 0);
        t.score_all(10_000);
        let flagged = t.flagged_players(0.3);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].player, pid("macro"));
    }

    #[test]
    fn device_hash_is_stored() {
        let mut t = PlayerAnomalyTracker::default();
        t.set_device_token_hash(&pid("p"), "abc".into());
        assert_eq!(t.device_token_hash(&pid("p")), Some("abc"));
        assert_eq!(t.device_token_hash(&pid("q")), None);
    }
}
