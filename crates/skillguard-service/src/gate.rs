//! Cashout decision gate.
//!
//! Sits on the money path, so it only reads in-memory state: it rescores the
//! player and reads the pair score left by the last scan. It never calls the
//! pluggable engine and never waits on I/O.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use skillguard_core::config::PayoutThresholds;
use skillguard_core::scoring;
use skillguard_core::types::{CashoutAction, CashoutVerdict, PlayerId, ReasonCode};
use skillguard_tracker::{PairTracker, PlayerAnomalyTracker};

pub struct CashoutGate {
    payout: PayoutThresholds,
    rng: StdRng,
}

impl CashoutGate {
    pub fn new(payout: PayoutThresholds) -> Self {
        Self {
            payout,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic delays, for replays and tests.
    pub fn seeded(payout: PayoutThresholds, seed: u64) -> Self {
        Self {
            payout,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Rescore `player` and decide on their cashout.
    pub fn evaluate(
        &mut self,
        player: &PlayerId,
        anomaly: &mut PlayerAnomalyTracker,
        pairs: &PairTracker,
        now: u64,
    ) -> CashoutVerdict {
        let player_score = anomaly.score_player(player, now).score;
        let worst = pairs.max_pair_risk_for(player);
        let verdict = self.decide(player_score, worst.score, worst.reasons);
        debug!(player = %player, action = %verdict.action(), player_score,
            max_pair_score = worst.score, "cashout: evaluated");
        verdict
    }

    /// Decision table over already-computed scores.
    pub fn decide(&mut self, player_score: f64, max_pair_score: f64, reasons: Vec<ReasonCode>) -> CashoutVerdict {
        match scoring::cashout_action(player_score, max_pair_score, &self.payout) {
            CashoutAction::Allow => CashoutVerdict::Allow,
            CashoutAction::Delay => CashoutVerdict::Delay {
                delay_ms: self.sample_delay(),
                reasons,
                player_score,
                max_pair_score,
            },
            CashoutAction::SoftHold => CashoutVerdict::SoftHold {
                reasons,
                player_score,
                max_pair_score,
            },
        }
    }

    /// Uniform in `[delay_min_ms, delay_max_ms]`.
    fn sample_delay(&mut self) -> u64 {
        let (lo, hi) = (self.payout.delay_min_ms, self.payout.delay_max_ms);
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillguard_core::config::RiskConfig;
    use skillguard_core::types::{PlayerSnapshot, Position};

    fn gate() -> CashoutGate {
        CashoutGate::seeded(PayoutThresholds::default(), 7)
    }

    #[test]
    fn clean_player_is_allowed() {
        let mut anomaly = PlayerAnomalyTracker::default();
        let pairs = PairTracker::default();
        let verdict = gate().evaluate(&PlayerId::from("p"), &mut anomaly, &pairs, 0);
        assert_eq!(verdict, CashoutVerdict::Allow);
        assert_eq!(serde_json::to_value(&verdict).unwrap(), serde_json::json!({"action": "allow"}));
    }

    #[test]
    fn delay_stays_within_bounds() {
        let p = PayoutThresholds::default();
        let mut g = gate();
        for _ in 0..500 {
            let v = g.decide(0.5, 0.0, vec![]);
            let d = v.delay_ms().unwrap();
            assert!((p.delay_min_ms..=p.delay_max_ms).contains(&d));
        }
    }

    #[test]
    fn soft_hold_has_no_delay() {
        let v = gate().decide(0.1, 0.85, vec![ReasonCode::NonAggression]);
        assert_eq!(v.action(), CashoutAction::SoftHold);
        assert_eq!(v.delay_ms(), None);
        assert_eq!(v.reasons(), &[ReasonCode::NonAggression]);
        assert_eq!(v.max_pair_score(), 0.85);
    }

    #[test]
    fn boundaries_follow_the_table() {
        let mut g = gate();
        assert_eq!(g.decide(0.3999, 0.0, vec![]).action(), CashoutAction::Allow);
        assert_eq!(g.decide(0.4, 0.0, vec![]).action(), CashoutAction::Delay);
        assert_eq!(g.decide(0.0, 0.6999, vec![]).action(), CashoutAction::Delay);
        assert_eq!(g.decide(0.0, 0.7, vec![]).action(), CashoutAction::SoftHold);
    }

    #[test]
    fn collapsed_delay_range_returns_min() {
        let payout = PayoutThresholds {
            delay_min_ms: 8_000,
            delay_max_ms: 8_000,
            ..PayoutThresholds::default()
        };
        let mut g = CashoutGate::seeded(payout, 1);
        assert_eq!(g.decide(0.5, 0.0, vec![]).delay_ms(), Some(8_000));
    }

    #[test]
    fn evaluate_reads_stored_pair_score() {
        let cfg = RiskConfig::default();
        let mut pairs = PairTracker::new(cfg.clone());
        let mut anomaly = PlayerAnomalyTracker::new(cfg);
        let snap = |id: &str| PlayerSnapshot {
            id: PlayerId::from(id),
            position: Position::new(0.0, 0.0),
            alive: true,
            joined: true,
            is_bot: false,
            shooting: false,
        };
        for i in 0..60 {
            pairs.record_proximity_tick(&snap("a"), &snap("b"), i * 2_000);
        }
        // Unscored pairs do not count yet.
        let before = gate().evaluate(&PlayerId::from("a"), &mut anomaly, &pairs, 120_000);
        assert_eq!(before, CashoutVerdict::Allow);

        pairs.score_all(118_000);
        let after = gate().evaluate(&PlayerId::from("a"), &mut anomaly, &pairs, 120_000);
        assert_eq!(after.action(), CashoutAction::Delay);
        assert!(after.reasons().contains(&ReasonCode::NonAggression));
    }
}
