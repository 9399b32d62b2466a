//! Operator telemetry: the periodic risk summary, the recent-cashout ring and
//! the dashboard snapshot.
//!
//! Wallet addresses and device hashes are truncated before they leave this
//! module.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::info;

use skillguard_core::config::RiskConfig;
use skillguard_core::types::{
    AnomalyFlag, CashoutAction, CashoutVerdict, PlayerId, ReasonCode, join_codes,
};
use skillguard_tracker::anomaly::AnomalyRecord;
use skillguard_tracker::pair_tracker::PairRecord;
use skillguard_tracker::{PairTracker, PlayerAnomalyTracker};

use crate::config::ServiceConfig;

/// Score at which a pair or player counts as flagged in the summary.
pub const SUMMARY_FLAG_THRESHOLD: f64 = 0.3;

/// Pairs and players itemised per summary.
pub const SUMMARY_TOP: usize = 5;

const TRUNCATE_CHARS: usize = 8;

fn truncate(s: &str) -> String {
    let mut out: String = s.chars().take(TRUNCATE_CHARS).collect();
    out.push_str("...");
    out
}

fn round_to(x: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (x * scale).round() / scale
}

// ---------------------------------------------------------------------------
// Dashboard payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashoutLogEntry {
    pub player_id: PlayerId,
    pub action: CashoutAction,
    pub player_score: f64,
    pub max_pair_score: f64,
    pub reasons: Vec<ReasonCode>,
    pub ts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    pub scan_interval_ms: u64,
    pub proximity_threshold: f64,
    pub window_duration_ms: u64,
    pub cashout_allow: f64,
    pub cashout_soft_hold: f64,
    pub farm_diminish_start: f64,
}

impl From<&RiskConfig> for DashboardConfig {
    fn from(c: &RiskConfig) -> Self {
        Self {
            scan_interval_ms: c.scan_interval_ms,
            proximity_threshold: c.proximity_threshold,
            window_duration_ms: c.window_duration_ms,
            cashout_allow: c.payout.cashout_allow,
            cashout_soft_hold: c.payout.cashout_soft_hold,
            farm_diminish_start: c.payout.farm_diminish_start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairFeatureView {
    pub proximity: f64,
    pub non_aggression: f64,
    pub farm_loop: f64,
    #[serde(rename = "encounters24h")]
    pub encounters_24h: u32,
    pub dmg_symmetry: f64,
    pub total_kills: f64,
    pub total_damage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairView {
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub wallet_a: Option<String>,
    pub wallet_b: Option<String>,
    pub score: f64,
    pub reasons: Vec<ReasonCode>,
    pub features: PairFeatureView,
    pub last_active: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub score: f64,
    pub fire_rate: f64,
    pub hit_ratio: f64,
    pub aim_stability: f64,
    pub shots: u64,
    pub hits: u64,
    pub flags: Vec<AnomalyFlag>,
    pub device_token_hash: Option<String>,
}

impl From<&AnomalyRecord> for PlayerView {
    fn from(r: &AnomalyRecord) -> Self {
        Self {
            player_id: r.player.clone(),
            score: round_to(r.score, 4),
            fire_rate: round_to(r.fire_rate_anomaly, 3),
            hit_ratio: round_to(r.hit_ratio_anomaly, 3),
            aim_stability: round_to(r.aim_stability_anomaly, 3),
            shots: r.shots_total,
            hits: r.hits_total,
            flags: r.flags.clone(),
            device_token_hash: r.device_token_hash.as_deref().map(truncate),
        }
    }
}

/// Operator snapshot served at `GET /api/risk/dashboard`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub timestamp: u64,
    pub uptime_ms: u64,
    pub active_player_count: usize,
    pub active_pairs: usize,
    pub engine: String,
    pub config: DashboardConfig,
    pub pairs: Vec<PairView>,
    pub players: Vec<PlayerView>,
    pub recent_cashouts: Vec<CashoutLogEntry>,
}

// ---------------------------------------------------------------------------
// RiskLogger
// ---------------------------------------------------------------------------

pub struct RiskLogger {
    enabled: bool,
    interval_ms: u64,
    top_n: usize,
    shown: usize,
    capacity: usize,
    started_at: u64,
    last_log_at: Option<u64>,
    recent: VecDeque<CashoutLogEntry>,
}

impl RiskLogger {
    pub fn new(config: &ServiceConfig, started_at: u64) -> Self {
        Self {
            enabled: config.log_enabled,
            interval_ms: config.log_interval_ms,
            top_n: config.dashboard_top_n,
            shown: config.recent_cashout_shown,
            capacity: config.recent_cashout_capacity.max(1),
            started_at,
            last_log_at: None,
            recent: VecDeque::new(),
        }
    }

    /// Remember a verdict for the dashboard. Always recorded, even with
    /// logging disabled.
    pub fn log_cashout_decision(&mut self, player: &PlayerId, verdict: &CashoutVerdict, now: u64) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(CashoutLogEntry {
            player_id: player.clone(),
            action: verdict.action(),
            player_score: verdict.player_score(),
            max_pair_score: verdict.max_pair_score(),
            reasons: verdict.reasons().to_vec(),
            ts: now,
        });
    }

    pub fn log_risk_event(&self, event_type: &str, player: &PlayerId, verdict: &CashoutVerdict) {
        if !self.enabled {
            return;
        }
        info!(event = event_type, player = %player, action = %verdict.action(),
            player_score = format_args!("{:.3}", verdict.player_score()),
            pair_score = format_args!("{:.3}", verdict.max_pair_score()),
            reasons = %join_codes(verdict.reasons()),
            "risk: cashout escalated");
    }

    /// Periodic summary, at most once per interval and only when something
    /// is tracked. Returns whether a summary was logged.
    pub fn tick_log(&mut self, now: u64, pairs: &PairTracker, players: &PlayerAnomalyTracker) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(last) = self.last_log_at {
            if now >= last && now - last < self.interval_ms {
                return false;
            }
        }
        self.last_log_at = Some(now);

        let flagged_pairs = pairs.flagged_pairs(SUMMARY_FLAG_THRESHOLD);
        let flagged_players = players.flagged_players(SUMMARY_FLAG_THRESHOLD);
        if pairs.pair_count() == 0 && flagged_players.is_empty() {
            return false;
        }

        info!(tracked = pairs.pair_count(), flagged_pairs = flagged_pairs.len(),
            flagged_players = flagged_players.len(), "risk: summary");
        for rec in flagged_pairs.iter().take(SUMMARY_TOP) {
            let wa = rec.wallet_a.as_deref().map(truncate).unwrap_or_else(|| rec.key.a().to_string());
            let wb = rec.wallet_b.as_deref().map(truncate).unwrap_or_else(|| rec.key.b().to_string());
            info!(wallets = %format!("{wa}..{wb}"), pair = %PairTracker::describe(rec), "risk: flagged pair");
        }
        for rec in flagged_players.iter().take(SUMMARY_TOP) {
            info!(player = %rec.player,
                score = format_args!("{:.3}", rec.score),
                fire = format_args!("{:.2}", rec.fire_rate_anomaly),
                hit = format_args!("{:.2}", rec.hit_ratio_anomaly),
                aim = format_args!("{:.2}", rec.aim_stability_anomaly),
                "risk: flagged player");
        }
        true
    }

    /// Most recent first.
    pub fn recent_cashouts(&self) -> Vec<CashoutLogEntry> {
        self.recent.iter().rev().take(self.shown).cloned().collect()
    }

    fn pair_view(pairs: &PairTracker, rec: &PairRecord, now: u64) -> PairView {
        let f = pairs.features_of(rec, now);
        PairView {
            player_a: rec.key.a().clone(),
            player_b: rec.key.b().clone(),
            wallet_a: rec.wallet_a.as_deref().map(truncate),
            wallet_b: rec.wallet_b.as_deref().map(truncate),
            score: round_to(rec.score, 4),
            reasons: rec.reasons.clone(),
            features: PairFeatureView {
                proximity: round_to(f.time_in_proximity, 3),
                non_aggression: round_to(f.non_aggression, 3),
                farm_loop: round_to(f.farm_loop, 3),
                encounters_24h: f.repeated_encounters,
                dmg_symmetry: round_to(f.damage_symmetry, 3),
                total_kills: round_to(f.total_kills, 3),
                total_damage: round_to(f.total_damage, 3),
            },
            last_active: rec.last_activity_at,
        }
    }

    /// Build the dashboard payload. Every tracked pair and player is
    /// eligible, not only flagged ones.
    pub fn dashboard(
        &self,
        now: u64,
        engine: &str,
        active_player_count: usize,
        pairs: &PairTracker,
        players: &PlayerAnomalyTracker,
    ) -> DashboardSnapshot {
        DashboardSnapshot {
            timestamp: now,
            uptime_ms: now.saturating_sub(self.started_at),
            active_player_count,
            active_pairs: pairs.pair_count(),
            engine: engine.to_string(),
            config: DashboardConfig::from(pairs.config()),
            pairs: pairs
                .flagged_pairs(0.0)
                .into_iter()
                .take(self.top_n)
                .map(|rec| Self::pair_view(pairs, rec, now))
                .collect(),
            players: players
                .flagged_players(0.0)
                .into_iter()
                .take(self.top_n)
                .map(PlayerView::from)
                .collect(),
            recent_cashouts: self.recent_cashouts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillguard_core::types::{PlayerSnapshot, Position};

    const RECENT_CAP: usize = crate::config::RECENT_CASHOUT_CAPACITY;

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn logger() -> RiskLogger {
        RiskLogger::new(&ServiceConfig::default(), 1_000)
    }

    fn delay(score: f64) -> CashoutVerdict {
        CashoutVerdict::Delay {
            delay_ms: 6_000,
            reasons: vec![ReasonCode::FarmLoop],
            player_score: 0.0,
            max_pair_score: score,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    #[test]
    fn truncate_keeps_eight_chars() {
        assert_eq!(truncate("So1anaWa11etAddre55"), "So1anaWa...");
        assert_eq!(truncate("abc"), "abc...");
    }

    #[test]
    fn round_to_digits() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(0.5, 3), 0.5);
    }

    // -----------------------------------------------------------------------
    // Cashout ring
    // -----------------------------------------------------------------------

    #[test]
    fn recent_cashouts_newest_first_and_bounded() {
        let mut log = logger();
        for i in 0..60u64 {
            log.log_cashout_decision(&pid(&format!("p{i}")), &CashoutVerdict::Allow, i);
        }
        assert_eq!(log.recent.len(), RECENT_CAP);
        let shown = log.recent_cashouts();
        assert_eq!(shown.len(), 20);
        assert_eq!(shown[0].ts, 59);
        assert_eq!(shown[19].ts, 40);
        assert_eq!(shown[0].action, CashoutAction::Allow);
        assert_eq!(shown[0].player_score, 0.0);
    }

    #[test]
    fn cashout_entry_serializes_camel_case() {
        let mut log = logger();
        log.log_cashout_decision(&pid("p"), &delay(0.5), 42);
        let v = serde_json::to_value(&log.recent_cashouts()[0]).unwrap();
        assert_eq!(v["playerId"], "p");
        assert_eq!(v["action"], "delay");
        assert_eq!(v["maxPairScore"], 0.5);
        assert_eq!(v["reasons"][0], "FARM_LOOP");
    }

    // -----------------------------------------------------------------------
    // Summary
    // -----------------------------------------------------------------------

    #[test]
    fn tick_log_is_rate_limited_and_quiet_when_empty() {
        let mut log = logger();
        let pairs = PairTracker::default();
        let players = PlayerAnomalyTracker::default();
        assert!(!log.tick_log(0, &pairs, &players));

        let mut pairs = PairTracker::default();
        pairs.record_damage(&pid("a"), &pid("b"), 10.0, 0);
        assert!(!log.tick_log(5_000, &pairs, &players));
        assert!(log.tick_log(10_000, &pairs, &players));
        assert!(!log.tick_log(19_999, &pairs, &players));
    }

    #[test]
    fn disabled_logger_never_logs() {
        let cfg = ServiceConfig {
            log_enabled: false,
            ..ServiceConfig::default()
        };
        let mut log = RiskLogger::new(&cfg, 0);
        let mut pairs = PairTracker::default();
        pairs.record_damage(&pid("a"), &pid("b"), 10.0, 0);
        assert!(!log.tick_log(0, &pairs, &PlayerAnomalyTracker::default()));
    }

    // -----------------------------------------------------------------------
    // Dashboard
    // -----------------------------------------------------------------------

    #[test]
    fn dashboard_lists_pairs_with_rounded_features() {
        let log = logger();
        let mut pairs = PairTracker::default();
        let snap = |id: &str| PlayerSnapshot {
            id: pid(id),
            position: Position::new(0.0, 0.0),
            alive: true,
            joined: true,
            is_bot: false,
            shooting: false,
        };
        for _ in 0..7 {
            pairs.record_proximity_tick(&snap("b"), &snap("a"), 0);
        }
        pairs.score_all(0);
        let mut players = PlayerAnomalyTracker::default();
        players.set_device_token_hash(&pid("a"), "0123456789abcdef".into());

        let snapshot = log.dashboard(6_000, "LocalRiskEngine", 2, &pairs, &players);
        assert_eq!(snapshot.uptime_ms, 5_000);
        assert_eq!(snapshot.active_pairs, 1);
        let pair = &snapshot.pairs[0];
        assert_eq!(pair.player_a, pid("a"));
        assert_eq!(pair.wallet_a, None);
        assert_eq!(pair.features.proximity, 0.117);
        assert_eq!(pair.features.non_aggression, 1.0);
        assert_eq!(snapshot.players[0].device_token_hash.as_deref(), Some("01234567..."));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["engine"], "LocalRiskEngine");
        assert_eq!(json["config"]["scanIntervalMs"], 2_000);
        assert_eq!(json["pairs"][0]["features"]["encounters24h"], 0);
        assert!(json["recentCashouts"].as_array().unwrap().is_empty());
    }
}
