//! Per-pair rolling statistics and collusion scoring.
//!
//! Every unordered pair of players that has been near each other, traded
//! damage, or killed one another gets a [`PairRecord`]. Its accumulators live
//! in a tumbling window: when a window elapses they are multiplied by
//! `decay_factor` once per elapsed window, so both memory and score magnitude
//! stay bounded without a cleanup job. Records with no activity for
//! `pair_stale_timeout_ms` are pruned.
//!
//! Next to the in-memory records sits the [`EncounterLedger`], a coarser
//! wallet-level log of proximity ticks over the trailing 24 h. It survives
//! reconnection under a new player ID and feeds the repeated-encounter feature.
//!
//! # Usage
//!
//! Call the `record_*` methods from game event hooks, [`PairTracker::score_all`]
//! after every proximity scan, and [`PairTracker::prune_stale`] periodically.
//! Read the results with [`PairTracker::max_pair_risk_for`] and friends.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use skillguard_core::config::RiskConfig;
use skillguard_core::scoring;
use skillguard_core::traits::PlayerDirectory;
use skillguard_core::types::{
    PairFeatures, PairScore, PlayerId, PlayerSnapshot, Position, ReasonCode, join_codes,
};

// ---------------------------------------------------------------------------
// Pair identity
// ---------------------------------------------------------------------------

/// Unordered pair of players, stored in canonical order (`a < b`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey {
    a: PlayerId,
    b: PlayerId,
}

impl PairKey {
    /// Build the canonical key. Argument order does not matter.
    pub fn new(x: &PlayerId, y: &PlayerId) -> Self {
        if x <= y {
            Self { a: x.clone(), b: y.clone() }
        } else {
            Self { a: y.clone(), b: x.clone() }
        }
    }

    pub fn a(&self) -> &PlayerId {
        &self.a
    }

    pub fn b(&self) -> &PlayerId {
        &self.b
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        &self.a == player || &self.b == player
    }

    /// The member of the pair that is not `player`.
    pub fn other(&self, player: &PlayerId) -> Option<&PlayerId> {
        if &self.a == player {
            Some(&self.b)
        } else if &self.b == player {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.a, self.b)
    }
}

// ---------------------------------------------------------------------------
// Pair record
// ---------------------------------------------------------------------------

/// Decaying accumulators of one pair. Directional fields are relative to the
/// canonical `a`/`b` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PairAccumulators {
    pub proximity_ticks: f64,
    pub close_no_shot_ticks: f64,
    pub damage_a_to_b: f64,
    pub damage_b_to_a: f64,
    pub kills_a_to_b: f64,
    pub kills_b_to_a: f64,
    pub orb_pickups_near_kill: f64,
}

impl PairAccumulators {
    fn scale(&mut self, factor: f64) {
        self.proximity_ticks *= factor;
        self.close_no_shot_ticks *= factor;
        self.damage_a_to_b *= factor;
        self.damage_b_to_a *= factor;
        self.kills_a_to_b *= factor;
        self.kills_b_to_a *= factor;
        self.orb_pickups_near_kill *= factor;
    }

    pub fn total_kills(&self) -> f64 {
        self.kills_a_to_b + self.kills_b_to_a
    }

    pub fn total_damage(&self) -> f64 {
        self.damage_a_to_b + self.damage_b_to_a
    }

    pub fn peak_damage(&self) -> f64 {
        self.damage_a_to_b.max(self.damage_b_to_a)
    }

    /// Derive the scored features plus raw context.
    pub fn features(&self, encounters: u32, cfg: &RiskConfig) -> PairFeatures {
        let t = &cfg.pair_thresholds;
        PairFeatures {
            time_in_proximity: scoring::time_in_proximity(self.proximity_ticks, cfg),
            non_aggression: scoring::non_aggression(self.close_no_shot_ticks, self.proximity_ticks),
            farm_loop: scoring::farm_loop(self.orb_pickups_near_kill, self.total_kills(), t),
            repeated_encounters_normalized: scoring::encounters_normalized(encounters, t),
            damage_symmetry: scoring::damage_symmetry(self.damage_a_to_b, self.damage_b_to_a, t),
            repeated_encounters: encounters,
            total_kills: self.total_kills(),
            total_damage: self.total_damage(),
            peak_damage: self.peak_damage(),
        }
    }
}

/// Whole windows elapsed since `window_start`.
fn windows_elapsed(window_start: u64, now: u64, window_ms: u64) -> u64 {
    now.saturating_sub(window_start) / window_ms.max(1)
}

fn decay_multiplier(decay_factor: f64, windows: u64) -> f64 {
    decay_factor.powi(windows.min(i32::MAX as u64) as i32)
}

/// State kept for one pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairRecord {
    pub key: PairKey,
    pub wallet_a: Option<String>,
    pub wallet_b: Option<String>,
    pub acc: PairAccumulators,
    pub window_start: u64,
    pub last_kill_at: Option<u64>,
    pub last_kill_pos: Option<Position>,
    pub score: f64,
    pub reasons: Vec<ReasonCode>,
    pub last_scored_at: Option<u64>,
    pub last_activity_at: u64,
}

impl PairRecord {
    fn new(key: PairKey, wallet_a: Option<String>, wallet_b: Option<String>, now: u64) -> Self {
        Self {
            key,
            wallet_a,
            wallet_b,
            acc: PairAccumulators::default(),
            window_start: now,
            last_kill_at: None,
            last_kill_pos: None,
            score: 0.0,
            reasons: Vec::new(),
            last_scored_at: None,
            last_activity_at: now,
        }
    }

    /// Age the accumulators by every whole window elapsed since
    /// `window_start`. Returns the number of windows applied.
    pub fn apply_decay(&mut self, now: u64, cfg: &RiskConfig) -> u64 {
        let windows = windows_elapsed(self.window_start, now, cfg.window_duration_ms);
        if windows == 0 {
            return 0;
        }
        self.acc.scale(decay_multiplier(cfg.decay_factor, windows));
        self.window_start = self
            .window_start
            .saturating_add(windows.saturating_mul(cfg.window_duration_ms));
        windows
    }

    /// Accumulators as they would read after decay at `now`, without mutating.
    pub fn decayed(&self, now: u64, cfg: &RiskConfig) -> PairAccumulators {
        let mut acc = self.acc;
        let windows = windows_elapsed(self.window_start, now, cfg.window_duration_ms);
        if windows > 0 {
            acc.scale(decay_multiplier(cfg.decay_factor, windows));
        }
        acc
    }

    fn touch(&mut self, now: u64) {
        self.last_activity_at = self.last_activity_at.max(now);
    }

    /// Both wallets, once both players have authenticated.
    pub fn wallet_pair(&self) -> Option<(&str, &str)> {
        match (&self.wallet_a, &self.wallet_b) {
            (Some(a), Some(b)) => Some((a.as_str(), b.as_str())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet encounter ledger
// ---------------------------------------------------------------------------

/// Flushable view of one wallet pair in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncounterSummary {
    pub wallet_a: String,
    pub wallet_b: String,
    pub encounter_count: u32,
    pub latest_at: u64,
}

/// Wallet pair -> proximity tick timestamps over a trailing window.
#[derive(Debug, Clone)]
pub struct EncounterLedger {
    window_ms: u64,
    entries: HashMap<(String, String), VecDeque<u64>>,
}

impl EncounterLedger {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            entries: HashMap::new(),
        }
    }

    fn key(wa: &str, wb: &str) -> (String, String) {
        if wa <= wb {
            (wa.to_string(), wb.to_string())
        } else {
            (wb.to_string(), wa.to_string())
        }
    }

    fn cutoff(&self, now: u64) -> u64 {
        now.saturating_sub(self.window_ms)
    }

    fn prune_queue(queue: &mut VecDeque<u64>, cutoff: u64) {
        while queue.front().is_some_and(|t| *t < cutoff) {
            queue.pop_front();
        }
    }

    pub fn record(&mut self, wa: &str, wb: &str, now: u64) {
        let cutoff = self.cutoff(now);
        let queue = self.entries.entry(Self::key(wa, wb)).or_default();
        queue.push_back(now);
        Self::prune_queue(queue, cutoff);
    }

    /// Encounters inside the trailing window at `now`.
    pub fn count(&self, wa: &str, wb: &str, now: u64) -> u32 {
        let cutoff = self.cutoff(now);
        self.entries
            .get(&Self::key(wa, wb))
            .map(|q| q.iter().filter(|t| **t >= cutoff).count() as u32)
            .unwrap_or(0)
    }

    /// Drop expired timestamps and empty entries. Returns entries removed.
    pub fn prune(&mut self, now: u64) -> usize {
        let cutoff = self.cutoff(now);
        let before = self.entries.len();
        self.entries.retain(|_, queue| {
            Self::prune_queue(queue, cutoff);
            !queue.is_empty()
        });
        before - self.entries.len()
    }

    pub fn summary(&self, now: u64) -> Vec<EncounterSummary> {
        let cutoff = self.cutoff(now);
        let mut rows: Vec<EncounterSummary> = self
            .entries
            .iter()
            .filter_map(|((wa, wb), queue)| {
                let count = queue.iter().filter(|t| **t >= cutoff).count();
                let latest = *queue.back()?;
                (count > 0).then(|| EncounterSummary {
                    wallet_a: wa.clone(),
                    wallet_b: wb.clone(),
                    encounter_count: count as u32,
                    latest_at: latest,
                })
            })
            .collect();
        rows.sort_by(|x, y| (&x.wallet_a, &x.wallet_b).cmp(&(&y.wallet_a, &y.wallet_b)));
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Highest pair score a player is part of, with that pair's reasons.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaxPairRisk {
    pub score: f64,
    pub reasons: Vec<ReasonCode>,
    pub counterpart: Option<PlayerId>,
}

/// Owns every [`PairRecord`] and the wallet encounter ledger.
pub struct PairTracker {
    config: RiskConfig,
    directory: Option<Arc<dyn PlayerDirectory>>,
    pairs: HashMap<PairKey, PairRecord>,
    encounters: EncounterLedger,
}

impl PairTracker {
    /// Create an empty tracker. Wallets stay unresolved until a directory is
    /// attached with [`with_directory`](Self::with_directory).
    pub fn new(config: RiskConfig) -> Self {
        let encounters = EncounterLedger::new(config.encounter_window_ms);
        Self {
            config,
            directory: None,
            pairs: HashMap::new(),
            encounters,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn PlayerDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    fn resolve_wallet(directory: Option<&dyn PlayerDirectory>, player: &PlayerId) -> Option<String> {
        directory.and_then(|d| d.wallet_address(player))
    }

    /// Look up or lazily create the record for `x`/`y`.
    fn entry<'a>(
        pairs: &'a mut HashMap<PairKey, PairRecord>,
        directory: Option<&dyn PlayerDirectory>,
        x: &PlayerId,
        y: &PlayerId,
        now: u64,
    ) -> &'a mut PairRecord {
        pairs.entry(PairKey::new(x, y)).or_insert_with_key(|key| {
            let wallet_a = Self::resolve_wallet(directory, key.a());
            let wallet_b = Self::resolve_wallet(directory, key.b());
            debug!(pair = %key, "pair_tracker: pair created");
            PairRecord::new(key.clone(), wallet_a, wallet_b, now)
        })
    }

    // -----------------------------------------------------------------------
    // Event recorders
    // -----------------------------------------------------------------------

    /// Two scannable players were within the proximity threshold this scan.
    pub fn record_proximity_tick(&mut self, a: &PlayerSnapshot, b: &PlayerSnapshot, now: u64) {
        if a.id == b.id {
            return;
        }
        let directory = self.directory.as_deref();
        let rec = Self::entry(&mut self.pairs, directory, &a.id, &b.id, now);
        rec.apply_decay(now, &self.config);
        rec.acc.proximity_ticks += 1.0;
        if !a.shooting && !b.shooting {
            rec.acc.close_no_shot_ticks += 1.0;
        }
        rec.touch(now);

        // Players may authenticate after the pair was first seen.
        if rec.wallet_a.is_none() {
            rec.wallet_a = Self::resolve_wallet(directory, &rec.key.a);
        }
        if rec.wallet_b.is_none() {
            rec.wallet_b = Self::resolve_wallet(directory, &rec.key.b);
        }

        if let Some((wa, wb)) = rec.wallet_pair() {
            self.encounters.record(wa, wb, now);
        }
    }

    /// Directed damage from `attacker` to `victim`.
    pub fn record_damage(&mut self, attacker: &PlayerId, victim: &PlayerId, amount: f64, now: u64) {
        if attacker == victim || !amount.is_finite() || amount <= 0.0 {
            return;
        }
        let rec = Self::entry(&mut self.pairs, self.directory.as_deref(), attacker, victim, now);
        rec.apply_decay(now, &self.config);
        rec.touch(now);
        if &rec.key.a == attacker {
            rec.acc.damage_a_to_b += amount;
        } else {
            rec.acc.damage_b_to_a += amount;
        }
    }

    pub fn record_kill(&mut self, killer: &PlayerId, victim: &PlayerId, pos: Position, now: u64) {
        if killer == victim {
            return;
        }
        let rec = Self::entry(&mut self.pairs, self.directory.as_deref(), killer, victim, now);
        rec.apply_decay(now, &self.config);
        rec.touch(now);
        if &rec.key.a == killer {
            rec.acc.kills_a_to_b += 1.0;
        } else {
            rec.acc.kills_b_to_a += 1.0;
        }
        rec.last_kill_at = Some(now);
        rec.last_kill_pos = Some(pos);
        debug!(pair = %rec.key, killer = %killer, "pair_tracker: kill recorded");
    }

    /// `collector` picked up an orb dropped by `source`. Counts toward
    /// farm-loop only within `orb_kill_window_ms` of a kill between the two.
    /// Never creates a record. Returns whether the pickup counted.
    pub fn record_orb_pickup(&mut self, collector: &PlayerId, source: Option<&PlayerId>, now: u64) -> bool {
        let Some(source) = source else {
            return false;
        };
        if collector == source {
            return false;
        }
        let Some(rec) = self.pairs.get_mut(&PairKey::new(collector, source)) else {
            return false;
        };
        rec.apply_decay(now, &self.config);
        match rec.last_kill_at {
            Some(kill_at) if now.saturating_sub(kill_at) < self.config.orb_kill_window_ms => {
                rec.acc.orb_pickups_near_kill += 1.0;
                rec.touch(now);
                debug!(pair = %rec.key, collector = %collector, "pair_tracker: orb pickup near kill");
                true
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    fn rescore(rec: &mut PairRecord, encounters: &EncounterLedger, cfg: &RiskConfig, now: u64) -> PairScore {
        rec.apply_decay(now, cfg);
        let count = rec
            .wallet_pair()
            .map(|(wa, wb)| encounters.count(wa, wb, now))
            .unwrap_or(0);
        let result = scoring::pair_score(&rec.acc.features(count, cfg), cfg);
        rec.score = result.score;
        rec.reasons = result.reasons.clone();
        rec.last_scored_at = Some(now);
        result
    }

    /// Rescore one pair. `None` if the pair is not tracked.
    pub fn score_pair(&mut self, x: &PlayerId, y: &PlayerId, now: u64) -> Option<PairScore> {
        let rec = self.pairs.get_mut(&PairKey::new(x, y))?;
        Some(Self::rescore(rec, &self.encounters, &self.config, now))
    }

    /// Rescore every tracked pair. Returns how many were scored.
    pub fn score_all(&mut self, now: u64) -> usize {
        for rec in self.pairs.values_mut() {
            Self::rescore(rec, &self.encounters, &self.config, now);
        }
        self.pairs.len()
    }

    /// Decay-applied features of one pair, for the pluggable engine.
    pub fn extract_features(&mut self, x: &PlayerId, y: &PlayerId, now: u64) -> Option<PairFeatures> {
        let rec = self.pairs.get_mut(&PairKey::new(x, y))?;
        rec.apply_decay(now, &self.config);
        let count = rec
            .wallet_pair()
            .map(|(wa, wb)| self.encounters.count(wa, wb, now))
            .unwrap_or(0);
        Some(rec.acc.features(count, &self.config))
    }

    /// Features of a record as they read at `now`, without mutating it.
    pub fn features_of(&self, rec: &PairRecord, now: u64) -> PairFeatures {
        let count = rec
            .wallet_pair()
            .map(|(wa, wb)| self.encounters.count(wa, wb, now))
            .unwrap_or(0);
        rec.decayed(now, &self.config).features(count, &self.config)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, x: &PlayerId, y: &PlayerId) -> Option<&PairRecord> {
        self.pairs.get(&PairKey::new(x, y))
    }

    pub fn records(&self) -> impl Iterator<Item = &PairRecord> {
        self.pairs.values()
    }

    pub fn pairs_for_player(&self, player: &PlayerId) -> Vec<&PairRecord> {
        self.pairs.values().filter(|r| r.key.contains(player)).collect()
    }

    /// Stored score of the worst pair `player` belongs to. Zero with no
    /// reasons when the player has no scored pair.
    pub fn max_pair_risk_for(&self, player: &PlayerId) -> MaxPairRisk {
        let mut worst = MaxPairRisk::default();
        for rec in self.pairs.values().filter(|r| r.key.contains(player)) {
            if rec.score > worst.score {
                worst = MaxPairRisk {
                    score: rec.score,
                    reasons: rec.reasons.clone(),
                    counterpart: rec.key.other(player).cloned(),
                };
            }
        }
        worst
    }

    /// Pairs whose stored score is at or above `threshold`, highest first.
    pub fn flagged_pairs(&self, threshold: f64) -> Vec<&PairRecord> {
        let mut out: Vec<&PairRecord> = self.pairs.values().filter(|r| r.score >= threshold).collect();
        out.sort_by(|x, y| y.score.total_cmp(&x.score).then_with(|| x.key.cmp(&y.key)));
        out
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Farm-loop feature between a collector and the orb's source, decayed to
    /// `now`. Zero for unknown pairs or a missing/identical source.
    pub fn farm_loop_score(&self, collector: &PlayerId, source: Option<&PlayerId>, now: u64) -> f64 {
        let Some(source) = source else {
            return 0.0;
        };
        if collector == source {
            return 0.0;
        }
        self.pairs
            .get(&PairKey::new(collector, source))
            .map(|rec| {
                let acc = rec.decayed(now, &self.config);
                scoring::farm_loop(acc.orb_pickups_near_kill, acc.total_kills(), &self.config.pair_thresholds)
            })
            .unwrap_or(0.0)
    }

    pub fn encounter_count(&self, wa: &str, wb: &str, now: u64) -> u32 {
        self.encounters.count(wa, wb, now)
    }

    pub fn encounter_summary(&self, now: u64) -> Vec<EncounterSummary> {
        self.encounters.summary(now)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Drop pairs idle for longer than the stale timeout and expired ledger
    /// entries. Returns the number of pairs removed.
    pub fn prune_stale(&mut self, now: u64) -> usize {
        let timeout = self.config.pair_stale_timeout_ms;
        let before = self.pairs.len();
        self.pairs.retain(|key, rec| {
            let keep = now.saturating_sub(rec.last_activity_at) <= timeout;
            if !keep {
                debug!(pair = %key, score = rec.score, "pair_tracker: stale pair pruned");
            }
            keep
        });
        let pruned = before - self.pairs.len();
        let expired = self.encounters.prune(now);
        if pruned > 0 || expired > 0 {
            info!(pruned, expired_wallet_pairs = expired, remaining = self.pairs.len(),
                "pair_tracker: prune pass");
        }
        pruned
    }

    /// Disconnects keep every pair record and ledger entry untouched, since
    /// the partner may still cash out against them. Records only leave via
    /// [`prune_stale`](Self::prune_stale). This only logs how many pairs the
    /// player still holds.
    pub fn on_player_disconnect(&self, player: &PlayerId) {
        let pairs = self.pairs.keys().filter(|k| k.contains(player)).count();
        debug!(player = %player, pairs, "pair_tracker: player disconnected, pairs retained");
    }

    /// One-line `key score reasons` summary, used by the periodic risk log.
    pub fn describe(rec: &PairRecord) -> String {
        format!("{} score={:.3} reasons=[{}]", rec.key, rec.score, join_codes(&rec.reasons))
    }
}

impl Default for PairTracker {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
