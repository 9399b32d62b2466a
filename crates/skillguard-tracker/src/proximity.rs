//! Grid-bucketed proximity scanning.
//!
//! Safe to call every game frame: [`ProximityScanner::tick`] runs at most once
//! per `scan_interval_ms`. A run buckets scannable players into a uniform grid
//! whose cell size equals the proximity threshold, so any near pair sits in
//! the same or an adjacent cell. Each cell is compared against its 3x3
//! neighbourhood only, which is O(n) for evenly spread players.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use skillguard_core::config::RiskConfig;
use skillguard_core::traits::PlayerDirectory;
use skillguard_core::types::PlayerSnapshot;

use crate::pair_tracker::PairTracker;

/// Outcome of one scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScanReport {
    pub scanned_players: usize,
    pub near_pairs: usize,
    pub scored_pairs: usize,
    pub pruned_pairs: usize,
}

/// Rate-limited scanner feeding [`PairTracker`].
#[derive(Debug, Clone)]
pub struct ProximityScanner {
    interval_ms: u64,
    threshold: f64,
    last_scan_at: Option<u64>,
}

type Cell = (i64, i64);

impl ProximityScanner {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            interval_ms: config.scan_interval_ms,
            threshold: config.proximity_threshold,
            last_scan_at: None,
        }
    }

    pub fn last_scan_at(&self) -> Option<u64> {
        self.last_scan_at
    }

    fn due(&self, now: u64) -> bool {
        match self.last_scan_at {
            None => true,
            // A clock that stepped backwards restarts the cadence.
            Some(last) if now < last => true,
            Some(last) => now - last >= self.interval_ms,
        }
    }

    fn cell_of(&self, p: &PlayerSnapshot) -> Option<Cell> {
        let (x, y) = (p.position.x, p.position.y);
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(((x / self.threshold).floor() as i64, (y / self.threshold).floor() as i64))
    }

    /// Scan if due: record a proximity tick for every near pair, then rescore
    /// and prune the tracker. Returns `None` when rate limited.
    pub fn tick(
        &mut self,
        now: u64,
        directory: &dyn PlayerDirectory,
        pairs: &mut PairTracker,
    ) -> Option<ScanReport> {
        if !self.due(now) {
            return None;
        }
        self.last_scan_at = Some(now);

        let players: Vec<PlayerSnapshot> = directory
            .live_players()
            .into_iter()
            .filter(PlayerSnapshot::is_scannable)
            .collect();

        let near_pairs = if players.len() >= 2 {
            self.sweep(&players, pairs, now)
        } else {
            0
        };
        let scored_pairs = pairs.score_all(now);
        let pruned_pairs = pairs.prune_stale(now);

        let report = ScanReport {
            scanned_players: players.len(),
            near_pairs,
            scored_pairs,
            pruned_pairs,
        };
        debug!(players = report.scanned_players, near = near_pairs, tracked = scored_pairs,
            pruned = pruned_pairs, "proximity: scan complete");
        Some(report)
    }

    fn sweep(&self, players: &[PlayerSnapshot], pairs: &mut PairTracker, now: u64) -> usize {
        let mut grid: HashMap<Cell, Vec<usize>> = HashMap::new();
        for (idx, p) in players.iter().enumerate() {
            if let Some(cell) = self.cell_of(p) {
                grid.entry(cell).or_default().push(idx);
            }
        }

        let mut checked: HashSet<(usize, usize)> = HashSet::new();
        let mut near = 0;
        for (&(cx, cy), occupants) in &grid {
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let Some(neighbours) = grid.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for &i in occupants {
                        for &j in neighbours {
                            let (a, b) = (&players[i], &players[j]);
                            // Canonical order also skips self-pairs.
                            if a.id >= b.id || !checked.insert((i, j)) {
                                continue;
                            }
                            if a.position.distance(&b.position) < self.threshold {
                                pairs.record_proximity_tick(a, b, now);
                                near += 1;
                            }
                        }
                    }
                }
            }
        }
        near
    }
}
