//! `RiskService`: the hook surface the game server calls.
//!
//! Each component sits behind its own mutex so the service can be shared
//! behind an `Arc` by a concurrent host. Locks are always taken in the order
//! scanner, pairs, players, devices, gate, logger, and none is held across an
//! `.await`. Hooks never fail: invalid input is dropped with a `debug!`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use skillguard_core::error::ConfigError;
use skillguard_core::scoring;
use skillguard_core::traits::{PlayerDirectory, RiskSink};
use skillguard_core::types::{
    CashoutVerdict, DeviceTokenRow, PairScore, PlayerId, PlayerSnapshot, Position,
    RiskEventMetadata, RiskEventRow, WalletPairEncounterRow, ms_to_datetime,
};
use skillguard_mpc::{SelectedEngine, create_engine};
use skillguard_tracker::pair_tracker::MaxPairRisk;
use skillguard_tracker::proximity::ScanReport;
use skillguard_tracker::{DeviceRegistry, PairTracker, PlayerAnomalyTracker, ProximityScanner};

use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::gate::CashoutGate;
use crate::logger::{DashboardSnapshot, RiskLogger};

fn nonzero(x: f64) -> Option<f64> {
    (x != 0.0).then_some(x)
}

pub struct RiskService {
    config: ServiceConfig,
    directory: Arc<dyn PlayerDirectory>,
    clock: Arc<dyn Clock>,
    engine: SelectedEngine,
    sink: Option<Arc<dyn RiskSink>>,
    scanner: Mutex<ProximityScanner>,
    pairs: Mutex<PairTracker>,
    players: Mutex<PlayerAnomalyTracker>,
    devices: Mutex<DeviceRegistry>,
    gate: Mutex<CashoutGate>,
    logger: Mutex<RiskLogger>,
    last_flush_at: AtomicU64,
}

impl RiskService {
    /// Wire the service to the host's players. The engine is picked from the
    /// MPC settings; time comes from the wall clock.
    pub fn init(
        config: ServiceConfig,
        directory: Arc<dyn PlayerDirectory>,
        sink: Option<Arc<dyn RiskSink>>,
    ) -> Result<Self, ConfigError> {
        let engine = create_engine(&config.risk, &config.mpc_or_default());
        Self::new(config, directory, engine, sink, Arc::new(SystemClock))
    }

    pub fn new(
        config: ServiceConfig,
        directory: Arc<dyn PlayerDirectory>,
        engine: SelectedEngine,
        sink: Option<Arc<dyn RiskSink>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now_ms();
        let risk = config.risk.clone();
        let service = Self {
            scanner: Mutex::new(ProximityScanner::new(&risk)),
            pairs: Mutex::new(PairTracker::new(risk.clone()).with_directory(directory.clone())),
            players: Mutex::new(PlayerAnomalyTracker::new(risk.clone())),
            devices: Mutex::new(DeviceRegistry::new(&risk, now)),
            gate: Mutex::new(CashoutGate::new(risk.payout)),
            logger: Mutex::new(RiskLogger::new(&config, now)),
            last_flush_at: AtomicU64::new(now),
            config,
            directory,
            clock,
            engine,
            sink,
        };
        info!(engine = service.engine.name, persistence = service.sink.is_some(),
            "risk: service initialized");
        Ok(service)
    }

    /// Replace the cashout gate, e.g. with a seeded one.
    pub fn with_gate(self, gate: CashoutGate) -> Self {
        *self.gate.lock() = gate;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // -----------------------------------------------------------------------
    // Game loop
    // -----------------------------------------------------------------------

    /// Call every game tick. Scans at most once per scan interval, emits the
    /// periodic summary and flushes the encounter ledger when due.
    pub fn tick_proximity_scanner(&self, now: u64) -> Option<ScanReport> {
        let report = {
            let mut scanner = self.scanner.lock();
            let mut pairs = self.pairs.lock();
            let report = scanner.tick(now, self.directory.as_ref(), &mut pairs);
            let players = self.players.lock();
            self.logger.lock().tick_log(now, &pairs, &players);
            report
        };
        self.flush_if_due(now);
        report
    }

    fn flush_if_due(&self, now: u64) {
        if self.sink.is_none() {
            return;
        }
        let last = self.last_flush_at.load(Ordering::SeqCst);
        if now.saturating_sub(last) <= self.config.flush_interval_ms {
            return;
        }
        if self
            .last_flush_at
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.flush_encounters(now);
    }

    /// Send the ledger summary to the sink. Returns the number of rows.
    pub fn flush_encounters(&self, now: u64) -> usize {
        let Some(sink) = &self.sink else {
            return 0;
        };
        let scan_interval_ms = self.config.risk.scan_interval_ms;
        let rows: Vec<WalletPairEncounterRow> = self
            .pairs
            .lock()
            .encounter_summary(now)
            .into_iter()
            .map(|s| WalletPairEncounterRow {
                proximity_duration_ms: s.encounter_count as u64 * scan_interval_ms,
                encounter_count: s.encounter_count,
                latest_at: ms_to_datetime(s.latest_at),
                wallet_a: s.wallet_a,
                wallet_b: s.wallet_b,
            })
            .collect();
        let n = rows.len();
        if n > 0 {
            debug!(rows = n, "risk: flushing wallet pair encounters");
            sink.wallet_pair_encounters(rows);
        }
        n
    }

    // -----------------------------------------------------------------------
    // Game events
    // -----------------------------------------------------------------------

    pub fn record_shot(&self, player: &PlayerId, angle: f64) {
        let now = self.now();
        self.players.lock().record_shot(player, angle, now);
    }

    /// A landed hit also counts as one bullet of directed pair damage.
    pub fn record_hit(&self, attacker: &PlayerId, victim: &PlayerId, distance: f64) {
        let now = self.now();
        self.pairs
            .lock()
            .record_damage(attacker, victim, self.config.risk.bullet_damage, now);
        self.players.lock().record_hit(attacker, victim, distance);
    }

    pub fn record_kill(&self, killer: &PlayerId, victim: &PlayerId, x: f64, y: f64) {
        let now = self.now();
        self.pairs.lock().record_kill(killer, victim, Position::new(x, y), now);
    }

    pub fn record_orb_pickup(&self, collector: &PlayerId, source: Option<&PlayerId>) -> bool {
        let now = self.now();
        self.pairs.lock().record_orb_pickup(collector, source, now)
    }

    /// Value multiplier for an orb `collector` picks up, in
    /// `[farm_diminish_floor, 1]`.
    pub fn orb_pickup_multiplier(&self, collector: &PlayerId, source: Option<&PlayerId>) -> f64 {
        match source {
            Some(s) if s != collector => {
                let now = self.now();
                let farm = self.pairs.lock().farm_loop_score(collector, Some(s), now);
                scoring::orb_multiplier(farm, &self.config.risk.payout)
            }
            _ => 1.0,
        }
    }

    // -----------------------------------------------------------------------
    // Cashout
    // -----------------------------------------------------------------------

    /// Call once per cashout request, before authorizing payout. Never
    /// touches the network.
    pub fn cashout_gate(&self, player: &PlayerId) -> CashoutVerdict {
        let now = self.now();
        let verdict = {
            let pairs = self.pairs.lock();
            let mut players = self.players.lock();
            let verdict = self.gate.lock().evaluate(player, &mut players, &pairs, now);
            let mut logger = self.logger.lock();
            logger.log_cashout_decision(player, &verdict, now);
            if !matches!(verdict, CashoutVerdict::Allow) {
                logger.log_risk_event(&Self::event_type(&verdict), player, &verdict);
            }
            verdict
        };
        if !matches!(verdict, CashoutVerdict::Allow) {
            self.persist_risk_event(player, &verdict);
        }
        verdict
    }

    fn event_type(verdict: &CashoutVerdict) -> String {
        format!("cashout_{}", verdict.action().as_str())
    }

    fn persist_risk_event(&self, player: &PlayerId, verdict: &CashoutVerdict) {
        let Some(sink) = &self.sink else {
            return;
        };
        sink.risk_event(RiskEventRow {
            event_type: Self::event_type(verdict),
            player_id: player.clone(),
            wallet_address: self.directory.wallet_address(player),
            pair_risk_score: nonzero(verdict.max_pair_score()),
            player_risk_score: nonzero(verdict.player_score()),
            reason_codes: verdict.reasons().to_vec(),
            metadata: RiskEventMetadata {
                action: verdict.action(),
                delay_ms: verdict.delay_ms(),
            },
        });
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Call on the client handshake. Returns the stored hash, or `None` when
    /// the token was rejected.
    pub fn register_device_token(&self, player: &PlayerId, raw: &str) -> Option<String> {
        let now = self.now();
        let wallet = self.directory.wallet_address(player);
        let registered = {
            let mut players = self.players.lock();
            let mut devices = self.devices.lock();
            devices.register(&mut players, player, raw, wallet.as_deref(), now)
        };
        let hash = match registered {
            Ok(hash) => hash,
            Err(e) => {
                debug!(player = %player, error = %e, "risk: device token rejected");
                return None;
            }
        };
        if let (Some(sink), Some(wallet)) = (&self.sink, wallet) {
            sink.device_token(DeviceTokenRow {
                token_hash: hash.clone(),
                wallet_address: wallet,
                last_seen_at: ms_to_datetime(now),
            });
        }
        Some(hash)
    }

    /// Pair and anomaly records are kept: the other party may still cash out.
    pub fn on_player_disconnect(&self, player: &PlayerId) {
        self.pairs.lock().on_player_disconnect(player);
        self.players.lock().on_player_disconnect(player);
    }

    pub fn remove_player(&self, player: &PlayerId) -> bool {
        self.players.lock().remove_player(player)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn dashboard(&self) -> DashboardSnapshot {
        let now = self.now();
        let active = self
            .directory
            .live_players()
            .iter()
            .filter(|p| PlayerSnapshot::is_scannable(p))
            .count();
        let pairs = self.pairs.lock();
        let players = self.players.lock();
        self.logger.lock().dashboard(now, self.engine.name, active, &pairs, &players)
    }

    pub fn max_pair_risk(&self, player: &PlayerId) -> MaxPairRisk {
        self.pairs.lock().max_pair_risk_for(player)
    }

    pub fn player_score(&self, player: &PlayerId) -> f64 {
        self.players.lock().score(player)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.lock().pair_count()
    }

    pub fn players_share_device(&self, a: &PlayerId, b: &PlayerId) -> bool {
        DeviceRegistry::players_share_device(&self.players.lock(), a, b)
    }

    pub fn shared_device_wallets(&self, hash: &str) -> Option<Vec<String>> {
        self.devices.lock().shared_device_wallets(hash)
    }

    /// Score a pair through the configured engine. Audit path only: the
    /// stored pair score used by the cashout gate is left untouched.
    pub async fn engine_score_pair(&self, a: &PlayerId, b: &PlayerId) -> Option<PairScore> {
        let now = self.now();
        let features = self.pairs.lock().extract_features(a, b, now)?;
        Some(self.engine.engine.score_pair(&features).await)
    }
}
