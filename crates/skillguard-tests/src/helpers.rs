//! Shared fixtures for the integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use skillguard_core::traits::PlayerDirectory;
use skillguard_core::types::{PairFeatures, PlayerId, PlayerSnapshot, Position};
use skillguard_mpc::SelectedEngine;
use skillguard_service::{CashoutGate, ManualClock, MemorySink, RiskService, ServiceConfig};

/// Epoch the manual clock starts at.
pub const T0: u64 = 1_700_000_000_000;

pub fn pid(s: &str) -> PlayerId {
    PlayerId::from(s)
}

/// An alive, joined, human player standing still.
pub fn snapshot(id: &str, x: f64, y: f64) -> PlayerSnapshot {
    PlayerSnapshot {
        id: pid(id),
        position: Position::new(x, y),
        alive: true,
        joined: true,
        is_bot: false,
        shooting: false,
    }
}

/// The five scored features, context fields zeroed.
pub fn features(prox: f64, non_aggr: f64, farm: f64, enc: f64, dmg: f64) -> PairFeatures {
    PairFeatures {
        time_in_proximity: prox,
        non_aggression: non_aggr,
        farm_loop: farm,
        repeated_encounters_normalized: enc,
        damage_symmetry: dmg,
        ..PairFeatures::default()
    }
}

/// Mutable player map standing in for the game server.
#[derive(Default)]
pub struct TestLobby {
    players: Mutex<Vec<PlayerSnapshot>>,
    wallets: Mutex<HashMap<PlayerId, String>>,
}

impl TestLobby {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, snap: PlayerSnapshot) {
        let mut players = self.players.lock();
        players.retain(|p| p.id != snap.id);
        players.push(snap);
    }

    pub fn place(&self, id: &str, x: f64, y: f64) {
        self.put(snapshot(id, x, y));
    }

    pub fn remove(&self, id: &str) {
        self.players.lock().retain(|p| p.id.as_str() != id);
    }

    pub fn bind(&self, id: &str, wallet: &str) {
        self.wallets.lock().insert(pid(id), wallet.to_string());
    }
}

impl PlayerDirectory for TestLobby {
    fn live_players(&self) -> Vec<PlayerSnapshot> {
        self.players.lock().clone()
    }

    fn wallet_address(&self, player: &PlayerId) -> Option<String> {
        self.wallets.lock().get(player).cloned()
    }
}

/// A service on a manual clock with an in-memory sink and seeded gate.
pub struct Harness {
    pub lobby: Arc<TestLobby>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemorySink>,
    pub service: RiskService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let engine = SelectedEngine::local(config.risk.clone());
        Self::with_engine(config, engine)
    }

    pub fn with_engine(config: ServiceConfig, engine: SelectedEngine) -> Self {
        let lobby = TestLobby::new();
        let clock = Arc::new(ManualClock::new(T0));
        let sink = Arc::new(MemorySink::new());
        let payout = config.risk.payout;
        let service = RiskService::new(config, lobby.clone(), engine, Some(sink.clone()), clock.clone())
            .expect("valid config")
            .with_gate(CashoutGate::seeded(payout, 42));
        Self {
            lobby,
            clock,
            sink,
            service,
        }
    }

    /// Advance the clock by one scan interval and scan.
    pub fn scan(&self) -> u64 {
        let now = self.clock.advance(self.service.config().risk.scan_interval_ms);
        self.service.tick_proximity_scanner(now);
        now
    }

    pub fn scans(&self, n: usize) -> u64 {
        let mut now = 0;
        for _ in 0..n {
            now = self.scan();
        }
        now
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
