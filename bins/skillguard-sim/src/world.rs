//! A toy arena that drives every service hook.
//!
//! Honest players random-walk and trade shots. Two colluders shadow each
//! other, never fire, and trade kills to farm each other's orbs from one
//! shared device. One aimbot fires at the cooldown limit with a locked angle.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use skillguard_core::traits::PlayerDirectory;
use skillguard_core::types::{PlayerId, PlayerSnapshot, Position};
use skillguard_service::{ManualClock, RiskService};

pub const ARENA_SIZE: f64 = 4_000.0;
pub const STEP_MS: u64 = 100;

const WALK_SPEED: f64 = 200.0;
const HONEST_FIRE_CHANCE: f64 = 0.04;
const HONEST_HIT_CHANCE: f64 = 0.3;
const HONEST_KILL_CHANCE: f64 = 0.1;
const COLLUDER_OFFSET: f64 = 60.0;
const COLLUDER_KILL_EVERY_MS: u64 = 8_000;
const AIMBOT_HIT_CHANCE: f64 = 0.9;
const AIMBOT_RANGE: f64 = 650.0;
const SHARED_DEVICE: &str = "sim-shared-device-0001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Honest,
    Colluder,
    Aimbot,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: PlayerId,
    pub role: Role,
    pub wallet: String,
    pos: Position,
    heading: f64,
    shooting: bool,
}

/// Live player map shared with the service.
#[derive(Default)]
pub struct SimDirectory {
    players: RwLock<Vec<PlayerSnapshot>>,
    wallets: RwLock<HashMap<PlayerId, String>>,
}

impl PlayerDirectory for SimDirectory {
    fn live_players(&self) -> Vec<PlayerSnapshot> {
        self.players.read().clone()
    }

    fn wallet_address(&self, player: &PlayerId) -> Option<String> {
        self.wallets.read().get(player).cloned()
    }
}

pub struct World {
    rng: StdRng,
    agents: Vec<Agent>,
    directory: Arc<SimDirectory>,
    elapsed_ms: u64,
}

impl World {
    /// `honest` random walkers plus two colluders and an aimbot.
    pub fn new(seed: u64, honest: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut agents = Vec::with_capacity(honest + 3);
        for i in 0..honest {
            agents.push(Self::spawn(&mut rng, format!("p-{i:02}"), Role::Honest));
        }
        agents.push(Self::spawn(&mut rng, "colluder-a".into(), Role::Colluder));
        agents.push(Self::spawn(&mut rng, "colluder-b".into(), Role::Colluder));
        agents.push(Self::spawn(&mut rng, "aimbot".into(), Role::Aimbot));

        let directory = Arc::new(SimDirectory::default());
        directory
            .wallets
            .write()
            .extend(agents.iter().map(|a| (a.id.clone(), a.wallet.clone())));

        let world = Self {
            rng,
            agents,
            directory,
            elapsed_ms: 0,
        };
        world.publish();
        world
    }

    fn spawn(rng: &mut StdRng, id: String, role: Role) -> Agent {
        Agent {
            wallet: format!("Wallet{:016x}{:016x}", rng.r#gen::<u64>(), rng.r#gen::<u64>()),
            id: PlayerId::new(id),
            role,
            pos: Position::new(rng.gen_range(0.0..ARENA_SIZE), rng.gen_range(0.0..ARENA_SIZE)),
            heading: rng.gen_range(0.0..TAU),
            shooting: false,
        }
    }

    pub fn directory(&self) -> Arc<SimDirectory> {
        self.directory.clone()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn find(&self, role: Role) -> Vec<&Agent> {
        self.agents.iter().filter(|a| a.role == role).collect()
    }

    fn publish(&self) {
        *self.directory.players.write() = self
            .agents
            .iter()
            .map(|a| PlayerSnapshot {
                id: a.id.clone(),
                position: a.pos,
                alive: true,
                joined: true,
                is_bot: false,
                shooting: a.shooting,
            })
            .collect();
    }

    /// Handshake every agent. The colluders share one device.
    pub fn connect_all(&mut self, service: &RiskService) {
        for agent in &self.agents {
            let token = match agent.role {
                Role::Colluder => SHARED_DEVICE.to_string(),
                _ => format!("sim-device-{}-{:08x}", agent.id, self.rng.r#gen::<u32>()),
            };
            service.register_device_token(&agent.id, &token);
        }
    }

    /// Advance the match to `until_ms` of elapsed time.
    pub fn run(&mut self, service: &RiskService, clock: &ManualClock, until_ms: u64) {
        while self.elapsed_ms < until_ms {
            self.elapsed_ms += STEP_MS;
            let now = clock.advance(STEP_MS);
            self.step(service);
            service.tick_proximity_scanner(now);
        }
    }

    fn step(&mut self, service: &RiskService) {
        let honest: Vec<usize> = (0..self.agents.len())
            .filter(|&i| self.agents[i].role == Role::Honest)
            .collect();

        for i in 0..self.agents.len() {
            self.agents[i].shooting = false;
            match self.agents[i].role {
                Role::Honest => self.step_honest(service, i, &honest),
                Role::Aimbot => self.step_aimbot(service, i, &honest),
                Role::Colluder => {}
            }
        }
        self.step_colluders(service);
        self.publish();
    }

    fn walk(&mut self, i: usize) {
        let rng = &mut self.rng;
        let agent = &mut self.agents[i];
        agent.heading += rng.gen_range(-0.3..0.3);
        let d = WALK_SPEED * STEP_MS as f64 / 1_000.0;
        agent.pos.x = (agent.pos.x + agent.heading.cos() * d).rem_euclid(ARENA_SIZE);
        agent.pos.y = (agent.pos.y + agent.heading.sin() * d).rem_euclid(ARENA_SIZE);
    }

    fn step_honest(&mut self, service: &RiskService, i: usize, honest: &[usize]) {
        self.walk(i);
        if !self.rng.gen_bool(HONEST_FIRE_CHANCE) {
            return;
        }
        self.agents[i].shooting = true;
        let angle = self.rng.gen_range(0.0..TAU);
        service.record_shot(&self.agents[i].id, angle);

        if honest.len() < 2 || !self.rng.gen_bool(HONEST_HIT_CHANCE) {
            return;
        }
        let j = honest[self.rng.gen_range(0..honest.len())];
        if j == i {
            return;
        }
        let distance = self.rng.gen_range(80.0..700.0);
        let (shooter, victim) = (self.agents[i].id.clone(), self.agents[j].id.clone());
        service.record_hit(&shooter, &victim, distance);
        if self.rng.gen_bool(HONEST_KILL_CHANCE) {
            let at = self.agents[j].pos;
            service.record_kill(&shooter, &victim, at.x, at.y);
            let multiplier = service.orb_pickup_multiplier(&shooter, Some(&victim));
            service.record_orb_pickup(&shooter, Some(&victim));
            debug!(killer = %shooter, victim = %victim, multiplier, "sim: honest kill");
        }
    }

    fn step_aimbot(&mut self, service: &RiskService, i: usize, honest: &[usize]) {
        self.walk(i);
        self.agents[i].shooting = true;
        let angle = 0.75 + self.rng.gen_range(-0.002..0.002);
        let shooter = self.agents[i].id.clone();
        service.record_shot(&shooter, angle);
        if honest.is_empty() || !self.rng.gen_bool(AIMBOT_HIT_CHANCE) {
            return;
        }
        let j = honest[self.rng.gen_range(0..honest.len())];
        let victim = self.agents[j].id.clone();
        service.record_hit(&shooter, &victim, AIMBOT_RANGE + self.rng.gen_range(-20.0..20.0));
    }

    /// Leader walks, follower shadows it; they trade kills on a timer.
    fn step_colluders(&mut self, service: &RiskService) {
        let pair: Vec<usize> = (0..self.agents.len())
            .filter(|&i| self.agents[i].role == Role::Colluder)
            .collect();
        let [lead, follow] = pair[..] else {
            return;
        };
        self.walk(lead);
        let anchor = self.agents[lead].pos;
        self.agents[follow].pos = Position::new(anchor.x + COLLUDER_OFFSET, anchor.y);

        if self.elapsed_ms % COLLUDER_KILL_EVERY_MS != 0 {
            return;
        }
        let (killer, victim) = if (self.elapsed_ms / COLLUDER_KILL_EVERY_MS) % 2 == 0 {
            (lead, follow)
        } else {
            (follow, lead)
        };
        let (k, v) = (self.agents[killer].id.clone(), self.agents[victim].id.clone());
        let at = self.agents[victim].pos;
        service.record_kill(&k, &v, at.x, at.y);
        let multiplier = service.orb_pickup_multiplier(&k, Some(&v));
        service.record_orb_pickup(&k, Some(&v));
        debug!(killer = %k, victim = %v, multiplier, "sim: traded kill");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillguard_core::CashoutAction;
    use skillguard_mpc::SelectedEngine;
    use skillguard_service::{CashoutGate, ServiceConfig};

    fn run(seconds: u64) -> (World, RiskService) {
        let config = ServiceConfig::default();
        let mut world = World::new(11, 8);
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let service = RiskService::new(
            config.clone(),
            world.directory(),
            SelectedEngine::local(config.risk.clone()),
            None,
            clock.clone(),
        )
        .unwrap()
        .with_gate(CashoutGate::seeded(config.risk.payout, 11));
        world.connect_all(&service);
        world.run(&service, &clock, seconds * 1_000);
        (world, service)
    }

    #[test]
    fn colluders_and_aimbot_are_held() {
        let (world, service) = run(180);
        for agent in world.find(Role::Colluder) {
            assert_eq!(service.cashout_gate(&agent.id).action(), CashoutAction::SoftHold, "{}", agent.id);
        }
        let bot = &world.find(Role::Aimbot)[0].id;
        assert_eq!(service.cashout_gate(bot).action(), CashoutAction::SoftHold);

        let colluders = world.find(Role::Colluder);
        assert!(service.players_share_device(&colluders[0].id, &colluders[1].id));
    }

    #[test]
    fn farmed_orbs_are_damped() {
        let (world, service) = run(60);
        let c = world.find(Role::Colluder);
        let m = service.orb_pickup_multiplier(&c[0].id, Some(&c[1].id));
        assert!(m < 1.0, "multiplier {m}");
    }
}
