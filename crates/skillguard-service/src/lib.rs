//! # skillguard-service
//! The orchestrator a game server embeds: event hooks, the cashout gate,
//! periodic risk telemetry, the dashboard payload and fire-and-forget
//! persistence.

pub mod clock;
pub mod config;
pub mod gate;
pub mod logger;
pub mod service;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ServiceConfig, SinkConfig};
pub use gate::CashoutGate;
pub use logger::{DashboardSnapshot, RiskLogger};
pub use service::RiskService;
pub use sink::{MemorySink, RestSink};
