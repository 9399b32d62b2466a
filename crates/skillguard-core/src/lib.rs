//! # skillguard-core
//! Foundation types, tunables, traits and scoring formulas for Skillguard,
//! the anti-collusion and anomaly-detection core of a real-money skill game.

pub mod config;
pub mod constants;
pub mod error;
pub mod ring;
pub mod scoring;
pub mod traits;
pub mod types;

pub use config::RiskConfig;
pub use error::SkillguardError;
pub use scoring::LocalRiskEngine;
pub use traits::{PlayerDirectory, RiskEngine, RiskSink};
pub use types::{CashoutAction, CashoutVerdict, PlayerId, ReasonCode};
