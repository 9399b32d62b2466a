//! # skillguard-tracker
//! In-memory risk state: per-pair rolling accumulators, per-player anomaly
//! buffers, the proximity scanner that feeds them, and the device-token registry.

pub mod anomaly;
pub mod device_token;
pub mod pair_tracker;
pub mod proximity;

pub use anomaly::PlayerAnomalyTracker;
pub use device_token::DeviceRegistry;
pub use pair_tracker::{PairKey, PairTracker};
pub use proximity::ProximityScanner;
