//! # skillguard-mpc
//! Pair scoring over encrypted features on an external MPC network.
//!
//! [`ArciumRiskEngine`] implements the core `RiskEngine` trait. Pair scores go
//! through [`MpcClient`]; player scores and cashout verdicts stay local. Every
//! MPC failure, including a finalization timeout, resolves to the
//! `LocalRiskEngine` result for that call.

pub mod cipher;
pub mod client;
pub mod config;
pub mod engine;
pub mod gateway;

pub use client::{MpcClient, MpcScore};
pub use config::MpcConfig;
pub use engine::{ARCIUM_ENGINE_NAME, ArciumRiskEngine, LOCAL_ENGINE_NAME, SelectedEngine, create_engine};
pub use gateway::{LoopbackGateway, MpcGateway, RpcGateway};
