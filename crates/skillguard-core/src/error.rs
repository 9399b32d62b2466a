//! Error types for the Skillguard risk subsystem.
//!
//! None of these ever reach the game loop: hooks degrade to a documented
//! default and log instead.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{category} weights sum to {sum}, expected 1.0")] WeightSum { category: &'static str, sum: f64 },
    #[error("invalid config: {0}")] Invalid(String),
    #[error("config source: {0}")] Source(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceTokenError {
    #[error("device token too short: {len} < {min}")] TooShort { len: usize, min: usize },
    #[error("hmac key rejected: {0}")] Hmac(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MpcError {
    #[error("mpc backend not configured: {0}")] NotConfigured(String),
    #[error("transport: {0}")] Transport(String),
    #[error("rpc error: {0}")] Rpc(String),
    #[error("malformed response: {0}")] MalformedResponse(String),
    #[error("crypto: {0}")] Crypto(String),
    #[error("computation not finalized within {timeout_ms} ms")] Timeout { timeout_ms: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink channel closed")] ChannelClosed,
    #[error("http {status}: {body}")] Status { status: u16, body: String },
    #[error("transport: {0}")] Transport(String),
}

#[derive(Error, Debug)]
pub enum SkillguardError {
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] DeviceToken(#[from] DeviceTokenError),
    #[error(transparent)] Mpc(#[from] MpcError),
    #[error(transparent)] Sink(#[from] SinkError),
}
