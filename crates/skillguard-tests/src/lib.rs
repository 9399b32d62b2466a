//! Cross-crate test suite for Skillguard.
//!
//! Property tests pin the scoring invariants under arbitrary inputs; the
//! scenario tests drive [`skillguard_service::RiskService`] end to end on a
//! manual clock with an in-memory sink.

pub mod helpers;
