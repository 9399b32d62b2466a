//! Risk tunables. All durations in milliseconds, distances in world pixels.
//!
//! These are the defaults behind [`RiskConfig`](crate::config::RiskConfig).
//! Tune them from observed gameplay data, not per deployment.

// ---------------------------------------------------------------------------
// Proximity scanner
// ---------------------------------------------------------------------------

/// Minimum spacing between two proximity scans.
pub const SCAN_INTERVAL_MS: u64 = 2_000;

/// Distance below which two players count as "near" (~12x player size).
pub const PROXIMITY_THRESHOLD: f64 = 300.0;

/// Pairs with no activity for this long are pruned.
pub const PAIR_STALE_TIMEOUT_MS: u64 = 300_000;

// ---------------------------------------------------------------------------
// Rolling window
// ---------------------------------------------------------------------------

/// Tumbling window length for pair accumulators.
pub const WINDOW_DURATION_MS: u64 = 120_000;

/// Multiplier applied to every accumulator per elapsed window.
pub const DECAY_FACTOR: f64 = 0.5;

/// Trailing window of the wallet-level encounter ledger (24 h).
pub const ENCOUNTER_WINDOW_MS: u64 = 86_400_000;

// ---------------------------------------------------------------------------
// Pair feature weights (sum to 1.0)
// ---------------------------------------------------------------------------

pub const PAIR_WEIGHT_PROXIMITY: f64 = 0.20;
pub const PAIR_WEIGHT_NON_AGGRESSION: f64 = 0.25;
pub const PAIR_WEIGHT_FARM_LOOP: f64 = 0.25;
pub const PAIR_WEIGHT_REPEATED_ENCOUNTER: f64 = 0.15;
pub const PAIR_WEIGHT_DAMAGE_SYMMETRY: f64 = 0.15;

// ---------------------------------------------------------------------------
// Player anomaly weights (sum to 1.0)
// ---------------------------------------------------------------------------

pub const PLAYER_WEIGHT_FIRE_RATE: f64 = 0.35;
pub const PLAYER_WEIGHT_HIT_RATIO: f64 = 0.35;
pub const PLAYER_WEIGHT_AIM_STABILITY: f64 = 0.30;

// ---------------------------------------------------------------------------
// Pair reason-code thresholds
// ---------------------------------------------------------------------------

/// Non-aggression ratio above which `NON_AGGRESSION` is raised.
pub const NON_AGGRESSION_THRESHOLD: f64 = 0.7;

/// Farm-loop feature above which `FARM_LOOP` is raised.
pub const FARM_LOOP_THRESHOLD: f64 = 0.5;

/// Mutual damage ratio above which `DAMAGE_SYMMETRY` is raised.
pub const DAMAGE_SYMMETRY_THRESHOLD: f64 = 0.8;

/// Raw 24 h encounter count above which `REPEATED_PAIR` is raised.
pub const REPEATED_ENCOUNTER_THRESHOLD: u32 = 10;

/// Time-in-proximity fraction that, with repeated encounters, raises `STALKING`.
pub const STALKING_PROXIMITY_THRESHOLD: f64 = 0.3;

/// Directional damage below this is noise and yields zero symmetry.
pub const DAMAGE_NOISE_FLOOR: f64 = 10.0;

/// Directional damage required before `DAMAGE_SYMMETRY` may be raised.
pub const DAMAGE_SYMMETRY_MIN_DAMAGE: f64 = 50.0;

/// Kill count at which the farm-loop feature stops being scaled down.
pub const FARM_LOOP_KILL_SATURATION: f64 = 3.0;

/// Orb pickups within this long after a kill count toward farm-loop.
pub const ORB_KILL_WINDOW_MS: u64 = 10_000;

/// Damage recorded on the pair for every landed hit.
pub const BULLET_DAMAGE: f64 = 10.0;

// ---------------------------------------------------------------------------
// Cashout gate
// ---------------------------------------------------------------------------

/// Combined score below this is allowed immediately.
pub const CASHOUT_ALLOW: f64 = 0.4;

/// Combined score at or above this is held for review.
pub const CASHOUT_SOFT_HOLD: f64 = 0.7;

pub const CASHOUT_DELAY_MIN_MS: u64 = 5_000;
pub const CASHOUT_DELAY_MAX_MS: u64 = 15_000;

// ---------------------------------------------------------------------------
// Orb payout damping
// ---------------------------------------------------------------------------

/// Farm-loop score where orb value starts shrinking.
pub const FARM_DIMINISH_START: f64 = 0.5;

/// Lowest orb value multiplier.
pub const FARM_DIMINISH_FLOOR: f64 = 0.3;

// ---------------------------------------------------------------------------
// Player anomaly thresholds
// ---------------------------------------------------------------------------

/// Median inter-shot interval below this is suspicious (game cooldown is 120 ms).
pub const FIRE_RATE_SUSPECT_MS: f64 = 125.0;

/// Interval at which the fire-rate anomaly saturates.
pub const FIRE_RATE_FLOOR_MS: f64 = 100.0;

/// Buffered shots needed before fire rate is judged.
pub const FIRE_RATE_MIN_SHOTS: usize = 10;

/// Hit ratio above this is suspicious at long range.
pub const HIT_RATIO_SUSPECT: f64 = 0.6;

/// Average hit distance below which accuracy is never flagged.
pub const HIT_RATIO_DIST_FLOOR: f64 = 200.0;

/// Average hit distance at which the distance factor saturates.
pub const HIT_RATIO_DIST_SATURATION: f64 = 600.0;

/// Lifetime shots needed before hit ratio is judged.
pub const HIT_RATIO_MIN_SHOTS: u64 = 20;

/// Aim-angle standard deviation (radians) below this is aimbot-like.
pub const AIM_VARIANCE_SUSPECT: f64 = 0.02;

/// Buffered angles needed before aim stability is judged.
pub const AIM_MIN_SAMPLES: usize = 5;

/// Per-axis subscore above which the axis flag is raised.
pub const PLAYER_FLAG_CUTOFF: f64 = 0.3;

// ---------------------------------------------------------------------------
// Ring buffers
// ---------------------------------------------------------------------------

pub const SHOT_BUFFER_SIZE: usize = 30;
pub const HIT_DIST_BUFFER: usize = 50;
pub const ANGLE_BUFFER_SIZE: usize = 20;

// ---------------------------------------------------------------------------
// Device token
// ---------------------------------------------------------------------------

/// HMAC salt lifetime (24 h).
pub const SALT_ROTATION_MS: u64 = 86_400_000;

/// Raw device tokens shorter than this are rejected.
pub const DEVICE_TOKEN_MIN_LEN: usize = 16;

// ---------------------------------------------------------------------------
// MPC fixed point
// ---------------------------------------------------------------------------

/// Features in `[0, 1]` are scaled to `0..=MPC_SCALE` before encryption.
pub const MPC_SCALE: u16 = 10_000;
