//! Fire-and-forget persistence.
//!
//! [`RestSink`] hands rows to a background task over an unbounded channel, so
//! a hook never awaits I/O. The task posts to Supabase's PostgREST API; a
//! failed write is logged and dropped. [`MemorySink`] keeps rows in memory
//! for simulations and tests.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use skillguard_core::error::SinkError;
use skillguard_core::traits::RiskSink;
use skillguard_core::types::{DeviceTokenRow, RiskEventRow, WalletPairEncounterRow};

use crate::config::SinkConfig;

pub const RISK_EVENTS_TABLE: &str = "risk_events";
pub const ENCOUNTERS_TABLE: &str = "wallet_pair_encounters";
pub const DEVICE_TOKENS_TABLE: &str = "device_tokens";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum SinkWrite {
    RiskEvent(RiskEventRow),
    Encounters(Vec<WalletPairEncounterRow>),
    DeviceToken(DeviceTokenRow),
}

// ---------------------------------------------------------------------------
// RestSink
// ---------------------------------------------------------------------------

pub struct RestSink {
    tx: mpsc::UnboundedSender<SinkWrite>,
}

impl RestSink {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(config: &SinkConfig) -> Result<(Self, JoinHandle<()>), SinkError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        let writer = RestWriter {
            client,
            base_url: config.rest_url(),
            key: config.service_role_key.clone(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer.run(rx));
        info!(url = %config.url, "sink: rest writer started");
        Ok((Self { tx }, handle))
    }

    fn send(&self, write: SinkWrite) {
        if let Err(e) = self.tx.send(write) {
            error!(error = %SinkError::ChannelClosed, dropped = ?e.0, "sink: write dropped");
        }
    }
}

impl RiskSink for RestSink {
    fn risk_event(&self, row: RiskEventRow) {
        self.send(SinkWrite::RiskEvent(row));
    }

    fn wallet_pair_encounters(&self, rows: Vec<WalletPairEncounterRow>) {
        if !rows.is_empty() {
            self.send(SinkWrite::Encounters(rows));
        }
    }

    fn device_token(&self, row: DeviceTokenRow) {
        self.send(SinkWrite::DeviceToken(row));
    }
}

struct RestWriter {
    client: Client,
    base_url: String,
    key: String,
}

impl RestWriter {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<SinkWrite>) {
        while let Some(write) = rx.recv().await {
            let (table, result) = match &write {
                SinkWrite::RiskEvent(row) => (RISK_EVENTS_TABLE, self.post(RISK_EVENTS_TABLE, row, false).await),
                SinkWrite::Encounters(rows) => (ENCOUNTERS_TABLE, self.post(ENCOUNTERS_TABLE, rows, false).await),
                SinkWrite::DeviceToken(row) => (DEVICE_TOKENS_TABLE, self.post(DEVICE_TOKENS_TABLE, row, true).await),
            };
            match result {
                Ok(()) => debug!(table, "sink: row written"),
                Err(e) => error!(table, error = %e, "sink: write failed, dropped"),
            }
        }
        debug!("sink: channel closed, writer exiting");
    }

    async fn post<T: Serialize + ?Sized>(&self, table: &str, body: &T, upsert: bool) -> Result<(), SinkError> {
        let url = if upsert {
            format!("{}/{table}?on_conflict=token_hash", self.base_url)
        } else {
            format!("{}/{table}", self.base_url)
        };
        let prefer = if upsert { "resolution=merge-duplicates" } else { "return=minimal" };
        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Rows kept in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    risk_events: Mutex<Vec<RiskEventRow>>,
    encounters: Mutex<Vec<WalletPairEncounterRow>>,
    device_tokens: Mutex<Vec<DeviceTokenRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn risk_events(&self) -> Vec<RiskEventRow> {
        self.risk_events.lock().clone()
    }

    pub fn encounters(&self) -> Vec<WalletPairEncounterRow> {
        self.encounters.lock().clone()
    }

    pub fn device_tokens(&self) -> Vec<DeviceTokenRow> {
        self.device_tokens.lock().clone()
    }
}

impl RiskSink for MemorySink {
    fn risk_event(&self, row: RiskEventRow) {
        self.risk_events.lock().push(row);
    }

    fn wallet_pair_encounters(&self, rows: Vec<WalletPairEncounterRow>) {
        self.encounters.lock().extend(rows);
    }

    /// Upsert on `token_hash`, like the REST table.
    fn device_token(&self, row: DeviceTokenRow) {
        let mut rows = self.device_tokens.lock();
        match rows.iter_mut().find(|r| r.token_hash == row.token_hash) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }
}
