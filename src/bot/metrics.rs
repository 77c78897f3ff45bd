use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TransactionState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotMetrics {
    pub uptime_seconds: u64,
    pub blocks_observed: u64,
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub trades_confirmed: u64,
    pub trades_rejected: u64,
    pub trades_failed: u64,
    pub trades_in_flight: u64,
    pub last_error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl BotMetrics {
    pub fn new() -> Self {
        Self {
            uptime_seconds: 0,
            blocks_observed: 0,
            cycles_run: 0,
            cycles_failed: 0,
            trades_confirmed: 0,
            trades_rejected: 0,
            trades_failed: 0,
            trades_in_flight: 0,
            last_error: None,
            last_updated: Utc::now(),
        }
    }

    pub fn record_block(&mut self) {
        self.blocks_observed += 1;
        self.last_updated = Utc::now();
    }

    pub fn record_cycle(&mut self) {
        self.cycles_run += 1;
        self.last_updated = Utc::now();
    }

    pub fn record_cycle_failure(&mut self, reason: &str) {
        self.cycles_failed += 1;
        self.last_error = Some(reason.to_string());
        self.last_updated = Utc::now();
    }

    pub fn record_trade(&mut self, state: TransactionState) {
        match state {
            TransactionState::Confirmed => self.trades_confirmed += 1,
            TransactionState::Rejected => self.trades_rejected += 1,
            TransactionState::Failed => self.trades_failed += 1,
            TransactionState::Sent => self.trades_in_flight += 1,
            TransactionState::New | TransactionState::Sending => {}
        }
        self.last_updated = Utc::now();
    }

    pub fn set_uptime(&mut self, seconds: u64) {
        self.uptime_seconds = seconds;
    }

    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Swap Bot Metrics Report ===\n");
        report.push_str(&format!("Uptime: {} seconds\n", self.uptime_seconds));
        report.push_str(&format!("Blocks Observed: {}\n", self.blocks_observed));
        report.push_str(&format!("Cycles Run: {}\n", self.cycles_run));
        report.push_str(&format!("Cycles Failed: {}\n", self.cycles_failed));
        report.push_str(&format!("Trades Confirmed: {}\n", self.trades_confirmed));
        report.push_str(&format!("Trades Rejected: {}\n", self.trades_rejected));
        report.push_str(&format!("Trades Failed: {}\n", self.trades_failed));
        report.push_str(&format!("Trades In Flight: {}\n", self.trades_in_flight));

        if let Some(ref error) = self.last_error {
            report.push_str(&format!("Last Error: {}\n", error));
        }

        report.push_str(&format!("Last Updated: {}\n", self.last_updated));

        report
    }

    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize metrics: {}", e))
    }
}

impl Default for BotMetrics {
    fn default() -> Self {
        Self::new()
    }
}
