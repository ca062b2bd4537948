//! Per-rule circuit breaker.
//!
//! State machine: `closed —(count ≥ threshold)→ open —(TTL)→ closed`.
//! There is no half-open state; counter TTLs expire blocks out of the
//! window, so recovery is automatic `cooldown` after the last block. An
//! open breaker never inhibits evaluation — it only downgrades would-be
//! blocks to warnings downstream.

use oracle_adapters::BlockCounter;
use oracle_common::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEGRADED_REASON: &str = "circuit_breaker_triggered";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

pub struct CircuitBreaker {
    counter: Arc<dyn BlockCounter>,
    threshold: u32,
    window_sec: u64,
    cooldown_sec: u64,
}

impl CircuitBreaker {
    pub fn new(counter: Arc<dyn BlockCounter>, threshold: u32, window_sec: u64, cooldown_sec: u64) -> Self {
        Self {
            counter,
            threshold,
            window_sec,
            cooldown_sec,
        }
    }

    /// Per-rule state, derived from the live count.
    pub async fn state(&self, rule_id: &str) -> Result<BreakerState> {
        let count = self.counter.get(rule_id, self.window_sec).await?;
        if count >= u64::from(self.threshold) {
            warn!(rule_id, count, threshold = self.threshold, "circuit breaker open");
            Ok(BreakerState::Open)
        } else {
            Ok(BreakerState::Closed)
        }
    }

    pub async fn is_open(&self, rule_id: &str) -> Result<bool> {
        Ok(self.state(rule_id).await? == BreakerState::Open)
    }

    /// Record one emitted block. The bucket TTL equals the cooldown, so an
    /// open breaker stays open for `cooldown` past the last block and then
    /// recovers without manual reset.
    pub async fn record_block(&self, rule_id: &str) -> Result<()> {
        self.counter.increment(rule_id, self.cooldown_sec).await?;
        let count = self.counter.get(rule_id, self.window_sec).await?;
        if count == u64::from(self.threshold) {
            info!(rule_id, count, "block threshold reached, breaker opens");
        }
        Ok(())
    }
}
