//! Serialized engine facade.
//!
//! A full validation batch and a full monitor sweep both read and write
//! margin-in-use, the open-position set, and the budget, so they must
//! never interleave. One `tokio::sync::Mutex` around the ledger makes
//! each public operation an atomic unit; concurrent callers queue.

use crate::ledger::PortfolioLedger;
use crate::monitor::LifecycleMonitor;
use crate::pipeline::ValidationPipeline;
use perp_pilot_core::{
    Clock, CloseEvent, EngineError, MarketView, PortfolioSnapshot, Proposal, SystemClock,
    TradingConfig, ValidatedOutcome,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

struct EngineState {
    ledger: PortfolioLedger,
    pipeline: ValidationPipeline,
}

pub struct TradingEngine {
    state: Mutex<EngineState>,
    clock: Arc<dyn Clock>,
}

impl TradingEngine {
    #[must_use]
    pub fn new(config: &TradingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: &TradingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(EngineState {
                ledger: PortfolioLedger::new(config.initial_budget),
                pipeline: ValidationPipeline::new(config),
            }),
            clock,
        }
    }

    /// Validates one batch of proposals and applies approved outcomes, as
    /// a single atomic unit.
    ///
    /// # Errors
    ///
    /// Only fatal ledger corruption; per-proposal faults surface as
    /// rejected outcomes.
    pub async fn decide_batch(
        &self,
        proposals: &[Proposal],
        market: &HashMap<String, MarketView>,
    ) -> Result<Vec<ValidatedOutcome>, EngineError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let EngineState { ledger, pipeline } = &mut *state;
        pipeline.run_batch(ledger, proposals, market, now)
    }

    /// Runs one stop/target sweep over all open positions, as a single
    /// atomic unit.
    ///
    /// # Errors
    ///
    /// Only fatal ledger corruption.
    pub async fn sweep(
        &self,
        market: &HashMap<String, MarketView>,
    ) -> Result<Vec<CloseEvent>, EngineError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        LifecycleMonitor::sweep(&mut state.ledger, market, now)
    }

    /// Point-in-time portfolio report. Unrealized PnL is filled in for
    /// instruments present in `market`.
    pub async fn snapshot(&self, market: Option<&HashMap<String, MarketView>>) -> PortfolioSnapshot {
        let now = self.clock.now();
        let prices: Option<HashMap<String, Decimal>> = market.map(|m| {
            m.iter()
                .map(|(instrument, view)| (instrument.clone(), view.price))
                .collect()
        });
        let state = self.state.lock().await;
        state.ledger.snapshot(prices.as_ref(), now)
    }
}
