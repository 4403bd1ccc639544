//! Position lifecycle monitor.
//!
//! Each sweep checks every open position against the latest reference
//! price and force-closes those whose stop-loss or take-profit level has
//! been crossed. When a price gaps through both levels at once the stop
//! wins. Sweeps are idempotent: a position already closed is simply no
//! longer there to check.

use crate::ledger::PortfolioLedger;
use chrono::{DateTime, Utc};
use perp_pilot_core::{CloseEvent, CloseReason, EngineError, MarketView};
use std::collections::HashMap;

pub struct LifecycleMonitor;

impl LifecycleMonitor {
    /// Closes every open position whose stop or target the latest price
    /// has crossed, and returns one close event per forced close.
    /// Instruments without a price this sweep are left untouched.
    ///
    /// # Errors
    ///
    /// Only fatal ledger corruption propagates.
    pub fn sweep(
        ledger: &mut PortfolioLedger,
        market: &HashMap<String, MarketView>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CloseEvent>, EngineError> {
        let mut triggered: Vec<(String, rust_decimal::Decimal, CloseReason)> = Vec::new();
        for position in ledger.open_positions() {
            let Some(view) = market.get(&position.instrument) else {
                continue;
            };
            // Stop takes precedence when the price gapped through both.
            let reason = if position.stop_hit(view.price) {
                CloseReason::Stop
            } else if position.target_hit(view.price) {
                CloseReason::Target
            } else {
                continue;
            };
            triggered.push((position.instrument.clone(), view.price, reason));
        }

        let mut events = Vec::with_capacity(triggered.len());
        for (instrument, price, reason) in triggered {
            let outcome = ledger.record_close(&instrument, price, reason, now)?;
            tracing::info!(
                instrument = %outcome.instrument,
                ?reason,
                exit = %outcome.exit_price,
                pnl = %outcome.pnl,
                "forced close",
            );
            events.push(CloseEvent::from(&outcome));
        }
        Ok(events)
    }
}
