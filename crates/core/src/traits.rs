use crate::decision::ValidatedOutcome;
use crate::events::{CloseEvent, MarketView, PortfolioSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Supplies the per-instrument reference price and volatility measure the
/// engine consumes. Backed by indicator computation, which is external to
/// this core.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn market_views(&self, instruments: &[String]) -> Result<HashMap<String, MarketView>>;
}

/// Produces one batch of raw trade decisions per cycle (e.g. an LLM call).
/// The returned string is the untrusted raw response; the core parses it
/// fail-closed.
#[async_trait]
pub trait ProposalSource: Send + Sync {
    async fn next_batch(&mut self, snapshot: &PortfolioSnapshot) -> Result<String>;
}

/// Receives approved outcomes and close events. The transport must never
/// send leverage or quantity greater than the final validated values.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn submit(&mut self, outcome: &ValidatedOutcome) -> Result<()>;
    async fn close(&mut self, event: &CloseEvent) -> Result<()>;
}

/// Time source for trade-outcome timestamps and hold-duration reporting.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
