use crate::position::{CloseReason, Direction, TradeOutcome};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest externally-supplied view of one instrument: reference price plus
/// a volatility measure (e.g. ATR) used to band stop-loss distances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketView {
    pub price: Decimal,
    pub volatility: Decimal,
}

/// Emitted when the lifecycle monitor or an approved close removes a
/// position. Consumed by the execution transport to close the matching
/// external position, and by audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseEvent {
    pub instrument: String,
    pub direction: Direction,
    pub quantity: Decimal,
    pub exit_price: Decimal,
    pub reason: CloseReason,
    pub pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

impl From<&TradeOutcome> for CloseEvent {
    fn from(outcome: &TradeOutcome) -> Self {
        Self {
            instrument: outcome.instrument.clone(),
            direction: outcome.direction,
            quantity: outcome.quantity,
            exit_price: outcome.exit_price,
            reason: outcome.reason,
            pnl: outcome.pnl,
            closed_at: outcome.closed_at,
        }
    }
}

/// One open position as reported in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionSummary {
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u8,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub margin: Decimal,
    pub unrealized_pnl: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
}

/// Point-in-time portfolio report for external consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub initial_budget: Decimal,
    pub current_budget: Decimal,
    pub available_budget: Decimal,
    pub peak_budget: Decimal,
    pub margin_in_use: Decimal,
    pub drawdown: Decimal,
    pub total_trades: usize,
    pub win_rate: f64,
    pub losing_streak: usize,
    pub open_positions: Vec<OpenPositionSummary>,
    pub recent_outcomes: Vec<TradeOutcome>,
    pub taken_at: DateTime<Utc>,
}
