use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an open exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short. Multiplied into PnL arithmetic.
    #[must_use]
    pub const fn sign(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloseReason {
    /// Stop-loss level crossed.
    Stop,
    /// Take-profit level crossed.
    Target,
    /// Closed on an approved close proposal.
    Manual,
}

/// An open exposure on one instrument.
///
/// At most one `Position` exists per instrument at any time. Created only by
/// an approved open outcome; destroyed only by the lifecycle monitor or an
/// approved close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub direction: Direction,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: u8,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub margin: Decimal,
    pub confidence: f64,
    pub rationale: String,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// PnL if the position were closed at `price` right now.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity * self.direction.sign()
    }

    /// True when `price` has crossed the stop-loss level.
    #[must_use]
    pub fn stop_hit(&self, price: Decimal) -> bool {
        if self.stop_loss <= Decimal::ZERO {
            return false;
        }
        match self.direction {
            Direction::Long => price <= self.stop_loss,
            Direction::Short => price >= self.stop_loss,
        }
    }

    /// True when `price` has crossed the take-profit level.
    #[must_use]
    pub fn target_hit(&self, price: Decimal) -> bool {
        if self.take_profit <= Decimal::ZERO {
            return false;
        }
        match self.direction {
            Direction::Long => price >= self.take_profit,
            Direction::Short => price <= self.take_profit,
        }
    }
}

/// A completed trade with realized PnL. Append-only history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u8,
    pub margin: Decimal,
    pub pnl: Decimal,
    pub reason: CloseReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    #[must_use]
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}
