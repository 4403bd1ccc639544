//! Portfolio ledger: the single owner of budget, margin-in-use, open
//! positions, and the append-only trade history.
//!
//! No other component mutates budget directly. Callers reach the ledger
//! through the serialization boundary in [`crate::engine::TradingEngine`].

use chrono::{DateTime, Utc};
use perp_pilot_core::{
    CloseReason, EngineError, OpenPositionSummary, PortfolioSnapshot, Position, TradeOutcome,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub struct PortfolioLedger {
    initial_budget: Decimal,
    current_budget: Decimal,
    peak_budget: Decimal,
    margin_in_use: Decimal,
    positions: HashMap<String, Position>,
    history: Vec<TradeOutcome>,
}

impl PortfolioLedger {
    #[must_use]
    pub fn new(initial_budget: Decimal) -> Self {
        Self {
            initial_budget,
            current_budget: initial_budget,
            peak_budget: initial_budget,
            margin_in_use: Decimal::ZERO,
            positions: HashMap::new(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub const fn initial_budget(&self) -> Decimal {
        self.initial_budget
    }

    #[must_use]
    pub const fn current_budget(&self) -> Decimal {
        self.current_budget
    }

    #[must_use]
    pub const fn peak_budget(&self) -> Decimal {
        self.peak_budget
    }

    #[must_use]
    pub const fn margin_in_use(&self) -> Decimal {
        self.margin_in_use
    }

    /// Current budget minus margin committed to open positions.
    #[must_use]
    pub fn available_budget(&self) -> Decimal {
        self.current_budget - self.margin_in_use
    }

    /// Fractional decline from the peak budget, in [0, 1]. Zero when the
    /// peak is zero.
    #[must_use]
    pub fn drawdown(&self) -> Decimal {
        if self.peak_budget <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let dd = (self.peak_budget - self.current_budget) / self.peak_budget;
        dd.clamp(Decimal::ZERO, Decimal::ONE)
    }

    #[must_use]
    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    #[must_use]
    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn history(&self) -> &[TradeOutcome] {
        &self.history
    }

    /// Inserts a new position and commits its margin.
    ///
    /// # Errors
    ///
    /// `PositionConflict` when a position is already open for the
    /// instrument; `LedgerCorrupted` when the position carries negative
    /// margin, since accepting it would under-state exposure.
    pub fn record_open(&mut self, position: Position) -> Result<(), EngineError> {
        if position.margin < Decimal::ZERO {
            return Err(EngineError::LedgerCorrupted(format!(
                "open for {} carries negative margin {}",
                position.instrument, position.margin
            )));
        }
        if self.positions.contains_key(&position.instrument) {
            return Err(EngineError::PositionConflict(position.instrument));
        }
        self.margin_in_use += position.margin;
        self.positions.insert(position.instrument.clone(), position);
        Ok(())
    }

    /// Closes the position for `instrument` at `exit_price`, realizing its
    /// PnL into the budget and appending a history record.
    ///
    /// # Errors
    ///
    /// `PositionNotFound` when no position is open for the instrument;
    /// `LedgerCorrupted` when releasing the margin would drive
    /// margin-in-use negative (fatal: the accounting no longer matches the
    /// open-position set).
    pub fn record_close(
        &mut self,
        instrument: &str,
        exit_price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<TradeOutcome, EngineError> {
        let position = self
            .positions
            .remove(instrument)
            .ok_or_else(|| EngineError::PositionNotFound(instrument.to_string()))?;

        self.margin_in_use -= position.margin;
        if self.margin_in_use < Decimal::ZERO {
            return Err(EngineError::LedgerCorrupted(format!(
                "margin-in-use {} went negative closing {instrument}",
                self.margin_in_use
            )));
        }

        let pnl = (exit_price - position.entry_price) * position.quantity * position.direction.sign();
        self.current_budget += pnl;
        self.peak_budget = self.peak_budget.max(self.current_budget);

        let outcome = TradeOutcome {
            instrument: position.instrument,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            leverage: position.leverage,
            margin: position.margin,
            pnl,
            reason,
            opened_at: position.opened_at,
            closed_at: now,
        };
        self.history.push(outcome.clone());
        Ok(outcome)
    }

    /// Win fraction over the most recent `n` outcomes (fewer when history
    /// is shorter). `None` when there is no history: neutral, not eligible.
    #[must_use]
    pub fn rolling_win_rate(&self, n: usize) -> Option<f64> {
        if self.history.is_empty() || n == 0 {
            return None;
        }
        let recent = &self.history[self.history.len().saturating_sub(n)..];
        let wins = recent.iter().filter(|t| t.is_win()).count();
        #[allow(clippy::cast_precision_loss)]
        Some(wins as f64 / recent.len() as f64)
    }

    /// Consecutive losses counted back from the most recent outcome.
    #[must_use]
    pub fn losing_streak(&self) -> usize {
        self.history
            .iter()
            .rev()
            .take_while(|t| !t.is_win())
            .count()
    }

    #[must_use]
    pub fn is_losing_streak(&self, n: usize) -> bool {
        n > 0 && self.losing_streak() >= n
    }

    /// Point-in-time snapshot for reporting. Unrealized PnL is included
    /// for instruments present in `prices`.
    #[must_use]
    pub fn snapshot(
        &self,
        prices: Option<&HashMap<String, Decimal>>,
        now: DateTime<Utc>,
    ) -> PortfolioSnapshot {
        let mut open_positions: Vec<OpenPositionSummary> = self
            .positions
            .values()
            .map(|p| OpenPositionSummary {
                instrument: p.instrument.clone(),
                direction: p.direction,
                entry_price: p.entry_price,
                quantity: p.quantity,
                leverage: p.leverage,
                stop_loss: p.stop_loss,
                take_profit: p.take_profit,
                margin: p.margin,
                unrealized_pnl: prices
                    .and_then(|m| m.get(&p.instrument))
                    .map(|price| p.unrealized_pnl(*price)),
                opened_at: p.opened_at,
            })
            .collect();
        open_positions.sort_by(|a, b| a.instrument.cmp(&b.instrument));

        let wins = self.history.iter().filter(|t| t.is_win()).count();
        #[allow(clippy::cast_precision_loss)]
        let win_rate = if self.history.is_empty() {
            0.0
        } else {
            wins as f64 / self.history.len() as f64
        };

        PortfolioSnapshot {
            initial_budget: self.initial_budget,
            current_budget: self.current_budget,
            available_budget: self.available_budget(),
            peak_budget: self.peak_budget,
            margin_in_use: self.margin_in_use,
            drawdown: self.drawdown(),
            total_trades: self.history.len(),
            win_rate,
            losing_streak: self.losing_streak(),
            open_positions,
            recent_outcomes: self.history.iter().rev().take(5).rev().cloned().collect(),
            taken_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perp_pilot_core::Direction;
    use rust_decimal_macros::dec;

    fn position(instrument: &str, direction: Direction, margin: Decimal) -> Position {
        Position {
            instrument: instrument.to_string(),
            direction,
            quantity: dec!(0.1),
            entry_price: dec!(3000),
            leverage: 5,
            stop_loss: dec!(2940),
            take_profit: dec!(3120),
            margin,
            confidence: 0.6,
            rationale: String::new(),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn margin_in_use_tracks_open_positions_exactly() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        ledger
            .record_open(position("A", Direction::Long, dec!(60)))
            .unwrap();
        ledger
            .record_open(position("B", Direction::Short, dec!(40)))
            .unwrap();
        assert_eq!(ledger.margin_in_use(), dec!(100));
        assert_eq!(ledger.available_budget(), dec!(900));

        ledger
            .record_close("A", dec!(3000), CloseReason::Manual, Utc::now())
            .unwrap();
        assert_eq!(ledger.margin_in_use(), dec!(40));
        ledger
            .record_close("B", dec!(3000), CloseReason::Manual, Utc::now())
            .unwrap();
        assert_eq!(ledger.margin_in_use(), Decimal::ZERO);
    }

    #[test]
    fn duplicate_open_is_a_conflict() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        ledger
            .record_open(position("A", Direction::Long, dec!(60)))
            .unwrap();
        let err = ledger
            .record_open(position("A", Direction::Short, dec!(60)))
            .unwrap_err();
        assert!(matches!(err, EngineError::PositionConflict(_)));
        // Failed open must not leak margin.
        assert_eq!(ledger.margin_in_use(), dec!(60));
    }

    #[test]
    fn close_without_position_is_not_found() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        let err = ledger
            .record_close("A", dec!(3000), CloseReason::Manual, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::PositionNotFound(_)));
    }

    #[test]
    fn realized_pnl_updates_budget_and_peak() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        ledger
            .record_open(position("A", Direction::Long, dec!(60)))
            .unwrap();
        // Long 0.1 @ 3000, exit 3060 -> +6.
        let outcome = ledger
            .record_close("A", dec!(3060), CloseReason::Target, Utc::now())
            .unwrap();
        assert_eq!(outcome.pnl, dec!(6.0));
        assert_eq!(ledger.current_budget(), dec!(1006.0));
        assert_eq!(ledger.peak_budget(), dec!(1006.0));

        // A loss moves current but not peak.
        ledger
            .record_open(position("A", Direction::Long, dec!(60)))
            .unwrap();
        ledger
            .record_close("A", dec!(2940), CloseReason::Stop, Utc::now())
            .unwrap();
        assert_eq!(ledger.current_budget(), dec!(1000.0));
        assert_eq!(ledger.peak_budget(), dec!(1006.0));
        assert!(ledger.drawdown() > Decimal::ZERO);
        assert!(ledger.drawdown() < Decimal::ONE);
    }

    #[test]
    fn short_pnl_inverts() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        ledger
            .record_open(position("A", Direction::Short, dec!(60)))
            .unwrap();
        let outcome = ledger
            .record_close("A", dec!(2940), CloseReason::Target, Utc::now())
            .unwrap();
        assert_eq!(outcome.pnl, dec!(6.0));
    }

    #[test]
    fn rolling_win_rate_neutral_on_empty_history() {
        let ledger = PortfolioLedger::new(dec!(1000));
        assert!(ledger.rolling_win_rate(20).is_none());
        assert_eq!(ledger.losing_streak(), 0);
        assert!(!ledger.is_losing_streak(3));
    }

    #[test]
    fn rolling_win_rate_uses_most_recent_window() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        // Two losses then three wins.
        for _ in 0..2 {
            ledger
                .record_open(position("A", Direction::Long, dec!(60)))
                .unwrap();
            ledger
                .record_close("A", dec!(2940), CloseReason::Stop, Utc::now())
                .unwrap();
        }
        for _ in 0..3 {
            ledger
                .record_open(position("A", Direction::Long, dec!(60)))
                .unwrap();
            ledger
                .record_close("A", dec!(3060), CloseReason::Target, Utc::now())
                .unwrap();
        }
        assert_eq!(ledger.rolling_win_rate(3), Some(1.0));
        assert_eq!(ledger.rolling_win_rate(5), Some(0.6));
        // Window larger than history falls back to full history.
        assert_eq!(ledger.rolling_win_rate(50), Some(0.6));
        assert_eq!(ledger.losing_streak(), 0);
    }

    #[test]
    fn losing_streak_counts_from_most_recent() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        ledger
            .record_open(position("A", Direction::Long, dec!(60)))
            .unwrap();
        ledger
            .record_close("A", dec!(3060), CloseReason::Target, Utc::now())
            .unwrap();
        for _ in 0..3 {
            ledger
                .record_open(position("A", Direction::Long, dec!(60)))
                .unwrap();
            ledger
                .record_close("A", dec!(2940), CloseReason::Stop, Utc::now())
                .unwrap();
        }
        assert_eq!(ledger.losing_streak(), 3);
        assert!(ledger.is_losing_streak(3));
        assert!(!ledger.is_losing_streak(4));
    }

    #[test]
    fn negative_margin_open_is_fatal() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        let err = ledger
            .record_open(position("A", Direction::Long, dec!(-1)))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn snapshot_reports_unrealized_pnl_when_prices_given() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        ledger
            .record_open(position("A", Direction::Long, dec!(60)))
            .unwrap();
        let prices: HashMap<String, Decimal> = [("A".to_string(), dec!(3060))].into();
        let snap = ledger.snapshot(Some(&prices), Utc::now());
        assert_eq!(snap.open_positions.len(), 1);
        assert_eq!(snap.open_positions[0].unrealized_pnl, Some(dec!(6.0)));
        assert_eq!(snap.available_budget, dec!(940));
        assert_eq!(snap.drawdown, Decimal::ZERO);
    }
}
