//! Graduated budget zones.
//!
//! Capital is split into four tiers at session start, as fixed fractions of
//! the initial budget. Free capital is always tradable; Guarded and Floor
//! unlock only with a proven recent record plus high per-proposal
//! confidence; Lockout (and the inert half of Floor) is never tradable.

use crate::ledger::PortfolioLedger;
use perp_pilot_core::ReserveConfig;
use rust_decimal::Decimal;

/// A capital tier with escalating eligibility requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetZone {
    Free,
    Guarded,
    Floor,
    Lockout,
}

impl BudgetZone {
    pub const ALL: [Self; 4] = [Self::Free, Self::Guarded, Self::Floor, Self::Lockout];
}

/// Result of evaluating zone eligibility for one proposal.
#[derive(Debug, Clone, Copy)]
pub struct ZoneAccess {
    pub free_allocation: Decimal,
    pub guarded_allocation: Decimal,
    pub guarded_unlocked: bool,
    pub floor_unlocked: bool,
    /// Total capital across unlocked zones (Free always included; Floor
    /// contributes only its usable half).
    pub unlocked_capital: Decimal,
}

impl ZoneAccess {
    /// Unlocked capital left after margin already committed.
    #[must_use]
    pub fn usable(&self, margin_in_use: Decimal) -> Decimal {
        (self.unlocked_capital - margin_in_use).max(Decimal::ZERO)
    }

    /// Free-zone capital left after margin already committed. Margin
    /// beyond this dips into the Guarded tier.
    #[must_use]
    pub fn free_remaining(&self, margin_in_use: Decimal) -> Decimal {
        (self.free_allocation - margin_in_use).max(Decimal::ZERO)
    }

    /// Free-plus-Guarded capital left after committed margin. Margin
    /// beyond this dips into the Floor tier.
    #[must_use]
    pub fn guarded_remaining(&self, margin_in_use: Decimal) -> Decimal {
        (self.free_allocation + self.guarded_allocation - margin_in_use).max(Decimal::ZERO)
    }
}

/// Evaluates which capital tiers a proposal may draw on, given the
/// ledger's recent performance and the proposal's confidence.
///
/// Eligibility is checked at open time only; a position keeps its margin
/// regardless of later zone lock state.
pub struct ZoneEvaluator {
    reserve: ReserveConfig,
    free_allocation: Decimal,
    guarded_allocation: Decimal,
    floor_allocation: Decimal,
}

impl ZoneEvaluator {
    #[must_use]
    pub fn new(initial_budget: Decimal, reserve: ReserveConfig) -> Self {
        Self {
            free_allocation: initial_budget * reserve.free_pct,
            guarded_allocation: initial_budget * reserve.guarded_pct,
            floor_allocation: initial_budget * reserve.floor_pct,
            reserve,
        }
    }

    /// Per-tier eligibility predicate.
    #[must_use]
    pub fn is_unlocked(
        &self,
        zone: BudgetZone,
        ledger: &PortfolioLedger,
        confidence: f64,
    ) -> bool {
        let r = &self.reserve;
        match zone {
            BudgetZone::Free => true,
            BudgetZone::Guarded => {
                ledger
                    .rolling_win_rate(r.guarded_window)
                    .is_some_and(|w| w > r.guarded_win_rate)
                    && !ledger.is_losing_streak(r.guarded_max_losing_streak)
                    && confidence > r.guarded_min_confidence
            }
            BudgetZone::Floor => {
                ledger
                    .rolling_win_rate(r.floor_window)
                    .is_some_and(|w| w > r.floor_win_rate)
                    && confidence > r.floor_min_confidence
            }
            BudgetZone::Lockout => false,
        }
    }

    /// Capital a tier contributes when unlocked. Half of the Floor
    /// allocation is permanently inert; Lockout contributes nothing.
    #[must_use]
    fn usable_allocation(&self, zone: BudgetZone) -> Decimal {
        match zone {
            BudgetZone::Free => self.free_allocation,
            BudgetZone::Guarded => self.guarded_allocation,
            BudgetZone::Floor => self.floor_allocation / Decimal::TWO,
            BudgetZone::Lockout => Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn evaluate(&self, ledger: &PortfolioLedger, confidence: f64) -> ZoneAccess {
        let mut unlocked_capital = Decimal::ZERO;
        for zone in BudgetZone::ALL {
            if self.is_unlocked(zone, ledger, confidence) {
                unlocked_capital += self.usable_allocation(zone);
            }
        }
        ZoneAccess {
            free_allocation: self.free_allocation,
            guarded_allocation: self.guarded_allocation,
            guarded_unlocked: self.is_unlocked(BudgetZone::Guarded, ledger, confidence),
            floor_unlocked: self.is_unlocked(BudgetZone::Floor, ledger, confidence),
            unlocked_capital,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perp_pilot_core::{CloseReason, Direction, Position};
    use rust_decimal_macros::dec;

    fn evaluator() -> ZoneEvaluator {
        ZoneEvaluator::new(dec!(1000), ReserveConfig::default())
    }

    fn record_trades(ledger: &mut PortfolioLedger, wins: usize, losses: usize) {
        // Losses first so a winning tail leaves no losing streak.
        for _ in 0..losses {
            open_and_close(ledger, dec!(2940), CloseReason::Stop);
        }
        for _ in 0..wins {
            open_and_close(ledger, dec!(3060), CloseReason::Target);
        }
    }

    fn open_and_close(ledger: &mut PortfolioLedger, exit: Decimal, reason: CloseReason) {
        ledger
            .record_open(Position {
                instrument: "A".to_string(),
                direction: Direction::Long,
                quantity: dec!(0.1),
                entry_price: dec!(3000),
                leverage: 5,
                stop_loss: dec!(2940),
                take_profit: dec!(3120),
                margin: dec!(60),
                confidence: 0.6,
                rationale: String::new(),
                opened_at: Utc::now(),
            })
            .unwrap();
        ledger.record_close("A", exit, reason, Utc::now()).unwrap();
    }

    #[test]
    fn only_free_zone_with_no_history() {
        let ledger = PortfolioLedger::new(dec!(1000));
        let access = evaluator().evaluate(&ledger, 0.9);
        assert!(!access.guarded_unlocked);
        assert!(!access.floor_unlocked);
        assert_eq!(access.unlocked_capital, dec!(700));
    }

    #[test]
    fn guarded_unlocks_with_record_and_confidence() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        record_trades(&mut ledger, 20, 0);
        let access = evaluator().evaluate(&ledger, 0.8);
        assert!(access.guarded_unlocked);
        assert_eq!(access.unlocked_capital, dec!(900));
    }

    #[test]
    fn guarded_needs_high_confidence() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        record_trades(&mut ledger, 20, 0);
        let access = evaluator().evaluate(&ledger, 0.6);
        assert!(!access.guarded_unlocked);
        assert_eq!(access.unlocked_capital, dec!(700));
    }

    #[test]
    fn losing_streak_locks_guarded() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        // 17 wins then 3 losses: win rate still high, but streak blocks.
        for _ in 0..17 {
            open_and_close(&mut ledger, dec!(3060), CloseReason::Target);
        }
        for _ in 0..3 {
            open_and_close(&mut ledger, dec!(2940), CloseReason::Stop);
        }
        let access = evaluator().evaluate(&ledger, 0.8);
        assert!(!access.guarded_unlocked);
    }

    #[test]
    fn floor_contributes_only_half_its_allocation() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        record_trades(&mut ledger, 25, 5);
        let access = evaluator().evaluate(&ledger, 0.95);
        assert!(access.floor_unlocked);
        // 700 free + 200 guarded + 25 usable floor half.
        assert_eq!(access.unlocked_capital, dec!(925));
    }

    #[test]
    fn lockout_never_unlocks() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        record_trades(&mut ledger, 50, 0);
        let evaluator = evaluator();
        assert!(!evaluator.is_unlocked(BudgetZone::Lockout, &ledger, 1.0));
        let access = evaluator.evaluate(&ledger, 1.0);
        assert_eq!(access.unlocked_capital, dec!(925));
    }

    #[test]
    fn usable_subtracts_committed_margin() {
        let ledger = PortfolioLedger::new(dec!(1000));
        let access = evaluator().evaluate(&ledger, 0.5);
        assert_eq!(access.usable(dec!(200)), dec!(500));
        assert_eq!(access.usable(dec!(800)), Decimal::ZERO);
        assert_eq!(access.free_remaining(dec!(200)), dec!(500));
    }
}
