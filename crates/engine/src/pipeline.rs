//! Risk-validation pipeline.
//!
//! An ordered sequence of checks that every proposed trade must pass. Hard
//! failures reject the proposal with a reason code; soft failures clamp
//! leverage or quantity downward and continue. The pipeline has absolute
//! veto power over the external decision-maker.
//!
//! Proposals in a batch are processed strictly in submission order against
//! the live ledger: exposure consumed by an earlier approval is visible to
//! every later proposal, and an approved close frees its instrument for a
//! later open in the same batch.

use crate::ledger::PortfolioLedger;
use crate::sizing;
use crate::zones::ZoneEvaluator;
use chrono::{DateTime, Utc};
use perp_pilot_core::{
    Action, CloseReason, EngineError, LeverageScale, MarketView, Position, Proposal, RejectReason,
    RiskConfig, TradingConfig, ValidatedOutcome,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Hard floor under which a proposal is rejected outright, whatever the
/// leverage band would allow.
const MIN_CONFIDENCE: f64 = 0.10;

/// Parameters of an open that passed every layer.
#[derive(Debug, Clone, Copy)]
struct ApprovedOpen {
    leverage: u8,
    quantity: Decimal,
    margin: Decimal,
    max_loss: Decimal,
}

/// Zone constraints derived for one proposal (layer 4).
#[derive(Debug, Clone, Copy)]
struct ZoneConstraints {
    leverage: u8,
    max_quantity: Decimal,
    min_reward_risk: Decimal,
    /// Floor-zone usage demands reward:risk strictly above the minimum.
    reward_risk_strict: bool,
}

pub struct ValidationPipeline {
    risk: RiskConfig,
    leverage_scale: LeverageScale,
    zones: ZoneEvaluator,
}

impl ValidationPipeline {
    #[must_use]
    pub fn new(config: &TradingConfig) -> Self {
        Self {
            risk: config.risk.clone(),
            leverage_scale: config.leverage_scale.clone(),
            zones: ZoneEvaluator::new(config.initial_budget, config.risk.reserve.clone()),
        }
    }

    /// Validates a batch and applies approved outcomes to the ledger, in
    /// submission order.
    ///
    /// # Errors
    ///
    /// Only fatal ledger corruption propagates; per-proposal failures
    /// become rejected outcomes.
    pub fn run_batch(
        &self,
        ledger: &mut PortfolioLedger,
        proposals: &[Proposal],
        market: &HashMap<String, MarketView>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ValidatedOutcome>, EngineError> {
        let mut outcomes = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let view = market.get(&proposal.instrument);
            outcomes.push(self.process(ledger, proposal, view, now)?);
        }
        Ok(outcomes)
    }

    fn process(
        &self,
        ledger: &mut PortfolioLedger,
        proposal: &Proposal,
        view: Option<&MarketView>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedOutcome, EngineError> {
        match proposal.action {
            Action::Hold => Ok(ValidatedOutcome::approved_flat(
                proposal.instrument.clone(),
                Action::Hold,
            )),
            Action::Close => self.process_close(ledger, proposal, view, now),
            Action::Long | Action::Short => self.process_open(ledger, proposal, view, now),
        }
    }

    /// Close of the full position. A close with no matching position is a
    /// benign no-op, not an error.
    fn process_close(
        &self,
        ledger: &mut PortfolioLedger,
        proposal: &Proposal,
        view: Option<&MarketView>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedOutcome, EngineError> {
        if ledger.position(&proposal.instrument).is_none() {
            tracing::debug!(instrument = %proposal.instrument, "close with no open position, no-op");
            return Ok(ValidatedOutcome::approved_flat(
                proposal.instrument.clone(),
                Action::Close,
            ));
        }
        let Some(view) = view else {
            return Ok(ValidatedOutcome::rejected(
                proposal.instrument.clone(),
                Action::Close,
                RejectReason::MissingMarketData,
            ));
        };
        let outcome = ledger.record_close(&proposal.instrument, view.price, CloseReason::Manual, now)?;
        tracing::info!(
            instrument = %outcome.instrument,
            exit = %outcome.exit_price,
            pnl = %outcome.pnl,
            "closed position on proposal",
        );
        Ok(ValidatedOutcome::approved_flat(
            proposal.instrument.clone(),
            Action::Close,
        ))
    }

    fn process_open(
        &self,
        ledger: &mut PortfolioLedger,
        proposal: &Proposal,
        view: Option<&MarketView>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedOutcome, EngineError> {
        let Some(view) = view.filter(|v| v.price > Decimal::ZERO) else {
            return Ok(ValidatedOutcome::rejected(
                proposal.instrument.clone(),
                proposal.action,
                RejectReason::MissingMarketData,
            ));
        };

        match self.validate_open(ledger, proposal, view) {
            Err(reason) => {
                tracing::info!(
                    instrument = %proposal.instrument,
                    action = ?proposal.action,
                    ?reason,
                    "proposal rejected",
                );
                Ok(ValidatedOutcome::rejected(
                    proposal.instrument.clone(),
                    proposal.action,
                    reason,
                ))
            }
            Ok(open) => {
                let direction = proposal
                    .action
                    .direction()
                    .unwrap_or(perp_pilot_core::Direction::Long);
                ledger.record_open(Position {
                    instrument: proposal.instrument.clone(),
                    direction,
                    quantity: open.quantity,
                    entry_price: view.price,
                    leverage: open.leverage,
                    stop_loss: proposal.stop_loss,
                    take_profit: proposal.take_profit,
                    margin: open.margin,
                    confidence: proposal.confidence,
                    rationale: proposal.rationale.clone(),
                    opened_at: now,
                })?;
                tracing::info!(
                    instrument = %proposal.instrument,
                    action = ?proposal.action,
                    leverage = open.leverage,
                    quantity = %open.quantity,
                    margin = %open.margin,
                    max_loss = %open.max_loss,
                    "proposal approved",
                );
                Ok(ValidatedOutcome::approved_open(
                    proposal.instrument.clone(),
                    proposal.action,
                    open.leverage,
                    open.quantity,
                    open.margin,
                    open.max_loss,
                ))
            }
        }
    }

    /// Folds the validation layers in order. The first hard failure wins;
    /// soft layers adjust the working values and continue.
    fn validate_open(
        &self,
        ledger: &PortfolioLedger,
        proposal: &Proposal,
        view: &MarketView,
    ) -> Result<ApprovedOpen, RejectReason> {
        // Layer 1: drawdown circuit breaker.
        let halve_size = self.layer_drawdown(ledger.drawdown())?;

        // Layer 2: confidence floor.
        Self::layer_confidence(proposal.confidence)?;

        // Layer 3: leverage cap by confidence band.
        let leverage = self.layer_leverage(proposal.leverage, proposal.confidence);

        // Layer 4: budget zone access.
        let constraints = self.layer_zone_access(ledger, proposal, view.price, leverage)?;

        // Layer 5: stop-loss placement and volatility band.
        let stop_distance = self.layer_stop(proposal, view)?;

        // Layer 6: reward:risk ratio.
        Self::layer_reward_risk(proposal, view.price, stop_distance, &constraints)?;

        // Layer 7: position sizing from the drawdown-adjusted risk budget.
        let quantity =
            self.layer_size(ledger, view.price, stop_distance, halve_size, &constraints)?;

        // Layer 8: total exposure cap.
        let (quantity, margin) =
            self.layer_exposure(ledger, view.price, quantity, constraints.leverage)?;

        // Layer 9: position conflict.
        Self::layer_conflict(ledger, &proposal.instrument)?;

        Ok(ApprovedOpen {
            leverage: constraints.leverage,
            quantity,
            margin,
            max_loss: quantity * stop_distance,
        })
    }

    /// At the halt threshold every open is refused; in the reduce band the
    /// eventual sized quantity is halved.
    fn layer_drawdown(&self, drawdown: Decimal) -> Result<bool, RejectReason> {
        if drawdown >= self.risk.drawdown_halt_pct {
            return Err(RejectReason::DrawdownHalt);
        }
        Ok(drawdown >= self.risk.drawdown_reduce_pct)
    }

    fn layer_confidence(confidence: f64) -> Result<(), RejectReason> {
        if confidence < MIN_CONFIDENCE {
            return Err(RejectReason::ConfidenceTooLow);
        }
        Ok(())
    }

    fn layer_leverage(&self, requested: u8, confidence: f64) -> u8 {
        let ceiling = self.leverage_scale.max_leverage_for(confidence);
        requested.min(ceiling).max(1)
    }

    /// Determines how much unlocked capital the proposal may draw on and
    /// which tier its margin reaches into. Margin beyond the unlocked
    /// total clamps the requested quantity; reaching past Free applies the
    /// stricter Guarded (and possibly Floor) terms.
    fn layer_zone_access(
        &self,
        ledger: &PortfolioLedger,
        proposal: &Proposal,
        price: Decimal,
        leverage: u8,
    ) -> Result<ZoneConstraints, RejectReason> {
        let access = self.zones.evaluate(ledger, proposal.confidence);
        let committed = ledger.margin_in_use();
        let usable = access.usable(committed);
        if usable <= Decimal::ZERO {
            return Err(RejectReason::NoAccessibleBudget);
        }

        let mut leverage = leverage;
        let mut min_reward_risk = self.risk.min_reward_risk;
        let mut reward_risk_strict = false;

        let mut max_quantity = proposal.quantity;
        let mut margin = sizing::required_margin(max_quantity, price, leverage);
        if margin > usable {
            margin = usable;
            max_quantity = usable * Decimal::from(leverage) / price;
        }

        if margin > access.free_remaining(committed) {
            // Only reachable when Guarded is unlocked: usable capital ends
            // at the Free boundary otherwise.
            leverage = leverage.min(self.risk.reserve.guarded_max_leverage).max(1);
            min_reward_risk = min_reward_risk.max(self.risk.reserve.guarded_min_rr);

            // The leverage ceiling raises the margin demand; re-fit.
            margin = sizing::required_margin(max_quantity, price, leverage);
            if margin > usable {
                margin = usable;
                max_quantity = usable * Decimal::from(leverage) / price;
            }
            if margin > access.guarded_remaining(committed) {
                min_reward_risk = min_reward_risk.max(self.risk.reserve.floor_min_rr);
                reward_risk_strict = true;
            }
        }

        Ok(ZoneConstraints {
            leverage,
            max_quantity,
            min_reward_risk,
            reward_risk_strict,
        })
    }

    /// Stop must exist, sit on the loss side of entry, and fall within the
    /// volatility band. Returns the absolute stop distance. The band is
    /// skipped when no positive volatility measure was supplied.
    fn layer_stop(&self, proposal: &Proposal, view: &MarketView) -> Result<Decimal, RejectReason> {
        if proposal.stop_loss <= Decimal::ZERO {
            return Err(RejectReason::MissingStop);
        }
        let wrong_side = match proposal.action {
            Action::Long => proposal.stop_loss >= view.price,
            Action::Short => proposal.stop_loss <= view.price,
            Action::Close | Action::Hold => false,
        };
        if wrong_side {
            return Err(RejectReason::StopWrongSide);
        }

        let distance = (view.price - proposal.stop_loss).abs();
        if view.volatility > Decimal::ZERO {
            let ratio = distance / view.volatility;
            if ratio < self.risk.min_stop_volatility_multiple {
                return Err(RejectReason::StopTooTight);
            }
            if ratio > self.risk.max_stop_volatility_multiple {
                return Err(RejectReason::StopTooWide);
            }
        }
        Ok(distance)
    }

    fn layer_reward_risk(
        proposal: &Proposal,
        price: Decimal,
        stop_distance: Decimal,
        constraints: &ZoneConstraints,
    ) -> Result<(), RejectReason> {
        if proposal.take_profit <= Decimal::ZERO {
            return Err(RejectReason::InvalidTarget);
        }
        let wrong_side = match proposal.action {
            Action::Long => proposal.take_profit <= price,
            Action::Short => proposal.take_profit >= price,
            Action::Close | Action::Hold => false,
        };
        if wrong_side {
            return Err(RejectReason::InvalidTarget);
        }

        let ratio = (proposal.take_profit - price).abs() / stop_distance;
        let too_low = if constraints.reward_risk_strict {
            ratio <= constraints.min_reward_risk
        } else {
            ratio < constraints.min_reward_risk
        };
        if too_low {
            return Err(RejectReason::RewardRiskTooLow);
        }
        Ok(())
    }

    /// Sizes the position from the risk budget, never above the (possibly
    /// zone-clamped) requested quantity.
    fn layer_size(
        &self,
        ledger: &PortfolioLedger,
        price: Decimal,
        stop_distance: Decimal,
        halve_size: bool,
        constraints: &ZoneConstraints,
    ) -> Result<Decimal, RejectReason> {
        let mut fraction = self.risk.max_loss_per_trade_pct;
        if halve_size {
            fraction /= Decimal::TWO;
            tracing::debug!("drawdown reduce band active, risk fraction halved");
        }
        let risk_capital = ledger.available_budget() * fraction;
        let sized = sizing::size_position(risk_capital, price, stop_distance / price)
            .map_err(|_| RejectReason::InvalidStopDistance)?;
        let quantity = sized.min(constraints.max_quantity);
        if quantity <= Decimal::ZERO {
            return Err(RejectReason::SizeRoundsToZero);
        }
        Ok(quantity)
    }

    /// Total margin across all instruments must stay under the exposure
    /// ceiling; shrink to fit, reject when nothing fits.
    fn layer_exposure(
        &self,
        ledger: &PortfolioLedger,
        price: Decimal,
        quantity: Decimal,
        leverage: u8,
    ) -> Result<(Decimal, Decimal), RejectReason> {
        let ceiling = ledger.current_budget() * self.risk.max_total_exposure_pct;
        let allowed = ceiling - ledger.margin_in_use();
        if allowed <= Decimal::ZERO {
            return Err(RejectReason::ExposureCapReached);
        }
        let mut quantity = quantity;
        let mut margin = sizing::required_margin(quantity, price, leverage);
        if margin > allowed {
            tracing::debug!(%margin, %allowed, "exposure cap shrank position");
            margin = allowed;
            quantity = allowed * Decimal::from(leverage) / price;
            if quantity <= Decimal::ZERO {
                return Err(RejectReason::ExposureCapReached);
            }
        }
        Ok((quantity, margin))
    }

    fn layer_conflict(ledger: &PortfolioLedger, instrument: &str) -> Result<(), RejectReason> {
        if ledger.position(instrument).is_some() {
            return Err(RejectReason::PositionConflict);
        }
        Ok(())
    }
}
