use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level configuration for a trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub instruments: Vec<String>,
    pub initial_budget: Decimal,
    pub cycle_interval_secs: u64,
    pub risk: RiskConfig,
    pub leverage_scale: LeverageScale,
    pub log_level: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            instruments: vec![
                "PERP_ETH_USDC".to_string(),
                "PERP_BTC_USDC".to_string(),
                "PERP_SOL_USDC".to_string(),
            ],
            initial_budget: Decimal::new(1000, 0),
            cycle_interval_secs: 300,
            risk: RiskConfig::default(),
            leverage_scale: LeverageScale::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Risk-management parameters for the validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub reserve: ReserveConfig,
    /// Fraction of available budget risked per trade.
    pub max_loss_per_trade_pct: Decimal,
    /// Ceiling on total margin-in-use as a fraction of current budget.
    pub max_total_exposure_pct: Decimal,
    /// Stop distance must be at least this many volatility units away.
    pub min_stop_volatility_multiple: Decimal,
    /// Stop distance must be at most this many volatility units away.
    pub max_stop_volatility_multiple: Decimal,
    /// Position sizes are halved at this drawdown.
    pub drawdown_reduce_pct: Decimal,
    /// New opens are rejected outright at this drawdown.
    pub drawdown_halt_pct: Decimal,
    /// Base minimum reward:risk ratio for any open.
    pub min_reward_risk: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            reserve: ReserveConfig::default(),
            max_loss_per_trade_pct: Decimal::new(2, 2),
            max_total_exposure_pct: Decimal::new(80, 2),
            min_stop_volatility_multiple: Decimal::new(5, 1),
            max_stop_volatility_multiple: Decimal::new(3, 0),
            drawdown_reduce_pct: Decimal::new(10, 2),
            drawdown_halt_pct: Decimal::new(20, 2),
            min_reward_risk: Decimal::new(15, 1),
        }
    }
}

/// Graduated reserve thresholds: capital tiers unlock with proven
/// performance, and the higher tiers carry stricter per-trade requirements.
///
/// Zone allocations are fixed fractions of the *initial* budget; the lockout
/// share is never usable regardless of performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveConfig {
    pub free_pct: Decimal,
    pub guarded_pct: Decimal,
    pub floor_pct: Decimal,
    pub lockout_pct: Decimal,

    /// Guarded unlocks when the win rate over this window beats the
    /// threshold and there is no active losing streak.
    pub guarded_window: usize,
    pub guarded_win_rate: f64,
    pub guarded_max_losing_streak: usize,
    pub guarded_min_confidence: f64,
    pub guarded_min_rr: Decimal,
    pub guarded_max_leverage: u8,

    pub floor_window: usize,
    pub floor_win_rate: f64,
    pub floor_min_confidence: f64,
    pub floor_min_rr: Decimal,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            free_pct: Decimal::new(70, 2),
            guarded_pct: Decimal::new(20, 2),
            floor_pct: Decimal::new(5, 2),
            lockout_pct: Decimal::new(5, 2),
            guarded_window: 20,
            guarded_win_rate: 0.45,
            guarded_max_losing_streak: 3,
            guarded_min_confidence: 0.75,
            guarded_min_rr: Decimal::new(2, 0),
            guarded_max_leverage: 3,
            floor_window: 30,
            floor_win_rate: 0.60,
            floor_min_confidence: 0.90,
            floor_min_rr: Decimal::new(3, 0),
        }
    }
}

/// One confidence band mapping to a leverage ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeverageBand {
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub max_leverage: u8,
}

/// Confidence-banded leverage ceilings. Bands are half-open
/// `[min, max)`; the final default band extends past 1.0 so a clamped
/// confidence of exactly 1.0 maps to the top tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageScale {
    pub bands: Vec<LeverageBand>,
}

impl Default for LeverageScale {
    fn default() -> Self {
        let band = |lo: f64, hi: f64, lev: u8| LeverageBand {
            min_confidence: lo,
            max_confidence: hi,
            max_leverage: lev,
        };
        Self {
            bands: vec![
                band(0.0, 0.3, 1),
                band(0.3, 0.5, 2),
                band(0.5, 0.7, 5),
                band(0.7, 0.85, 7),
                band(0.85, 1.01, 10),
            ],
        }
    }
}

impl LeverageScale {
    /// Maximum leverage permitted at `confidence`.
    #[must_use]
    pub fn max_leverage_for(&self, confidence: f64) -> u8 {
        for band in &self.bands {
            if confidence >= band.min_confidence && confidence < band.max_confidence {
                return band.max_leverage;
            }
        }
        1
    }
}
