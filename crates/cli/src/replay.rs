//! Session replay: drives the engine from a recorded JSONL script.
//!
//! Each line is one cycle: the reference prices and volatility observed
//! that cycle plus the raw decision-maker response. The replay wires the
//! scripted data through the same collaborator traits a live driver would
//! use, sweeps stops/targets before validating the batch, and prints the
//! final portfolio snapshot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use perp_pilot_core::{
    parse_proposal_batch, CloseEvent, ExecutionHandler, MarketDataProvider, MarketView,
    PortfolioSnapshot, ProposalSource, ValidatedOutcome,
};
use perp_pilot_engine::TradingEngine;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::fs;
use tokio::sync::RwLock;

/// One recorded cycle.
#[derive(Debug, Clone, Deserialize)]
struct ScriptStep {
    prices: HashMap<String, f64>,
    #[serde(default)]
    volatility: HashMap<String, f64>,
    response: String,
}

/// Market data provider backed by the current script step.
struct ScriptedMarket {
    views: RwLock<HashMap<String, MarketView>>,
}

impl ScriptedMarket {
    fn new() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
        }
    }

    async fn advance(&self, step: &ScriptStep) -> Result<()> {
        let mut views = HashMap::new();
        for (instrument, price) in &step.prices {
            let volatility = step.volatility.get(instrument).copied().unwrap_or(0.0);
            views.insert(
                instrument.clone(),
                MarketView {
                    price: Decimal::try_from(*price)
                        .with_context(|| format!("bad price for {instrument}"))?,
                    volatility: Decimal::try_from(volatility)
                        .with_context(|| format!("bad volatility for {instrument}"))?,
                },
            );
        }
        *self.views.write().await = views;
        Ok(())
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedMarket {
    async fn market_views(&self, instruments: &[String]) -> Result<HashMap<String, MarketView>> {
        let views = self.views.read().await;
        Ok(instruments
            .iter()
            .filter_map(|i| views.get(i).map(|v| (i.clone(), *v)))
            .collect())
    }
}

/// Proposal source that replays the recorded raw responses in order.
struct ScriptedDecisions {
    responses: VecDeque<String>,
}

#[async_trait]
impl ProposalSource for ScriptedDecisions {
    async fn next_batch(&mut self, _snapshot: &PortfolioSnapshot) -> Result<String> {
        self.responses
            .pop_front()
            .context("script exhausted before the cycle ran")
    }
}

/// Execution transport stand-in: logs what a live transport would send.
struct LoggingExecution;

#[async_trait]
impl ExecutionHandler for LoggingExecution {
    async fn submit(&mut self, outcome: &ValidatedOutcome) -> Result<()> {
        tracing::info!(
            instrument = %outcome.instrument,
            action = ?outcome.action,
            leverage = outcome.leverage,
            quantity = %outcome.quantity,
            "would submit order",
        );
        Ok(())
    }

    async fn close(&mut self, event: &CloseEvent) -> Result<()> {
        tracing::info!(
            instrument = %event.instrument,
            reason = ?event.reason,
            pnl = %event.pnl,
            "would close external position",
        );
        Ok(())
    }
}

pub async fn run(script_path: &str, config_path: &str) -> Result<()> {
    let config = perp_pilot_core::ConfigLoader::load_from(config_path)?;
    let steps = load_script(script_path)?;
    tracing::info!(
        steps = steps.len(),
        instruments = config.instruments.len(),
        budget = %config.initial_budget,
        "starting replay",
    );

    let engine = TradingEngine::new(&config);
    let market = ScriptedMarket::new();
    let mut decisions = ScriptedDecisions {
        responses: steps.iter().map(|s| s.response.clone()).collect(),
    };
    let mut execution = LoggingExecution;

    for (cycle, step) in steps.iter().enumerate() {
        tracing::info!(cycle, "replay cycle");
        market.advance(step).await?;
        let views = market.market_views(&config.instruments).await?;

        // Stops and targets are checked against the new prices before the
        // decision batch, same as a live cycle.
        for event in engine.sweep(&views).await? {
            execution.close(&event).await?;
        }

        let snapshot = engine.snapshot(Some(&views)).await;
        let raw = decisions.next_batch(&snapshot).await?;
        let proposals = parse_proposal_batch(&raw, &config.instruments);
        let outcomes = engine.decide_batch(&proposals, &views).await?;
        for outcome in &outcomes {
            if outcome.approved && outcome.quantity > Decimal::ZERO {
                execution.submit(outcome).await?;
            } else if !outcome.approved {
                tracing::warn!(
                    instrument = %outcome.instrument,
                    reasons = ?outcome.reasons,
                    "proposal rejected",
                );
            }
        }
    }

    let snapshot = engine.snapshot(None).await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn load_script(path: &str) -> Result<Vec<ScriptStep>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading script {path}"))?;
    let mut steps = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(line)
            .with_context(|| format!("malformed script line {}", index + 1))?;
        steps.push(step);
    }
    anyhow::ensure!(!steps.is_empty(), "script {path} contains no steps");
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_step_parses() {
        let line = r#"{"prices": {"PERP_ETH_USDC": 3000.0},
                       "volatility": {"PERP_ETH_USDC": 30.0},
                       "response": "{\"decisions\": []}"}"#
            .replace('\n', " ");
        let step: ScriptStep = serde_json::from_str(&line).unwrap();
        assert_eq!(step.prices.len(), 1);
        assert_eq!(step.volatility["PERP_ETH_USDC"], 30.0);
    }

    #[test]
    fn volatility_defaults_to_empty() {
        let line = r#"{"prices": {"PERP_ETH_USDC": 3000.0}, "response": ""}"#;
        let step: ScriptStep = serde_json::from_str(line).unwrap();
        assert!(step.volatility.is_empty());
    }

    #[tokio::test]
    async fn scripted_market_serves_advanced_views() {
        let market = ScriptedMarket::new();
        let step = ScriptStep {
            prices: [("PERP_ETH_USDC".to_string(), 3000.0)].into(),
            volatility: HashMap::new(),
            response: String::new(),
        };
        market.advance(&step).await.unwrap();

        let instruments = vec!["PERP_ETH_USDC".to_string(), "PERP_BTC_USDC".to_string()];
        let views = market.market_views(&instruments).await.unwrap();
        // Only the scripted instrument is served; missing volatility
        // defaults to zero.
        assert_eq!(views.len(), 1);
        let eth = &views["PERP_ETH_USDC"];
        assert_eq!(eth.price, Decimal::from(3000));
        assert_eq!(eth.volatility, Decimal::ZERO);
    }
}
