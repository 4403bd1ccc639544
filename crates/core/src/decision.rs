//! Proposal and outcome types for the risk-validation pipeline.
//!
//! Proposals originate from an untrusted external decision-maker (an LLM).
//! Parsing is lenient about shape but strict about content: any proposal
//! with a malformed or missing numeric field fails closed to a `Hold` for
//! that instrument, never an engine-wide error.

use crate::position::Direction;
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the decision-maker wants to do with one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Long,
    Short,
    Close,
    Hold,
}

impl Action {
    /// Direction of the exposure an open action would create.
    #[must_use]
    pub const fn direction(self) -> Option<Direction> {
        match self {
            Self::Long => Some(Direction::Long),
            Self::Short => Some(Direction::Short),
            Self::Close | Self::Hold => None,
        }
    }

    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Long | Self::Short)
    }
}

/// An untrusted candidate trade awaiting validation. Immutable pipeline
/// input; the pipeline adjusts a working copy, never the proposal itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub instrument: String,
    pub action: Action,
    pub leverage: u8,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub confidence: f64,
    pub rationale: String,
}

impl Proposal {
    /// A do-nothing proposal for `instrument`.
    #[must_use]
    pub fn hold(instrument: &str, rationale: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            action: Action::Hold,
            leverage: 1,
            quantity: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            confidence: 0.0,
            rationale: rationale.to_string(),
        }
    }
}

/// Wire shape of one decision as the LLM emits it. All numeric fields are
/// optional so a missing field is detected here instead of silently
/// defaulting.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProposal {
    #[serde(alias = "symbol")]
    pub instrument: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub leverage: Option<f64>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBatch {
    #[serde(default)]
    decisions: Vec<serde_json::Value>,
}

fn to_decimal(field: &str, value: Option<f64>) -> Result<Decimal> {
    let Some(v) = value else {
        bail!("missing numeric field `{field}`");
    };
    if !v.is_finite() || v < 0.0 {
        bail!("field `{field}` is not a finite non-negative number: {v}");
    }
    Decimal::try_from(v).map_err(|e| anyhow::anyhow!("field `{field}`: {e}"))
}

impl TryFrom<RawProposal> for Proposal {
    type Error = anyhow::Error;

    fn try_from(raw: RawProposal) -> Result<Self> {
        let action = match raw.action.as_deref().map(str::to_ascii_uppercase) {
            Some(a) => match a.as_str() {
                "LONG" => Action::Long,
                "SHORT" => Action::Short,
                "CLOSE" => Action::Close,
                "HOLD" => Action::Hold,
                other => bail!("unknown action {other:?}"),
            },
            None => Action::Hold,
        };

        if !action.is_open() {
            // Hold/close carry no sizing fields worth validating.
            return Ok(Self {
                instrument: raw.instrument,
                action,
                leverage: 1,
                quantity: Decimal::ZERO,
                stop_loss: Decimal::ZERO,
                take_profit: Decimal::ZERO,
                confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
                rationale: raw.reasoning.unwrap_or_default(),
            });
        }

        let Some(leverage) = raw.leverage else {
            bail!("missing numeric field `leverage`");
        };
        if !leverage.is_finite() || leverage < 1.0 || leverage > 50.0 {
            bail!("leverage {leverage} outside 1..=50");
        }
        let Some(confidence) = raw.confidence else {
            bail!("missing numeric field `confidence`");
        };
        if !confidence.is_finite() {
            bail!("confidence is not finite");
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let leverage = leverage.floor() as u8;

        Ok(Self {
            instrument: raw.instrument,
            action,
            leverage,
            quantity: to_decimal("quantity", raw.quantity)?,
            stop_loss: to_decimal("stop_loss", raw.stop_loss)?,
            take_profit: to_decimal("take_profit", raw.take_profit)?,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: raw.reasoning.unwrap_or_default(),
        })
    }
}

/// Parses a raw decision-maker response into one proposal per instrument.
///
/// Markdown code fences are stripped and, if the payload is not clean JSON,
/// the outermost object is extracted. Malformed individual decisions fail
/// closed to `Hold`; instruments with no decision get an implicit `Hold`.
#[must_use]
pub fn parse_proposal_batch(raw: &str, instruments: &[String]) -> Vec<Proposal> {
    let content: String = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let batch: RawBatch = match serde_json::from_str(&content) {
        Ok(b) => b,
        Err(_) => match extract_object(&content).and_then(|s| serde_json::from_str(s).ok()) {
            Some(b) => b,
            None => {
                tracing::error!("unparseable decision payload, holding all instruments");
                return instruments
                    .iter()
                    .map(|i| Proposal::hold(i, "unparseable response"))
                    .collect();
            }
        },
    };

    let mut proposals: Vec<Proposal> = Vec::with_capacity(instruments.len());
    for value in batch.decisions {
        let raw: RawProposal = match serde_json::from_value(value.clone()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "skipping decision with no instrument");
                continue;
            }
        };
        let instrument = raw.instrument.clone();
        match Proposal::try_from(raw) {
            Ok(p) => proposals.push(p),
            Err(e) => {
                tracing::warn!(%instrument, error = %e, "malformed decision, failing closed to hold");
                proposals.push(Proposal::hold(&instrument, "malformed decision"));
            }
        }
    }

    for instrument in instruments {
        if !proposals.iter().any(|p| &p.instrument == instrument) {
            proposals.push(Proposal::hold(instrument, "no decision provided"));
        }
    }

    proposals
}

fn extract_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Why a validation layer refused a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Drawdown at or past the halt threshold.
    DrawdownHalt,
    /// Confidence below the hard floor.
    ConfidenceTooLow,
    /// No unlocked zone capital remains.
    NoAccessibleBudget,
    /// No stop-loss supplied.
    MissingStop,
    /// Stop-loss on the wrong side of the entry price.
    StopWrongSide,
    /// Stop distance under the volatility band minimum.
    StopTooTight,
    /// Stop distance over the volatility band maximum.
    StopTooWide,
    /// Take-profit missing or on the wrong side of the entry price.
    InvalidTarget,
    /// Reward:risk ratio under the applicable minimum.
    RewardRiskTooLow,
    /// Stop distance fraction unusable for sizing.
    InvalidStopDistance,
    /// Risk limits shrank the position to nothing.
    SizeRoundsToZero,
    /// Total-exposure ceiling already reached.
    ExposureCapReached,
    /// A position is already open for the instrument.
    PositionConflict,
    /// No reference price or volatility for the instrument.
    MissingMarketData,
}

/// The pipeline's verdict on one proposal. Final leverage and quantity may
/// be lower than requested; they are zero whenever `approved` is false and
/// for hold/close actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedOutcome {
    pub instrument: String,
    pub action: Action,
    pub approved: bool,
    pub leverage: u8,
    pub quantity: Decimal,
    pub margin: Decimal,
    pub max_loss: Decimal,
    pub reasons: Vec<RejectReason>,
}

impl ValidatedOutcome {
    /// An approved open with its final risk-adjusted parameters.
    #[must_use]
    pub fn approved_open(
        instrument: String,
        action: Action,
        leverage: u8,
        quantity: Decimal,
        margin: Decimal,
        max_loss: Decimal,
    ) -> Self {
        Self {
            instrument,
            action,
            approved: true,
            leverage,
            quantity,
            margin,
            max_loss,
            reasons: Vec::new(),
        }
    }

    /// An approved zero-size outcome (hold, or close of the full position).
    #[must_use]
    pub fn approved_flat(instrument: String, action: Action) -> Self {
        Self {
            instrument,
            action,
            approved: true,
            leverage: 0,
            quantity: Decimal::ZERO,
            margin: Decimal::ZERO,
            max_loss: Decimal::ZERO,
            reasons: Vec::new(),
        }
    }

    #[must_use]
    pub fn rejected(instrument: String, action: Action, reason: RejectReason) -> Self {
        Self {
            instrument,
            action,
            approved: false,
            leverage: 0,
            quantity: Decimal::ZERO,
            margin: Decimal::ZERO,
            max_loss: Decimal::ZERO,
            reasons: vec![reason],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn instruments() -> Vec<String> {
        vec!["PERP_ETH_USDC".to_string(), "PERP_BTC_USDC".to_string()]
    }

    #[test]
    fn parses_clean_batch() {
        let raw = r#"{"decisions": [
            {"instrument": "PERP_ETH_USDC", "action": "LONG", "leverage": 5,
             "quantity": 0.5, "stop_loss": 2940.0, "take_profit": 3120.0,
             "confidence": 0.6, "reasoning": "trend up"}
        ]}"#;
        let proposals = parse_proposal_batch(raw, &instruments());
        assert_eq!(proposals.len(), 2);
        let eth = &proposals[0];
        assert_eq!(eth.action, Action::Long);
        assert_eq!(eth.leverage, 5);
        assert_eq!(eth.quantity, dec!(0.5));
        // BTC had no decision: implicit hold.
        assert_eq!(proposals[1].action, Action::Hold);
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"decisions\": [{\"instrument\": \"PERP_ETH_USDC\", \"action\": \"HOLD\"}]}\n```";
        let proposals = parse_proposal_batch(raw, &instruments());
        assert_eq!(proposals.len(), 2);
        assert!(proposals.iter().all(|p| p.action == Action::Hold));
    }

    #[test]
    fn missing_numeric_field_fails_closed_to_hold() {
        // LONG without a stop_loss is malformed, not defaulted.
        let raw = r#"{"decisions": [
            {"instrument": "PERP_ETH_USDC", "action": "LONG", "leverage": 5,
             "quantity": 0.5, "take_profit": 3120.0, "confidence": 0.6}
        ]}"#;
        let proposals = parse_proposal_batch(raw, &instruments());
        let eth = proposals
            .iter()
            .find(|p| p.instrument == "PERP_ETH_USDC")
            .unwrap();
        assert_eq!(eth.action, Action::Hold);
    }

    #[test]
    fn non_finite_confidence_fails_closed() {
        let raw = r#"{"decisions": [
            {"instrument": "PERP_ETH_USDC", "action": "SHORT", "leverage": 3,
             "quantity": 1.0, "stop_loss": 3100.0, "take_profit": 2800.0,
             "confidence": 1e999}
        ]}"#;
        let proposals = parse_proposal_batch(raw, &instruments());
        let eth = proposals
            .iter()
            .find(|p| p.instrument == "PERP_ETH_USDC")
            .unwrap();
        assert_eq!(eth.action, Action::Hold);
    }

    #[test]
    fn garbage_payload_holds_everything() {
        let proposals = parse_proposal_batch("not json at all", &instruments());
        assert_eq!(proposals.len(), 2);
        assert!(proposals.iter().all(|p| p.action == Action::Hold));
    }

    #[test]
    fn extracts_json_from_surrounding_prose() {
        let raw = "Here is my decision:\n{\"decisions\": [{\"instrument\": \"PERP_BTC_USDC\", \"action\": \"CLOSE\", \"confidence\": 0.5}]}\nDone.";
        let proposals = parse_proposal_batch(raw, &instruments());
        let btc = proposals
            .iter()
            .find(|p| p.instrument == "PERP_BTC_USDC")
            .unwrap();
        assert_eq!(btc.action, Action::Close);
    }

    #[test]
    fn confidence_clamped_into_unit_interval() {
        let raw = r#"{"decisions": [
            {"instrument": "PERP_ETH_USDC", "action": "LONG", "leverage": 2,
             "quantity": 0.1, "stop_loss": 2940.0, "take_profit": 3120.0,
             "confidence": 1.7}
        ]}"#;
        let proposals = parse_proposal_batch(raw, &instruments());
        let eth = proposals
            .iter()
            .find(|p| p.instrument == "PERP_ETH_USDC")
            .unwrap();
        assert!((eth.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn symbol_alias_accepted() {
        let raw = r#"{"decisions": [{"symbol": "PERP_ETH_USDC", "action": "HOLD"}]}"#;
        let proposals = parse_proposal_batch(raw, &instruments());
        assert_eq!(proposals.len(), 2);
    }
}
