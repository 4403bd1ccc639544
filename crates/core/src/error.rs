use rust_decimal::Decimal;
use thiserror::Error;

/// Error taxonomy for the risk engine.
///
/// Rejections are not errors: a proposal that fails a validation layer
/// produces a normal [`crate::ValidatedOutcome`] carrying reason codes.
/// These variants cover genuine contract violations between components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A position is already open for the instrument.
    #[error("position already open for {0}")]
    PositionConflict(String),

    /// No open position exists for the instrument.
    #[error("no open position for {0}")]
    PositionNotFound(String),

    /// Stop-loss distance fraction is zero, negative, or wider than the
    /// sizer can handle.
    #[error("stop distance fraction {0} outside (0, 0.5]")]
    InvalidStop(Decimal),

    /// A ledger invariant no longer holds (e.g. negative margin-in-use).
    /// Fatal: the engine must stop rather than keep trading on corrupted
    /// accounting.
    #[error("ledger invariant violated: {0}")]
    LedgerCorrupted(String),
}

impl EngineError {
    /// True for errors that must halt the engine instead of being handled
    /// per-proposal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::LedgerCorrupted(_))
    }
}
