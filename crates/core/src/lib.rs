pub mod config;
pub mod config_loader;
pub mod decision;
pub mod error;
pub mod events;
pub mod position;
pub mod traits;

pub use config::{LeverageScale, ReserveConfig, RiskConfig, TradingConfig};
pub use config_loader::ConfigLoader;
pub use decision::{parse_proposal_batch, Action, Proposal, RejectReason, ValidatedOutcome};
pub use error::EngineError;
pub use events::{CloseEvent, MarketView, OpenPositionSummary, PortfolioSnapshot};
pub use position::{CloseReason, Direction, Position, TradeOutcome};
pub use traits::{Clock, ExecutionHandler, MarketDataProvider, ProposalSource, SystemClock};
