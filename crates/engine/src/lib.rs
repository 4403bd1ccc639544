pub mod engine;
pub mod ledger;
pub mod monitor;
pub mod pipeline;
pub mod sizing;
pub mod zones;

pub use engine::TradingEngine;
pub use ledger::PortfolioLedger;
pub use monitor::LifecycleMonitor;
pub use pipeline::ValidationPipeline;
pub use zones::{BudgetZone, ZoneAccess, ZoneEvaluator};
