//! Whale classification and top-wallet aggregation.

pub mod aggregate;
pub mod thresholds;

pub use aggregate::top_wallets;
pub use thresholds::ThresholdTable;
