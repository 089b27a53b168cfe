//! Core exchange rate engine

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod locale;
pub mod log;
pub mod preferences;
pub mod provider;
pub mod query;
pub mod rate;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for cleaner imports
pub use aggregator::{RateAggregator, RefreshOutcome};
pub use cache::RateCache;
pub use provider::{ConversionProvider, FiatRateProvider};
pub use query::{QueryError, RateQueryService, RateRow, Selection};
pub use rate::{ConversionFactor, ExchangeRate, RateTable};
