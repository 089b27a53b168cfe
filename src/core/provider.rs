//! Upstream price feed abstractions

use crate::core::rate::{ConversionFactor, RateTable};
use async_trait::async_trait;

/// Source of the native → reference asset price.
#[async_trait]
pub trait ConversionProvider: Send + Sync {
    /// Display source for the provider chosen by `selector`.
    fn source(&self, selector: usize) -> String;

    /// Current price, or `None` when the provider is unavailable.
    async fn fetch_conversion(&self, selector: usize) -> Option<ConversionFactor>;
}

/// Source of reference asset → fiat rates.
#[async_trait]
pub trait FiatRateProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Rates scaled into native units, or `None` to try the next provider.
    async fn fetch_rates(&self, conversion: ConversionFactor) -> Option<RateTable>;
}
