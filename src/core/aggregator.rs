//! Combines the conversion and fiat feeds into a published rate table

use crate::core::cache::RateCache;
use crate::core::locale::CurrencyResolver;
use crate::core::preferences::Preferences;
use crate::core::provider::{ConversionProvider, FiatRateProvider};
use crate::core::rate::{ConversionFactor, ExchangeRate, RateTable, to_smallest_units};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a refresh attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Cached data is still fresh; nothing was fetched.
    NotDue,
    /// A new table was published.
    Refreshed(Arc<RateTable>),
    /// Another caller's refresh completed while this one waited.
    Joined,
    /// No conversion factor has ever been fetched.
    NoConversionFactor,
    /// Every fiat provider failed; the previous table is kept.
    NoFiatRates,
}

pub struct RateAggregator {
    cache: Arc<RateCache>,
    preferences: Preferences,
    resolver: CurrencyResolver,
    conversion: Box<dyn ConversionProvider>,
    fiat_providers: Vec<Box<dyn FiatRateProvider>>,
    synthetic_currency: String,
}

impl RateAggregator {
    pub fn new(
        cache: Arc<RateCache>,
        preferences: Preferences,
        resolver: CurrencyResolver,
        conversion: Box<dyn ConversionProvider>,
        fiat_providers: Vec<Box<dyn FiatRateProvider>>,
    ) -> Self {
        Self {
            cache,
            preferences,
            resolver,
            conversion,
            fiat_providers,
            synthetic_currency: "mBTC".to_string(),
        }
    }

    /// Code of the milli reference unit entry added to every table.
    pub fn with_synthetic_currency(mut self, code: &str) -> Self {
        self.synthetic_currency = code.to_string();
        self
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &CurrencyResolver {
        &self.resolver
    }

    /// Refreshes the cache when stale or forced, at most one refresh at a time.
    pub async fn refresh_if_stale(
        &self,
        now: DateTime<Utc>,
        provider: usize,
        force: bool,
    ) -> RefreshOutcome {
        self.cache
            .exclusive_refresh(force, || self.refresh(now, provider, force))
            .await
            .unwrap_or(RefreshOutcome::Joined)
    }

    async fn refresh(&self, now: DateTime<Utc>, provider: usize, force: bool) -> RefreshOutcome {
        if !force
            && self.cache.conversion_factor().await.is_some()
            && !self.cache.is_stale(now).await
        {
            return RefreshOutcome::NotDue;
        }

        match self.conversion.fetch_conversion(provider).await {
            Some(factor) => self.cache.set_conversion_factor(factor).await,
            None => debug!(provider, "Keeping previous conversion factor"),
        }

        let Some(factor) = self.cache.conversion_factor().await else {
            warn!(provider, "No conversion factor available, skipping refresh");
            return RefreshOutcome::NoConversionFactor;
        };

        let Some(mut table) = self.fetch_fiat_rates(factor).await else {
            warn!("All fiat rate providers failed, keeping previous rates");
            return RefreshOutcome::NoFiatRates;
        };

        if let Some(rate) = self.synthetic_rate(factor, provider) {
            table.insert(rate);
        }

        let table = self.cache.replace(table, now).await;
        info!(entries = table.len(), "Published exchange rates");
        self.persist_snapshot(&table).await;
        RefreshOutcome::Refreshed(table)
    }

    async fn fetch_fiat_rates(&self, factor: ConversionFactor) -> Option<RateTable> {
        for fiat in &self.fiat_providers {
            if let Some(rates) = fiat.fetch_rates(factor).await {
                debug!(provider = fiat.name(), "Using fiat rates");
                return Some(rates);
            }
            debug!(provider = fiat.name(), "Fiat provider unavailable, trying next");
        }
        None
    }

    /// The milli reference unit rate, rounded to 5 places before scaling.
    fn synthetic_rate(&self, factor: ConversionFactor, provider: usize) -> Option<ExchangeRate> {
        let amount = factor.milli_units();
        let rate = to_smallest_units(&amount)
            .ok()
            .and_then(|units| units.to_u128())
            .filter(|rate| *rate > 0);

        match rate {
            Some(rate) => Some(ExchangeRate::new(
                &self.synthetic_currency,
                rate,
                &self.conversion.source(provider),
            )),
            None => {
                warn!(
                    currency = %self.synthetic_currency,
                    amount = %amount,
                    "Dropping non-positive synthetic rate"
                );
                None
            }
        }
    }

    async fn persist_snapshot(&self, table: &RateTable) {
        let preferred = self.preferences.exchange_currency_code().await;
        let Some(rate) = self.resolver.resolve(table, preferred.as_deref()) else {
            debug!("No rate to cache for preferred currency");
            return;
        };

        if let Err(e) = self.preferences.set_cached_exchange_rate(rate).await {
            warn!(error = %e, "Failed to persist cached exchange rate");
        } else {
            debug!(rate = %rate, "Persisted cached exchange rate");
        }
    }
}
