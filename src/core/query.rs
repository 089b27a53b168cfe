//! Tabular read interface over the cached exchange rates

use crate::core::aggregator::{RateAggregator, RefreshOutcome};
use crate::core::cache::RateCache;
use crate::core::preferences::Preferences;
use crate::core::rate::ExchangeRate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Column names of every row returned by [`RateQueryService::query`].
pub const COLUMNS: [&str; 4] = ["id", "currency_code", "rate", "source"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Resolved with locale and default currency fallbacks.
    CurrencyCode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateRow {
    pub id: i32,
    pub currency_code: String,
    pub rate: u128,
    pub source: String,
}

impl From<&ExchangeRate> for RateRow {
    fn from(rate: &ExchangeRate) -> Self {
        RateRow {
            id: currency_id(&rate.currency_code),
            currency_code: rate.currency_code.clone(),
            rate: rate.rate,
            source: rate.source.clone(),
        }
    }
}

/// Stable row id for a currency code (31-based polynomial string hash).
pub fn currency_id(currency_code: &str) -> i32 {
    currency_code
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_mul(31).wrapping_add(i32::from(unit))
        })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0} is not supported by the exchange rates service")]
    Unsupported(&'static str),
}

/// Serves exchange rates, refreshing them when stale or when forced.
pub struct RateQueryService {
    aggregator: RateAggregator,
    preferences: Preferences,
}

impl RateQueryService {
    pub fn new(aggregator: RateAggregator, preferences: Preferences) -> Self {
        Self {
            aggregator,
            preferences,
        }
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        self.aggregator.cache()
    }

    /// Seeds the cache with the last persisted rate, if any.
    pub async fn prewarm(&self) {
        if let Some(snapshot) = self.preferences.cached_exchange_rate().await {
            self.cache().prewarm(snapshot).await;
        }
    }

    pub async fn query(&self, selection: &Selection) -> Option<Vec<RateRow>> {
        self.query_at(Utc::now(), selection).await
    }

    /// Returns the matching rows, or `None` when no rates are available yet.
    #[instrument(name = "RateQuery", skip(self))]
    pub async fn query_at(
        &self,
        now: DateTime<Utc>,
        selection: &Selection,
    ) -> Option<Vec<RateRow>> {
        let provider = self.preferences.conversion_provider().await;
        let force = self.preferences.take_force_refresh().await;

        if force || self.cache().is_stale(now).await {
            let outcome = self.aggregator.refresh_if_stale(now, provider, force).await;
            match &outcome {
                RefreshOutcome::Refreshed(table) => {
                    debug!(entries = table.len(), "Refreshed exchange rates")
                }
                other => debug!(outcome = ?other, "Exchange rates not refreshed"),
            }
        }

        let Some(table) = self.cache().table().await else {
            debug!("No exchange rate data available");
            return None;
        };

        let rows = match selection {
            Selection::All => table.iter().map(RateRow::from).collect(),
            Selection::CurrencyCode(code) => self
                .aggregator
                .resolver()
                .resolve(&table, Some(code))
                .map(RateRow::from)
                .into_iter()
                .collect(),
        };
        Some(rows)
    }

    pub fn insert(&self, _row: &RateRow) -> Result<(), QueryError> {
        Err(QueryError::Unsupported("insert"))
    }

    pub fn update(&self, _selection: &Selection, _row: &RateRow) -> Result<usize, QueryError> {
        Err(QueryError::Unsupported("update"))
    }

    pub fn delete(&self, _selection: &Selection) -> Result<usize, QueryError> {
        Err(QueryError::Unsupported("delete"))
    }

    pub fn get_type(&self) -> Result<String, QueryError> {
        Err(QueryError::Unsupported("get_type"))
    }
}
