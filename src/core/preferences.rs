//! User settings and the persisted last-known-good rate

use crate::core::rate::ExchangeRate;
use crate::store::KeyValueCollection;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_EXCHANGE_PROVIDER: &[u8] = b"exchange_provider";
const KEY_EXCHANGE_CURRENCY: &[u8] = b"exchange_currency_code";
const KEY_FORCE_REFRESH: &[u8] = b"exchange_force_refresh";
const KEY_CACHED_RATE: &[u8] = b"cached_exchange_rate";

/// Typed view over the preferences collection.
///
/// Missing or unreadable values fall back to defaults rather than failing.
#[derive(Clone)]
pub struct Preferences {
    collection: Arc<dyn KeyValueCollection>,
}

impl Preferences {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    /// Index of the selected conversion provider, `0` when unset.
    pub async fn conversion_provider(&self) -> usize {
        self.read_string(KEY_EXCHANGE_PROVIDER)
            .await
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }

    pub async fn set_conversion_provider(&self, index: usize) -> Result<()> {
        self.collection
            .put(KEY_EXCHANGE_PROVIDER, index.to_string().as_bytes())
            .await
            .context("Failed to store conversion provider")
    }

    /// The user's preferred display currency, if one was chosen.
    pub async fn exchange_currency_code(&self) -> Option<String> {
        self.read_string(KEY_EXCHANGE_CURRENCY)
            .await
            .filter(|code| !code.is_empty())
    }

    pub async fn set_exchange_currency_code(&self, code: &str) -> Result<()> {
        self.collection
            .put(KEY_EXCHANGE_CURRENCY, code.as_bytes())
            .await
            .context("Failed to store exchange currency")
    }

    pub async fn request_force_refresh(&self) -> Result<()> {
        self.collection
            .put(KEY_FORCE_REFRESH, b"true")
            .await
            .context("Failed to store force refresh flag")
    }

    /// Reads and clears the one-shot force refresh flag.
    pub async fn take_force_refresh(&self) -> bool {
        let forced = self
            .collection
            .take(KEY_FORCE_REFRESH)
            .await
            .is_some_and(|value| value == b"true");
        if forced {
            debug!("Consumed force refresh flag");
        }
        forced
    }

    pub async fn cached_exchange_rate(&self) -> Option<ExchangeRate> {
        let bytes = self.collection.get(KEY_CACHED_RATE).await?;
        match serde_json::from_slice(&bytes) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cached exchange rate");
                None
            }
        }
    }

    pub async fn set_cached_exchange_rate(&self, rate: &ExchangeRate) -> Result<()> {
        let bytes = serde_json::to_vec(rate).context("Failed to serialize exchange rate")?;
        self.collection
            .put(KEY_CACHED_RATE, &bytes)
            .await
            .context("Failed to store cached exchange rate")
    }

    async fn read_string(&self, key: &[u8]) -> Option<String> {
        let bytes = self.collection.get(key).await?;
        String::from_utf8(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;

    fn preferences() -> Preferences {
        Preferences::new(Arc::new(MemoryCollection::new()))
    }

    #[tokio::test]
    async fn test_defaults() {
        let prefs = preferences();
        assert_eq!(prefs.conversion_provider().await, 0);
        assert!(prefs.exchange_currency_code().await.is_none());
        assert!(!prefs.take_force_refresh().await);
        assert!(prefs.cached_exchange_rate().await.is_none());
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let prefs = preferences();
        prefs.set_conversion_provider(1).await.unwrap();
        prefs.set_exchange_currency_code("EUR").await.unwrap();

        assert_eq!(prefs.conversion_provider().await, 1);
        assert_eq!(prefs.exchange_currency_code().await.as_deref(), Some("EUR"));
    }

    #[tokio::test]
    async fn test_force_refresh_is_one_shot() {
        let prefs = preferences();
        prefs.request_force_refresh().await.unwrap();

        assert!(prefs.take_force_refresh().await);
        assert!(!prefs.take_force_refresh().await);
    }

    #[tokio::test]
    async fn test_cached_exchange_rate() {
        let prefs = preferences();
        let rate = ExchangeRate::new("USD", 123_456, "blockchain.info");
        prefs.set_cached_exchange_rate(&rate).await.unwrap();

        assert_eq!(prefs.cached_exchange_rate().await, Some(rate));
    }

    #[tokio::test]
    async fn test_corrupt_values_fall_back() {
        let collection = Arc::new(MemoryCollection::new());
        collection.put(KEY_EXCHANGE_PROVIDER, b"abc").await.unwrap();
        collection.put(KEY_CACHED_RATE, b"{not json").await.unwrap();

        let prefs = Preferences::new(collection);
        assert_eq!(prefs.conversion_provider().await, 0);
        assert!(prefs.cached_exchange_rate().await.is_none());
    }
}
