use super::util::fetch_text;
use crate::core::config::{ConversionProviderConfig, ConversionResponseFormat};
use crate::core::provider::ConversionProvider;
use crate::core::rate::ConversionFactor;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

/// Parses a conversion response body according to its provider format.
pub fn parse_conversion(body: &str, format: &ConversionResponseFormat) -> Result<ConversionFactor> {
    match format {
        ConversionResponseFormat::BareNumber => body.parse(),
        ConversionResponseFormat::NestedField { field } => {
            let json: Value = serde_json::from_str(body)
                .with_context(|| format!("Failed to parse JSON conversion response: '{body}'"))?;
            match json.get(field) {
                Some(Value::String(value)) => value.parse(),
                Some(Value::Number(value)) => value.to_string().parse(),
                Some(other) => Err(anyhow!("Unexpected value for '{}': {}", field, other)),
                None => Err(anyhow!("Missing field '{}' in conversion response", field)),
            }
        }
    }
}

/// Fetches the coin conversion price from one of the configured providers.
pub struct HttpConversionProvider {
    client: Client,
    providers: Vec<ConversionProviderConfig>,
}

impl HttpConversionProvider {
    pub fn new(client: Client, providers: Vec<ConversionProviderConfig>) -> Self {
        Self { client, providers }
    }

    /// Provider for `selector`; unknown selectors use the first provider.
    pub fn provider(&self, selector: usize) -> Option<&ConversionProviderConfig> {
        self.providers.get(selector).or_else(|| self.providers.first())
    }

    async fn try_fetch(&self, provider: &ConversionProviderConfig) -> Result<ConversionFactor> {
        let body = fetch_text(&self.client, &provider.url).await?;
        parse_conversion(&body, &provider.format)
            .with_context(|| format!("Invalid conversion response from {}", provider.name))
    }
}

#[async_trait]
impl ConversionProvider for HttpConversionProvider {
    fn source(&self, selector: usize) -> String {
        self.provider(selector)
            .map(|provider| provider.source.clone())
            .unwrap_or_default()
    }

    #[instrument(name = "ConversionFetch", skip(self))]
    async fn fetch_conversion(&self, selector: usize) -> Option<ConversionFactor> {
        let Some(provider) = self.provider(selector) else {
            debug!("No conversion providers configured");
            return None;
        };

        match self.try_fetch(provider).await {
            Ok(factor) => {
                debug!(provider = %provider.name, factor = factor.value(), "Fetched conversion factor");
                Some(factor)
            }
            Err(e) => {
                debug!(provider = %provider.name, error = %e, "Couldn't get the current conversion rate");
                None
            }
        }
    }
}
