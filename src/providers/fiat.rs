use super::util::{fetch_text, host_of};
use crate::core::config::FiatProviderConfig;
use crate::core::provider::FiatRateProvider;
use crate::core::rate::{
    ConversionFactor, ExchangeRate, RateTable, convert_to_native, to_smallest_units,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Reserved top-level key that is not a currency.
const TIMESTAMP_KEY: &str = "timestamp";

fn field_amount(entry: &Value, field: &str) -> Option<String> {
    match entry.get(field)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Parses a ticker body keyed by currency code into native-unit rates.
///
/// Fields are tried in order per currency; the first yielding a positive
/// rate wins. Bad entries are skipped without affecting their siblings.
pub fn parse_fiat_rates(
    body: &str,
    conversion: ConversionFactor,
    fields: &[String],
    source: &str,
) -> Result<RateTable> {
    let json: Value =
        serde_json::from_str(body).context("Failed to parse fiat rates response")?;
    let entries = json
        .as_object()
        .ok_or_else(|| anyhow!("Fiat rates response is not a JSON object"))?;

    let mut rates = RateTable::new();
    for (currency_code, entry) in entries {
        if currency_code == TIMESTAMP_KEY {
            continue;
        }
        if !entry.is_object() {
            warn!(currency = %currency_code, "Skipping malformed exchange rate entry");
            continue;
        }

        for field in fields {
            let Some(amount) = field_amount(entry, field) else {
                continue;
            };

            let units = match to_smallest_units(&amount) {
                Ok(units) => units,
                Err(e) => {
                    warn!(
                        currency = %currency_code,
                        field = %field,
                        "problem parsing exchange rate from {}: {}", source, e
                    );
                    continue;
                }
            };

            match convert_to_native(units, conversion) {
                Some(rate) => {
                    rates.insert(ExchangeRate::new(currency_code, rate, source));
                    break;
                }
                None => warn!(
                    currency = %currency_code,
                    field = %field,
                    amount = %amount,
                    "Dropping non-positive or out-of-range exchange rate"
                ),
            }
        }
    }
    Ok(rates)
}

/// Fetches reference → fiat rates from a single ticker endpoint.
pub struct HttpFiatRateProvider {
    client: Client,
    config: FiatProviderConfig,
}

impl HttpFiatRateProvider {
    pub fn new(client: Client, config: FiatProviderConfig) -> Self {
        Self { client, config }
    }

    async fn try_fetch(&self, conversion: ConversionFactor) -> Result<RateTable> {
        let body = fetch_text(&self.client, &self.config.url).await?;
        parse_fiat_rates(
            &body,
            conversion,
            &self.config.fields,
            &host_of(&self.config.url),
        )
    }
}

#[async_trait]
impl FiatRateProvider for HttpFiatRateProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(
        name = "FiatRatesFetch",
        skip(self, conversion),
        fields(provider = %self.config.name)
    )]
    async fn fetch_rates(&self, conversion: ConversionFactor) -> Option<RateTable> {
        let start = Instant::now();
        match self.try_fetch(conversion).await {
            Ok(rates) => {
                info!(
                    "fetched exchange rates from {}, took {} ms",
                    self.config.url,
                    start.elapsed().as_millis()
                );
                debug!(entries = rates.len(), "Parsed fiat rates");
                Some(rates)
            }
            Err(e) => {
                warn!(error = %e, "problem fetching exchange rates from {}", self.config.url);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::util::build_client;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn half() -> ConversionFactor {
        ConversionFactor::new(0.5).unwrap()
    }

    #[test]
    fn test_parse_scales_by_conversion() {
        let body = r#"{"USD": {"last": "2.00"}}"#;
        let rates = parse_fiat_rates(body, half(), &fields(&["last"]), "example.com").unwrap();

        let usd = rates.get("USD").unwrap();
        assert_eq!(usd.rate, 100_000_000);
        assert_eq!(usd.source, "example.com");
    }

    #[test]
    fn test_parse_field_priority() {
        let body = r#"{
            "USD": {"24h_avg": "4.00", "last": "2.00"},
            "EUR": {"last": "3.00"},
            "GBP": {"24h_avg": "0", "last": "1.00"}
        }"#;
        let rates =
            parse_fiat_rates(body, half(), &fields(&["24h_avg", "last"]), "example.com").unwrap();

        assert_eq!(rates.get("USD").unwrap().rate, 200_000_000);
        assert_eq!(rates.get("EUR").unwrap().rate, 150_000_000);
        // A zero rate falls through to the next field
        assert_eq!(rates.get("GBP").unwrap().rate, 50_000_000);
    }

    #[test]
    fn test_parse_skips_bad_entries() {
        let body = r#"{
            "timestamp": "Sat, 01 Mar 2014 12:00:00 -0000",
            "USD": {"15m": 478.68, "symbol": "$"},
            "EUR": {"15m": "n/a"},
            "JPY": {"15m": "-1"},
            "CHF": {"15m": "0.000000001"},
            "XAU": "not an object",
            "NOK": {"other": "1.0"},
            "ZAR": {"15m": "0.00000001"}
        }"#;
        let rates = parse_fiat_rates(body, half(), &fields(&["15m"]), "blockchain.info").unwrap();

        assert_eq!(rates.len(), 1);
        assert_eq!(rates.get("USD").unwrap().rate, 23_934_000_000);
        assert!(rates.get("timestamp").is_none());
        assert!(rates.iter().all(|rate| rate.rate > 0));
    }

    #[test]
    fn test_parse_drops_out_of_range_rate() {
        let body = r#"{
            "VND": {"last": "1000000000000000"},
            "USD": {"last": "2.00"}
        }"#;
        let factor = ConversionFactor::new(1_000_000.0).unwrap();
        let rates = parse_fiat_rates(body, factor, &fields(&["last"]), "example.com").unwrap();

        assert!(rates.get("VND").is_none());
        assert_eq!(rates.get("USD").unwrap().rate, 200_000_000_000_000);
    }

    #[test]
    fn test_parse_rejects_non_object_body() {
        assert!(parse_fiat_rates("[]", half(), &fields(&["last"]), "x").is_err());
        assert!(parse_fiat_rates("<html>", half(), &fields(&["last"]), "x").is_err());
    }

    async fn provider_for(mock_server: &MockServer, field_names: &[&str]) -> HttpFiatRateProvider {
        let client = build_client("leafrates-test", Duration::from_secs(5)).unwrap();
        HttpFiatRateProvider::new(
            client,
            FiatProviderConfig {
                name: "test".to_string(),
                url: format!("{}/ticker", mock_server.uri()),
                fields: fields(field_names),
            },
        )
    }

    #[tokio::test]
    async fn test_fetch_rates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ticker"))
            .and(header("user-agent", "leafrates-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"USD": {"last": "2.00"}, "timestamp": 1}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server, &["last"]).await;
        let rates = provider.fetch_rates(half()).await.unwrap();

        assert_eq!(rates.len(), 1);
        let usd = rates.get("USD").unwrap();
        assert_eq!(usd.rate, 100_000_000);
        assert_eq!(usd.source, "127.0.0.1");
        assert_eq!(provider.name(), "test");
    }

    #[tokio::test]
    async fn test_fetch_rates_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ticker"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server, &["last"]).await;
        assert!(provider.fetch_rates(half()).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_rates_malformed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ticker"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"USD\": "))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server, &["last"]).await;
        assert!(provider.fetch_rates(half()).await.is_none());
    }
}
