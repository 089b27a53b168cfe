pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::ui;
use crate::core::config::AppConfig;
use crate::core::locale::CurrencyResolver;
use crate::core::preferences::Preferences;
use crate::core::provider::FiatRateProvider;
use crate::core::query::{RateQueryService, Selection};
use crate::core::{RateAggregator, RateCache};
use crate::providers::util::build_client;
use crate::providers::{HttpConversionProvider, HttpFiatRateProvider};
use crate::store::KeyValueStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PREFERENCES_COLLECTION: &str = "preferences";

pub enum AppCommand {
    Rates { json: bool },
    Rate { code: Option<String> },
    Refresh,
    SelectProvider(usize),
    SelectCurrency(String),
}

/// Opens the persistent store, degrading to memory when it can't be opened.
pub fn open_store(config: &AppConfig) -> KeyValueStore {
    let path = match config.default_data_path() {
        Ok(path) => path.join("store"),
        Err(e) => {
            warn!(error = %e, "No data directory, preferences won't be persisted");
            return KeyValueStore::in_memory();
        }
    };

    match KeyValueStore::open(&path) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to open store, using memory");
            KeyValueStore::in_memory()
        }
    }
}

/// Wires the configured providers into a query service.
pub fn build_service(config: &AppConfig, preferences: Preferences) -> Result<RateQueryService> {
    let client = build_client(&config.user_agent, config.http_timeout())?;

    let conversion =
        HttpConversionProvider::new(client.clone(), config.conversion_providers.clone());
    let fiat_providers = config
        .fiat_providers
        .iter()
        .cloned()
        .map(|provider| {
            Box::new(HttpFiatRateProvider::new(client.clone(), provider))
                as Box<dyn FiatRateProvider>
        })
        .collect();

    let resolver = CurrencyResolver::from_environment(
        config.locale_currency.as_deref(),
        &config.default_currency,
    );
    debug!(
        locale = ?resolver.locale(),
        default = resolver.default_code(),
        "Resolved currency fallbacks"
    );

    let aggregator = RateAggregator::new(
        Arc::new(RateCache::new(config.refresh_interval()?)),
        preferences.clone(),
        resolver,
        Box::new(conversion),
        fiat_providers,
    )
    .with_synthetic_currency(&config.synthetic_currency);

    Ok(RateQueryService::new(aggregator, preferences))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = open_store(&config);
    debug!(persistent = store.is_persistent(), "Opened preferences store");
    let preferences = Preferences::new(store.collection(PREFERENCES_COLLECTION)?);

    match command {
        AppCommand::SelectProvider(index) => {
            if index >= config.conversion_providers.len() {
                anyhow::bail!(
                    "Provider index {index} out of range, {} configured",
                    config.conversion_providers.len()
                );
            }
            preferences.set_conversion_provider(index).await?;
            preferences.request_force_refresh().await?;
            info!(index, "Selected conversion provider");
            println!(
                "Using {}",
                ui::style_text(
                    &config.conversion_providers[index].name,
                    ui::StyleType::Highlight
                )
            );
            Ok(())
        }
        AppCommand::SelectCurrency(code) => {
            let code = code.trim().to_uppercase();
            preferences.set_exchange_currency_code(&code).await?;
            info!(code = %code, "Selected exchange currency");
            println!(
                "Preferred currency set to {}",
                ui::style_text(&code, ui::StyleType::Highlight)
            );
            Ok(())
        }
        AppCommand::Rates { json } => {
            let service = build_service(&config, preferences.clone())?;
            service.prewarm().await;
            let preferred = preferences.exchange_currency_code().await;
            cli::rates::run(&service, &Selection::All, preferred.as_deref(), json).await
        }
        AppCommand::Rate { code } => {
            let service = build_service(&config, preferences.clone())?;
            service.prewarm().await;
            let code = match code {
                Some(code) => code.trim().to_uppercase(),
                None => match preferences.exchange_currency_code().await {
                    Some(code) => code,
                    None => config.default_currency.clone(),
                },
            };
            let selection = Selection::CurrencyCode(code.clone());
            cli::rates::run(&service, &selection, Some(&code), false).await
        }
        AppCommand::Refresh => {
            preferences.request_force_refresh().await?;
            let service = build_service(&config, preferences.clone())?;
            service.prewarm().await;
            let preferred = preferences.exchange_currency_code().await;
            cli::rates::run(&service, &Selection::All, preferred.as_deref(), false).await
        }
    }
}
