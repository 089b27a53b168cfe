//! Currency resolution from the process locale

use crate::core::rate::{ExchangeRate, RateTable};
use std::env;
use tracing::debug;

/// Global fallback currency when neither the request nor the locale resolve.
pub const DEFAULT_EXCHANGE_CURRENCY: &str = "USD";

const EURO_REGIONS: &[&str] = &[
    "AT", "BE", "CY", "DE", "EE", "ES", "FI", "FR", "GR", "HR", "IE", "IT", "LT", "LU", "LV",
    "MT", "NL", "PT", "SI", "SK",
];

fn region_currency(region: &str) -> Option<&'static str> {
    if EURO_REGIONS.contains(&region) {
        return Some("EUR");
    }
    let code = match region {
        "US" | "EC" | "SV" | "PR" => "USD",
        "GB" => "GBP",
        "CA" => "CAD",
        "AU" => "AUD",
        "NZ" => "NZD",
        "JP" => "JPY",
        "CN" => "CNY",
        "HK" => "HKD",
        "TW" => "TWD",
        "KR" => "KRW",
        "SG" => "SGD",
        "IN" => "INR",
        "ID" => "IDR",
        "MY" => "MYR",
        "TH" => "THB",
        "PH" => "PHP",
        "CH" | "LI" => "CHF",
        "SE" => "SEK",
        "NO" => "NOK",
        "DK" => "DKK",
        "PL" => "PLN",
        "CZ" => "CZK",
        "HU" => "HUF",
        "RO" => "RON",
        "BG" => "BGN",
        "RU" => "RUB",
        "UA" => "UAH",
        "TR" => "TRY",
        "IL" => "ILS",
        "ZA" => "ZAR",
        "BR" => "BRL",
        "MX" => "MXN",
        "AR" => "ARS",
        "CL" => "CLP",
        "CO" => "COP",
        _ => return None,
    };
    Some(code)
}

/// Maps a POSIX locale string such as `de_DE.UTF-8@euro` to its currency code.
pub fn currency_for_locale(locale: &str) -> Option<&'static str> {
    let name = locale.split(['.', '@']).next()?;
    let (_language, region) = name.split_once(['_', '-'])?;
    region_currency(&region.to_ascii_uppercase())
}

/// Currency of the process locale, looked up the way libc resolves `LC_MONETARY`.
pub fn locale_currency_code() -> Option<String> {
    let locale = ["LC_ALL", "LC_MONETARY", "LANG"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find(|value| !value.is_empty())?;
    let code = currency_for_locale(&locale);
    debug!(locale = %locale, currency = ?code, "Resolved locale currency");
    code.map(str::to_string)
}

/// Resolves a requested currency against a rate table with locale and global fallbacks.
#[derive(Debug, Clone)]
pub struct CurrencyResolver {
    locale: Option<String>,
    default: String,
}

impl CurrencyResolver {
    pub fn new(locale: Option<String>, default: &str) -> Self {
        CurrencyResolver {
            locale,
            default: default.to_string(),
        }
    }

    /// Uses `locale_override` when given, otherwise the process locale.
    pub fn from_environment(locale_override: Option<&str>, default: &str) -> Self {
        let locale = locale_override
            .map(str::to_string)
            .or_else(locale_currency_code);
        Self::new(locale, default)
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn default_code(&self) -> &str {
        &self.default
    }

    pub fn resolve<'a>(
        &self,
        table: &'a RateTable,
        requested: Option<&str>,
    ) -> Option<&'a ExchangeRate> {
        table.best_rate(requested, self.locale(), &self.default)
    }
}

impl Default for CurrencyResolver {
    fn default() -> Self {
        Self::new(None, DEFAULT_EXCHANGE_CURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_for_locale() {
        assert_eq!(currency_for_locale("en_US.UTF-8"), Some("USD"));
        assert_eq!(currency_for_locale("de_DE.UTF-8@euro"), Some("EUR"));
        assert_eq!(currency_for_locale("en_GB"), Some("GBP"));
        assert_eq!(currency_for_locale("pt-br"), Some("BRL"));
        assert_eq!(currency_for_locale("ja_JP.eucJP"), Some("JPY"));
        assert_eq!(currency_for_locale("C"), None);
        assert_eq!(currency_for_locale("POSIX"), None);
        assert_eq!(currency_for_locale("xx_ZZ.UTF-8"), None);
    }

    #[test]
    fn test_resolver_fallback_order() {
        let table: RateTable = vec![
            ExchangeRate::new("USD", 1, "a"),
            ExchangeRate::new("EUR", 2, "a"),
            ExchangeRate::new("GBP", 3, "a"),
        ]
        .into_iter()
        .collect();

        let resolver = CurrencyResolver::new(Some("EUR".to_string()), "USD");
        assert_eq!(
            resolver.resolve(&table, Some("GBP")).unwrap().currency_code,
            "GBP"
        );
        assert_eq!(
            resolver.resolve(&table, Some("XYZ")).unwrap().currency_code,
            "EUR"
        );

        let resolver = CurrencyResolver::new(Some("JPY".to_string()), "USD");
        assert_eq!(
            resolver.resolve(&table, Some("XYZ")).unwrap().currency_code,
            "USD"
        );
    }

    #[test]
    fn test_resolver_override() {
        let resolver = CurrencyResolver::from_environment(Some("CHF"), "USD");
        assert_eq!(resolver.locale(), Some("CHF"));
        assert_eq!(resolver.default_code(), "USD");
    }
}
