//! Exchange rate types and smallest-unit arithmetic

use anyhow::{Context, Result, anyhow, bail};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Number of decimal places in one whole unit (satoshi-like scale).
pub const UNIT_SCALE: u32 = 8;

const UNIT: u128 = 10u128.pow(UNIT_SCALE);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency_code: String,
    /// Smallest native units equal to one unit of `currency_code`.
    pub rate: u128,
    pub source: String,
}

impl ExchangeRate {
    pub fn new(currency_code: &str, rate: u128, source: &str) -> Self {
        ExchangeRate {
            currency_code: currency_code.to_string(),
            rate,
            source: source.to_string(),
        }
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ExchangeRate[{}:{}]",
            self.currency_code,
            format_units(self.rate)
        )
    }
}

/// Formats a smallest-unit amount as whole units with full precision.
pub fn format_units(amount: u128) -> String {
    format!("{}.{:08}", amount / UNIT, amount % UNIT)
}

/// Price of one native unit in the reference asset. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ConversionFactor(f64);

impl ConversionFactor {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(ConversionFactor(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Price of one native unit in milli reference units, rounded to 5 places.
    pub fn milli_units(&self) -> String {
        format!("{:.5}", self.0 * 1000.0)
    }
}

impl FromStr for ConversionFactor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .with_context(|| format!("Invalid conversion factor: '{s}'"))?;
        ConversionFactor::new(value)
            .ok_or_else(|| anyhow!("Conversion factor must be positive: {}", value))
    }
}

/// Converts a decimal amount into smallest units.
///
/// The conversion is exact: amounts with more than [`UNIT_SCALE`] fractional
/// digits are rejected instead of rounded, as are negative amounts.
pub fn to_smallest_units(amount: &str) -> Result<Decimal> {
    let trimmed = amount.trim();
    let value = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .with_context(|| format!("Invalid amount: '{amount}'"))?;

    if value.is_sign_negative() && !value.is_zero() {
        bail!("Negative amount: {}", amount);
    }

    let units = value
        .checked_mul(Decimal::from(UNIT as u64))
        .ok_or_else(|| anyhow!("Amount out of range: {}", amount))?;

    if !units.fract().is_zero() {
        bail!("Amount has more than {} decimals: {}", UNIT_SCALE, amount);
    }
    Ok(units.normalize())
}

/// Scales a reference-asset amount in smallest units by the conversion factor.
///
/// Returns `None` when the result truncates to zero or cannot be represented.
pub fn convert_to_native(units: Decimal, factor: ConversionFactor) -> Option<u128> {
    let factor = Decimal::from_f64(factor.value())?;
    let native = units.checked_mul(factor)?.trunc();
    if native.is_sign_positive() && !native.is_zero() {
        native.to_u128()
    } else {
        None
    }
}

/// Rates keyed by currency code, iterated in code order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateTable {
    rates: BTreeMap<String, ExchangeRate>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rate, replacing any previous rate for the same code.
    /// Non-positive rates are never stored.
    pub fn insert(&mut self, rate: ExchangeRate) -> bool {
        if rate.rate == 0 {
            return false;
        }
        self.rates.insert(rate.currency_code.clone(), rate);
        true
    }

    pub fn get(&self, currency_code: &str) -> Option<&ExchangeRate> {
        self.rates.get(currency_code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExchangeRate> {
        self.rates.values()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Resolves the first of `requested`, `locale` and `default` present in the table.
    pub fn best_rate(
        &self,
        requested: Option<&str>,
        locale: Option<&str>,
        default: &str,
    ) -> Option<&ExchangeRate> {
        requested
            .and_then(|code| self.get(code))
            .or_else(|| locale.and_then(|code| self.get(code)))
            .or_else(|| self.get(default))
    }
}

impl FromIterator<ExchangeRate> for RateTable {
    fn from_iter<I: IntoIterator<Item = ExchangeRate>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for rate in iter {
            table.insert(rate);
        }
        table
    }
}
