//! Counting in-memory providers shared by the engine tests

use crate::core::preferences::Preferences;
use crate::core::provider::{ConversionProvider, FiatRateProvider};
use crate::core::rate::{ConversionFactor, RateTable};
use crate::providers::fiat::parse_fiat_rates;
use crate::store::memory::MemoryCollection;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn memory_preferences() -> Preferences {
    Preferences::new(Arc::new(MemoryCollection::new()))
}

#[derive(Clone)]
pub struct MockConversion {
    calls: Arc<AtomicUsize>,
    factor: Arc<Mutex<Option<f64>>>,
    delay: Option<Duration>,
}

impl MockConversion {
    pub fn returning(factor: Option<f64>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            factor: Arc::new(Mutex::new(factor)),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, factor: Option<f64>) {
        *self.factor.lock().unwrap() = factor;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversionProvider for MockConversion {
    fn source(&self, selector: usize) -> String {
        format!("provider-{selector}")
    }

    async fn fetch_conversion(&self, _selector: usize) -> Option<ConversionFactor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let factor = *self.factor.lock().unwrap();
        factor.and_then(ConversionFactor::new)
    }
}

/// Serves a fixed ticker body read with the `last` field, or fails when unset.
#[derive(Clone)]
pub struct MockFiat {
    name: String,
    calls: Arc<AtomicUsize>,
    body: Arc<Mutex<Option<String>>>,
}

impl MockFiat {
    pub fn new(name: &str, body: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            body: Arc::new(Mutex::new(body.map(str::to_string))),
        }
    }

    pub fn set(&self, body: Option<&str>) {
        *self.body.lock().unwrap() = body.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FiatRateProvider for MockFiat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, conversion: ConversionFactor) -> Option<RateTable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.body.lock().unwrap().clone()?;
        parse_fiat_rates(&body, conversion, &["last".to_string()], &self.name).ok()
    }
}
