pub mod conversion;
pub mod fiat;
pub mod util;

pub use conversion::HttpConversionProvider;
pub use fiat::HttpFiatRateProvider;
