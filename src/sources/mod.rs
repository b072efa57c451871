pub mod float_lookup;
pub mod market_data;

pub use float_lookup::{CachedFloatLookup, FloatLookup, HttpFloatProvider};
pub use market_data::{HttpScannerSource, MarketDataSource, ReplaySource};
