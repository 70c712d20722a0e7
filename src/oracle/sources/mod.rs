//! Observation source implementations (Binance REST ticker, local synthetic walk)

mod binance;
mod synthetic;

pub use binance::{BinanceTickerSource, BINANCE_REST_URL};
pub use synthetic::SyntheticSource;
