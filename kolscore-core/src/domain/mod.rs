//! Domain types: predictions, price series, horizons.

pub mod horizon;
pub mod prediction;
pub mod series;

pub use horizon::{Horizon, HorizonReturns};
pub use prediction::{PredictionEvent, ScoredEvent, Sentiment};
pub use series::{DateRange, PricePoint, PriceSeries};
