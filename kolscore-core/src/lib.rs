//! KolScore Core: domain types, price acquisition, forward returns.
//!
//! This crate holds everything that touches market data:
//! - Domain types (prediction events, scored events, price series, horizons)
//! - On-disk price cache with TTL, integrity hashing and quarantine
//! - Retrying fetcher over an abstract upstream price source
//! - Batch acquisition with bulk/per-ticker paths and pacing
//! - Yahoo Finance upstream adapter behind a circuit breaker
//! - Forward-return and entry-price calculation

pub mod data;
pub mod domain;
pub mod returns;

pub use returns::{compute_returns, resolve_entry_price};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared types are Send + Sync, so a fetcher or a
    /// scored batch can be handed to a worker thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::PredictionEvent>();
        require_sync::<domain::PredictionEvent>();
        require_send::<domain::ScoredEvent>();
        require_sync::<domain::ScoredEvent>();
        require_send::<domain::PriceSeries>();
        require_sync::<domain::PriceSeries>();
        require_send::<domain::DateRange>();
        require_sync::<domain::DateRange>();
        require_send::<domain::HorizonReturns>();
        require_sync::<domain::HorizonReturns>();

        // Acquisition layer
        require_send::<data::PriceCache>();
        require_sync::<data::PriceCache>();
        require_send::<data::ResilientFetcher>();
        require_sync::<data::ResilientFetcher>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::YahooSource>();
        require_sync::<data::YahooSource>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::BatchOptions>();
        require_sync::<data::BatchOptions>();
    }

    /// The upstream trait stays object-safe: the fetcher holds it as
    /// `Arc<dyn UpstreamPriceSource>`.
    #[test]
    fn upstream_trait_is_object_safe() {
        fn _check(source: &dyn data::UpstreamPriceSource) -> data::Capabilities {
            source.capabilities()
        }
    }
}
