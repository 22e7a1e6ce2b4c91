//! Read-through access to the append-only market data store.
//!
//! The ingestion pipelines populate prices, indicators, recommendations and
//! news out of band; the coordinator only ever reads them.

pub mod store;

pub use store::MarketStore;
