//! Command/response correlation store

mod store;

pub use store::InMemoryExchangeStore;
