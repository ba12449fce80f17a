//! Core trait definitions

mod store;

pub use store::ExchangeStore;
