//! tether-core: Core abstractions and configuration for Tether
//!
//! This crate provides the shared types, the correlation store contract
//! and the configuration structures used by the server daemon and its
//! agent-facing and operator-facing endpoints.

pub mod api;
pub mod config;
pub mod error;
pub mod exchange;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{DispatchError, ExchangeError, TetherError};
pub use exchange::{AbortReason, Exchange, ExchangeId, Resolution};
pub use types::{AgentInfo, ConnectionStatus, SessionId};
