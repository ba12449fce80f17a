//! tether-server: control-plane daemon for remote agents
//!
//! Operators issue a command to an agent session and wait for its result;
//! agents poll for work and post results on their own schedule. The
//! correlation store, session registry and dispatch service connect the two.

pub mod dispatch;
pub mod exchange;
pub mod http;
pub mod session;
pub mod state;

pub use dispatch::DispatchService;
pub use exchange::InMemoryExchangeStore;
pub use session::SessionRegistry;
pub use state::ServerState;
