//! # Shopsync Server
//!
//! HTTP service wrapping the Shopsync core. A periodic external scheduler
//! hits one endpoint; each invocation renews shop credentials nearing expiry
//! and then dispatches the downstream job cadence, returning a structured
//! summary of everything that happened.

pub mod config;
pub mod errors;
pub mod routes;
pub mod state;

pub use state::AppState;
