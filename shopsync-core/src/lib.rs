//! # Shopsync Core
//!
//! Core library for the Shopsync service. Sellers delegate marketplace API
//! access to this system; the platform-issued access/refresh token pair per
//! shop must stay valid without seller intervention, and a fixed set of
//! periodic business jobs must run on a cadence without blocking each other.
//!
//! The crate provides:
//!
//! - **Request signing**: HMAC-SHA-256 signatures proving possession of the
//!   partner secret ([`signing`])
//! - **Platform client**: the signed token-exchange call to the external
//!   marketplace ([`platform`])
//! - **Credential store**: trait-based persistence port with a PostgreSQL
//!   implementation ([`credentials`])
//! - **Refresh orchestration**: windowed candidate selection, paced
//!   sequential renewal, per-shop failure isolation ([`refresh`])
//! - **Job dispatch**: ordered downstream job invocations with independent
//!   outcome capture ([`dispatch`])
//! - **Run aggregation**: the merged, JSON-serializable run summary ([`run`])

pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod platform;
pub mod refresh;
pub mod run;
pub mod signing;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
