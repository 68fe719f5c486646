//! The HTTP/duplex gateway: axum router, middleware, and state wiring.
//! Feature-gated behind `server` since everything else in this crate is
//! usable as a library without pulling in an HTTP stack.

pub mod middleware;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
