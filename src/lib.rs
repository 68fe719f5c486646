//! Server-side backbone for the AI-mediated mock interview platform:
//! session state machine, anti-cheat event chain, token authority, AI
//! proxy, live event fan-out, and media upload.

pub mod aiproxy;
pub mod anticheat;
pub mod answer;
pub mod codeeval;
pub mod config;
pub mod error;
pub mod eventbus;
pub mod policy;
pub mod question;
pub mod retention;
pub mod session;
pub mod state_machine;
pub mod store;
pub mod summary;
pub mod tokens;
pub mod upload;

#[cfg(feature = "server")]
pub mod api;

pub use error::{AppError, Result};
pub use session::{Session, SessionConfig, SessionState};

#[cfg(feature = "server")]
pub use api::{ApiConfig, ApiServer};
