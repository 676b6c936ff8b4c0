//! Sauti Server - HTTP API for the Sauti speech core

pub mod api;
pub mod error;
pub mod state;

pub use api::create_router;
pub use state::AppState;
