//! Murmur API crate - axum server hosting the websocket session endpoint
//! and a status route over the session manager.

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
