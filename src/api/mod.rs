//! API module - HTTP routes, handlers, models, and the speech WebSocket

pub mod handlers;
pub mod models;
pub mod routes;
pub mod stt_ws;
