pub mod admin;
pub mod handlers;
pub mod middleware;
pub mod race;
pub mod routes;
pub mod telemetry;
pub mod ws;

pub use routes::create_router;
pub use ws::{forward_overlay, WsBroadcaster, WsMessage};
