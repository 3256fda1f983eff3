/// HTTP API for the camera gateway
///
/// Exposes device commands and discovery as JSON endpoints

pub mod routes;
pub mod server;
pub mod types;

pub use routes::{create_router, AppState};
pub use server::GatewayServer;
pub use types::*;
