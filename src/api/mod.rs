//! HTTP API module: gated status, container and deploy streams, the current
//! user endpoint, the embedded frontend and health.

pub mod assets;
pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
