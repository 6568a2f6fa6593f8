//! Dashboard HTTP surface: middleware, monitoring routes and server.

pub mod middleware;
mod routes;
mod server;
mod state;

pub use routes::router;
pub use server::DashboardServer;
pub use state::AppState;
