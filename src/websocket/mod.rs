// WebSocket transport: routing and per-connection plumbing.

mod connection;
mod routes;

pub use routes::create_router;
