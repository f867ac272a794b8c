//! HTTP API handlers for pictor-an

pub mod annotate;
pub mod health;
pub mod sse;
pub mod status;

pub use annotate::annotate_routes;
pub use health::health_routes;
pub use sse::event_stream;
pub use status::status_routes;
