//! Client-side transports.

pub mod http;
pub mod sse;

pub use http::StreamableHttpTransport;
pub use sse::{ReconnectConfig, SseEvent, SseParser};
