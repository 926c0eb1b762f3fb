//! API Module
//!
//! HTTP API for status queries and operator commands.

mod http;

pub use http::{HttpServer, AppState};
