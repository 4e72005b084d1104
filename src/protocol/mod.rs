//! `apiquery` Protocol
//!
//! HTTP transport around the resolution engine.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                     apiquery Protocol                       |
//! +-------------------------------------------------------------+
//! |  HTTP Endpoints:                                            |
//! |    - POST /get: resolve a JSON object of queries            |
//! |    - GET /health: health check and counters                 |
//! +-------------------------------------------------------------+
//! |  Wire Format: JSON                                          |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `error` - Transport error types
//! - `handler` - Handler shared by all requests
//! - `rest` - HTTP handlers and routing

pub mod error;
pub mod handler;
pub mod rest;

pub use error::RequestError;
pub use handler::Handler;

/// Default HTTP server port
pub const DEFAULT_PORT: u16 = 8080;
