//! REST API Data Transfer Objects

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Requests resolved since startup
    pub requests_served: u64,
    /// Requests that ended with a non-200 code
    pub requests_failed: u64,
}
