//! REST API Handlers

pub mod admin;
pub mod query;
