//! The external boundary: HTTP adapter over the core operations.

pub mod http;

pub use http::{routes, ApiError};
