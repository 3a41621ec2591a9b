//! TrailWeaver Engine - backend for route recommendations, themed route
//! stories, completion souvenirs, and achievements.
//!
//! Layering:
//! - `infrastructure` talks to the outside world (SQLite, Ollama, disk
//!   artifacts) behind port traits.
//! - `use_cases` holds the product logic, built only on ports.
//! - `api` adapts the core operations to HTTP.
//! - `app` wires everything together.

pub mod api;
pub mod app;
pub mod config;
pub mod infrastructure;
pub mod use_cases;
