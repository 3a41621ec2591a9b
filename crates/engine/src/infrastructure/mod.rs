//! Infrastructure - everything that touches the outside world.

pub mod gate;
pub mod history;
pub mod ollama;
pub mod persistence;
pub mod ports;
pub mod resilient_llm;
