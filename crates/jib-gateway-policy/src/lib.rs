//! Ownership policy for git/gh operations.
//!
//! The engine answers "may this identity push to that branch / touch that PR"
//! from live GitHub state, read through bounded caches so a burst of agent
//! requests does not turn into a burst of API calls. Enforcement here is
//! defence in depth: GitHub applies its own permissions on top.

pub mod cache;
pub mod engine;

pub use cache::BoundedCache;
pub use engine::{PolicyDecision, PolicyEngine};
