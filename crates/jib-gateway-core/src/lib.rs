//! Core types and configuration for the jib gateway.
//!
//! This crate defines the `repositories.yaml` schema ([`RepoConfig`]), the
//! request-input validators the HTTP surface runs before any subprocess is
//! spawned, the bot identity sets, and shared error types.

pub mod config;
pub mod error;
pub mod identity;
pub mod validate;

pub use config::{AccessLevel, AuthMode, IncognitoConfig, RepoConfig, RepoSettings};
pub use error::{Error, Result};
pub use identity::{BotIdentities, BranchPrefixes, TrustedUsers};
pub use validate::{GitReadOp, ValidationError};
