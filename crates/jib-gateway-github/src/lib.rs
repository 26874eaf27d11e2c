//! GitHub credential custody and subprocess wrapping for the jib gateway.
//!
//! The gateway never hands tokens to agent containers. This crate owns the
//! tokens ([`TokenStore`]), runs `gh` with them injected through the child
//! environment ([`GitHubClient`]), and runs `git` with them injected through
//! an ephemeral credential helper ([`CredentialHelper`]) that is removed on
//! every exit path.

pub mod client;
pub mod credential;
pub mod executor;
pub mod git;
pub mod token;

pub use client::{Author, GhClientError, GitHubClient, IncognitoError, PrInfo};
pub use credential::CredentialHelper;
pub use executor::{ExecOutcome, GhExecutor, RealGhExecutor};
pub use git::{git_args, run_git, run_git_with_credentials};
pub use token::{TokenError, TokenStore};
