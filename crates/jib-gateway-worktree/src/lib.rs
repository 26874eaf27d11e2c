//! Git worktree lifecycle management for container isolation.
//!
//! Each agent container gets its own worktree per repository: an isolated
//! working directory and index on a container-specific branch, sharing the
//! object store with the main repo. The gateway creates worktrees before a
//! container starts and sweeps them away when the container is gone.

pub mod manager;

pub use manager::{
    ContainerWorktrees, WorktreeError, WorktreeInfo, WorktreeListing, WorktreeManager,
    WorktreeRemoval, active_docker_containers,
};
