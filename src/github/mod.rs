//! GitHub REST client — the remote repository hosting interface.
//!
//! Split the way the LLM module is: `types` holds the wire shapes, `client`
//! makes the calls. Nothing here knows about tasks or pipelines.

pub mod client;
pub mod types;

pub use client::{GitHubClient, GitHubError, MAX_STRUCTURE_DEPTH};
pub use types::{
    DirEntry, EntryKind, NewTreeEntry, PullRequest, Repository, TreeNode,
};
