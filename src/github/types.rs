//! Wire types for the GitHub REST v3 API, limited to what the agent uses.

use serde::{Deserialize, Serialize};

/// Repository metadata. Only the default branch matters to the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub default_branch: String,
}

/// One entry in a directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// A directory entry with recursively fetched children.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub children: Vec<TreeNode>,
}

/// File content response from the contents API.
#[derive(Debug, Deserialize)]
pub struct ContentFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
    pub encoding: Option<String>,
}

/// `GET /git/ref/heads/{branch}` response.
#[derive(Debug, Deserialize)]
pub struct GitRef {
    pub object: GitRefObject,
}

#[derive(Debug, Deserialize)]
pub struct GitRefObject {
    pub sha: String,
}

/// `GET /git/commits/{sha}` response.
#[derive(Debug, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    pub tree: GitObjectRef,
}

#[derive(Debug, Deserialize)]
pub struct GitObjectRef {
    pub sha: String,
}

/// A single entry in a `POST /git/trees` request. A `None` sha tombstones
/// the path, which is how the git-data API expresses deletion.
#[derive(Debug, Serialize)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sha: Option<String>,
}

impl NewTreeEntry {
    pub fn blob(path: impl Into<String>, sha: String) -> Self {
        Self {
            path: path.into(),
            mode: "100644",
            kind: "blob",
            sha: Some(sha),
        }
    }

    pub fn tombstone(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644",
            kind: "blob",
            sha: None,
        }
    }
}

/// Responses from object-creation endpoints; all we need back is the sha.
#[derive(Debug, Deserialize)]
pub struct CreatedObject {
    pub sha: String,
}

/// `POST /pulls` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Code search response.
#[derive(Debug, Deserialize)]
pub struct SearchResults {
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub struct SearchItem {
    pub path: String,
}
