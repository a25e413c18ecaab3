//! HTTP client for the GitHub REST v3 API.
//!
//! Read paths serve the tools (contents, search); the git-data endpoints
//! (blobs, trees, commits, refs) exist for the commit transaction. Every
//! request carries an explicit timeout.

use std::time::Duration;

use base64::Engine;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    ContentFile, CreatedObject, DirEntry, EntryKind, GitCommit, GitRef, NewTreeEntry, PullRequest,
    Repository, SearchResults, TreeNode,
};
use crate::task::RepoId;

/// Directories never descended into when building a project structure.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".next",
    "dist",
    "build",
    ".vercel",
    "coverage",
    "target",
    "vendor",
];

/// Hard ceiling on structure recursion regardless of what the model asks for.
pub const MAX_STRUCTURE_DEPTH: usize = 5;

/// Errors from GitHub API operations.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

/// GitHub REST client scoped to a single token.
#[derive(Debug)]
pub struct GitHubClient {
    http: Client,
    token: String,
    base_url: String,
    timeout: Duration,
}

impl GitHubClient {
    /// Create a client against api.github.com.
    pub fn new(token: String, timeout: Duration) -> Self {
        Self::with_base_url(token, "https://api.github.com".into(), timeout)
    }

    /// Create a client with a custom base URL (for testing with mock servers).
    pub fn with_base_url(token: String, base_url: String, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            token,
            base_url,
            timeout,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .request(method, url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "repopilot")
    }

    /// Send a request, mapping non-success statuses to errors. 404 becomes
    /// `NotFound` carrying `what` so probes can distinguish it.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, GitHubError> {
        let response = builder.send().await?;
        let status = response.status().as_u16();

        if status == 404 {
            return Err(GitHubError::NotFound(what.to_string()));
        }
        if status >= 400 {
            let message = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(GitHubError::Status { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| GitHubError::Decode(format!("{what}: {e}")))
    }

    /// Repository metadata; yields the default branch.
    pub async fn repository(&self, repo: &RepoId) -> Result<Repository, GitHubError> {
        let path = format!("/repos/{}/{}", repo.owner, repo.name);
        self.send(self.request(Method::GET, &path), &repo.to_string())
            .await
    }

    /// One-level directory listing at `path` (empty string for the root).
    pub async fn list_directory(
        &self,
        repo: &RepoId,
        path: &str,
        branch: &str,
    ) -> Result<Vec<DirEntry>, GitHubError> {
        let url = format!(
            "/repos/{}/{}/contents/{}?ref={}",
            repo.owner, repo.name, path, branch
        );
        let value: serde_json::Value = self.send(self.request(Method::GET, &url), path).await?;

        // A file path returns an object instead of an array; treat it as an
        // empty listing the way the contents API consumer expects.
        match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)
                .map_err(|e| GitHubError::Decode(format!("directory listing: {e}"))),
            _ => Ok(Vec::new()),
        }
    }

    /// Recursive project structure, bounded by `max_depth` and the
    /// directory skip-list. Unreadable subdirectories yield empty children
    /// rather than failing the whole walk.
    pub async fn full_structure(
        &self,
        repo: &RepoId,
        branch: &str,
        max_depth: usize,
    ) -> Result<Vec<TreeNode>, GitHubError> {
        let depth_limit = max_depth.min(MAX_STRUCTURE_DEPTH);
        self.structure_at(repo, String::new(), branch, 0, depth_limit)
            .await
    }

    fn structure_at<'a>(
        &'a self,
        repo: &'a RepoId,
        path: String,
        branch: &'a str,
        depth: usize,
        max_depth: usize,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<TreeNode>, GitHubError>> + Send + 'a>,
    > {
        Box::pin(async move {
            if depth > max_depth {
                return Ok(Vec::new());
            }

            let entries = self.list_directory(repo, &path, branch).await?;
            let mut nodes = Vec::with_capacity(entries.len());

            for entry in entries {
                let mut node = TreeNode {
                    name: entry.name,
                    path: entry.path,
                    kind: entry.kind,
                    children: Vec::new(),
                };
                if node.kind == EntryKind::Dir && !SKIP_DIRS.contains(&node.name.as_str()) {
                    node.children = self
                        .structure_at(repo, node.path.clone(), branch, depth + 1, max_depth)
                        .await
                        .unwrap_or_default();
                }
                nodes.push(node);
            }

            Ok(nodes)
        })
    }

    /// File content at `path` on `branch`, base64-decoded.
    pub async fn file_content(
        &self,
        repo: &RepoId,
        path: &str,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let url = format!(
            "/repos/{}/{}/contents/{}?ref={}",
            repo.owner, repo.name, path, branch
        );
        let file: ContentFile = self.send(self.request(Method::GET, &url), path).await?;

        if file.kind != "file" {
            return Err(GitHubError::Decode(format!("{path} is not a file")));
        }

        let raw = file
            .content
            .ok_or_else(|| GitHubError::Decode(format!("{path}: no content field")))?;
        // The contents API wraps base64 at 60 columns.
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| GitHubError::Decode(format!("{path}: {e}")))?;
        String::from_utf8(bytes).map_err(|e| GitHubError::Decode(format!("{path}: {e}")))
    }

    /// The commit sha a branch ref points at.
    pub async fn branch_sha(&self, repo: &RepoId, branch: &str) -> Result<String, GitHubError> {
        let url = format!(
            "/repos/{}/{}/git/ref/heads/{}",
            repo.owner, repo.name, branch
        );
        let git_ref: GitRef = self
            .send(self.request(Method::GET, &url), &format!("branch {branch}"))
            .await?;
        Ok(git_ref.object.sha)
    }

    pub async fn branch_exists(&self, repo: &RepoId, branch: &str) -> Result<bool, GitHubError> {
        match self.branch_sha(repo, branch).await {
            Ok(_) => Ok(true),
            Err(GitHubError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create `branch` pointing at `sha`.
    pub async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let url = format!("/repos/{}/{}/git/refs", repo.owner, repo.name);
        let body = serde_json::json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": sha,
        });
        debug!(branch, sha, "creating branch");
        let _: serde_json::Value = self
            .send(self.request(Method::POST, &url).json(&body), branch)
            .await?;
        Ok(())
    }

    /// The tree sha of a commit object.
    pub async fn commit_tree_sha(
        &self,
        repo: &RepoId,
        commit_sha: &str,
    ) -> Result<String, GitHubError> {
        let url = format!(
            "/repos/{}/{}/git/commits/{}",
            repo.owner, repo.name, commit_sha
        );
        let commit: GitCommit = self
            .send(self.request(Method::GET, &url), commit_sha)
            .await?;
        Ok(commit.tree.sha)
    }

    /// Upload file content as a blob; returns the blob sha.
    pub async fn create_blob(&self, repo: &RepoId, content: &str) -> Result<String, GitHubError> {
        let url = format!("/repos/{}/{}/git/blobs", repo.owner, repo.name);
        let body = serde_json::json!({ "content": content, "encoding": "utf-8" });
        let created: CreatedObject = self
            .send(self.request(Method::POST, &url).json(&body), "blob")
            .await?;
        Ok(created.sha)
    }

    /// Create a tree on top of `base_tree`; returns the new tree sha.
    pub async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> Result<String, GitHubError> {
        let url = format!("/repos/{}/{}/git/trees", repo.owner, repo.name);
        let body = serde_json::json!({ "base_tree": base_tree, "tree": entries });
        let created: CreatedObject = self
            .send(self.request(Method::POST, &url).json(&body), "tree")
            .await?;
        Ok(created.sha)
    }

    /// Create a commit object; returns the commit sha.
    pub async fn create_commit(
        &self,
        repo: &RepoId,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String, GitHubError> {
        let url = format!("/repos/{}/{}/git/commits", repo.owner, repo.name);
        let body = serde_json::json!({ "message": message, "tree": tree, "parents": parents });
        let created: CreatedObject = self
            .send(self.request(Method::POST, &url).json(&body), "commit")
            .await?;
        Ok(created.sha)
    }

    /// Advance a branch ref to `sha`. Fast-forward only — the API rejects
    /// the update if the branch no longer points where the caller read it.
    pub async fn update_ref(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let url = format!(
            "/repos/{}/{}/git/refs/heads/{}",
            repo.owner, repo.name, branch
        );
        let body = serde_json::json!({ "sha": sha });
        let _: serde_json::Value = self
            .send(self.request(Method::PATCH, &url).json(&body), branch)
            .await?;
        Ok(())
    }

    /// Open a pull request; returns its url and number.
    pub async fn create_pull_request(
        &self,
        repo: &RepoId,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let payload = serde_json::json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
        });
        self.send(self.request(Method::POST, &url).json(&payload), "pull request")
            .await
    }

    /// Code search scoped to the repository; returns matching paths.
    pub async fn search_code(
        &self,
        repo: &RepoId,
        query: &str,
    ) -> Result<Vec<String>, GitHubError> {
        let q = format!(
            "{}+repo:{}/{}",
            urlencoding::encode(query),
            repo.owner,
            repo.name
        );
        let url = format!("/search/code?q={q}");
        let results: SearchResults = self.send(self.request(Method::GET, &url), "search").await?;
        Ok(results.items.into_iter().map(|i| i.path).collect())
    }

    /// Filename search scoped to the repository; returns matching paths.
    pub async fn search_filename(
        &self,
        repo: &RepoId,
        name: &str,
    ) -> Result<Vec<String>, GitHubError> {
        let q = format!(
            "filename:{}+repo:{}/{}",
            urlencoding::encode(name),
            repo.owner,
            repo.name
        );
        let url = format!("/search/code?q={q}");
        let results: SearchResults = self.send(self.request(Method::GET, &url), "search").await?;
        Ok(results.items.into_iter().map(|i| i.path).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepoId {
        RepoId::parse("acme/widgets").unwrap()
    }

    async fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::with_base_url("test-token".into(), server.uri(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn repository_yields_default_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "default_branch": "main"
            })))
            .mount(&server)
            .await;

        let info = client(&server).await.repository(&repo()).await.unwrap();
        assert_eq!(info.default_branch, "main");
    }

    #[tokio::test]
    async fn file_content_decodes_base64() {
        let server = MockServer::start().await;
        // "hello world\n" base64, wrapped the way the contents API wraps it
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/README.md"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "file",
                "encoding": "base64",
                "content": "aGVsbG8g\nd29ybGQK"
            })))
            .mount(&server)
            .await;

        let content = client(&server)
            .await
            .file_content(&repo(), "README.md", "main")
            .await
            .unwrap();
        assert_eq!(content, "hello world\n");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .file_content(&repo(), "nope.rs", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::NotFound(_)));
    }

    #[tokio::test]
    async fn branch_exists_false_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/ref/heads/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let exists = client(&server)
            .await
            .branch_exists(&repo(), "missing")
            .await
            .unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn create_branch_posts_ref() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/git/refs"))
            .and(body_partial_json(serde_json::json!({
                "ref": "refs/heads/agent/abc",
                "sha": "deadbeef"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "ref": "refs/heads/agent/abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .create_branch(&repo(), "agent/abc", "deadbeef")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_ref_conflict_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/acme/widgets/git/refs/heads/main"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("Update is not a fast forward"),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .update_ref(&repo(), "main", "cafebabe")
            .await
            .unwrap_err();
        match err {
            GitHubError::Status { status, .. } => assert_eq!(status, 422),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn structure_skips_build_dirs_and_respects_depth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "src", "path": "src", "type": "dir"},
                {"name": "node_modules", "path": "node_modules", "type": "dir"},
                {"name": "README.md", "path": "README.md", "type": "file"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/src"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "lib.rs", "path": "src/lib.rs", "type": "file"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let nodes = client(&server)
            .await
            .full_structure(&repo(), "main", 2)
            .await
            .unwrap();

        assert_eq!(nodes.len(), 3);
        let src = nodes.iter().find(|n| n.name == "src").unwrap();
        assert_eq!(src.children.len(), 1);
        // node_modules is listed but never descended into
        let skipped = nodes.iter().find(|n| n.name == "node_modules").unwrap();
        assert!(skipped.children.is_empty());
    }

    #[tokio::test]
    async fn search_code_collects_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"path": "src/a.rs"}, {"path": "src/b.rs"}]
            })))
            .mount(&server)
            .await;

        let paths = client(&server)
            .await
            .search_code(&repo(), "fn main")
            .await
            .unwrap();
        assert_eq!(paths, vec!["src/a.rs", "src/b.rs"]);
    }
}
