//! Remote search tools. Result counts are capped to bound prompt size.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{str_arg, ParamKind, Tool, ToolParameter};
use crate::context::TaskContext;
use crate::github::GitHubClient;
use crate::task::{RepoId, StepKind, StepOutcome};

const MAX_CODE_RESULTS: usize = 10;
const MAX_FILE_RESULTS: usize = 20;

/// Full-text code search within the repository.
pub struct SearchCode {
    github: Arc<GitHubClient>,
    repo: RepoId,
}

impl SearchCode {
    pub fn new(github: Arc<GitHubClient>, repo: RepoId) -> Self {
        Self { github, repo }
    }
}

#[async_trait]
impl Tool for SearchCode {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Search the repository's code for a string. Returns the paths of the \
         top matches."
    }

    fn parameters(&self) -> &[ToolParameter] {
        const PARAMS: &[ToolParameter] = &[ToolParameter::required(
            "query",
            ParamKind::String,
            "Text to search for",
        )];
        PARAMS
    }

    fn step_kind(&self) -> StepKind {
        StepKind::Search
    }

    async fn execute(&self, args: &Value, _ctx: &mut TaskContext) -> StepOutcome {
        let query = str_arg(args, "query");
        match self.github.search_code(&self.repo, query).await {
            Ok(paths) if paths.is_empty() => StepOutcome::ok_message("no matches"),
            Ok(mut paths) => {
                paths.truncate(MAX_CODE_RESULTS);
                StepOutcome::ok(paths.join("\n"))
            }
            Err(e) => StepOutcome::err(format!("search failed: {e}")),
        }
    }
}

/// Locate files by (partial) name.
pub struct FindFile {
    github: Arc<GitHubClient>,
    repo: RepoId,
}

impl FindFile {
    pub fn new(github: Arc<GitHubClient>, repo: RepoId) -> Self {
        Self { github, repo }
    }
}

#[async_trait]
impl Tool for FindFile {
    fn name(&self) -> &str {
        "find_file"
    }

    fn description(&self) -> &str {
        "Find files whose name matches. Returns the paths of the top matches."
    }

    fn parameters(&self) -> &[ToolParameter] {
        const PARAMS: &[ToolParameter] = &[ToolParameter::required(
            "filename",
            ParamKind::String,
            "File name or fragment to look for",
        )];
        PARAMS
    }

    fn step_kind(&self) -> StepKind {
        StepKind::Search
    }

    async fn execute(&self, args: &Value, _ctx: &mut TaskContext) -> StepOutcome {
        let filename = str_arg(args, "filename");
        match self.github.search_filename(&self.repo, filename).await {
            Ok(paths) if paths.is_empty() => StepOutcome::ok_message("no files found"),
            Ok(mut paths) => {
                paths.truncate(MAX_FILE_RESULTS);
                StepOutcome::ok(paths.join("\n"))
            }
            Err(e) => StepOutcome::err(format!("file search failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepoId {
        RepoId::parse("acme/widgets").unwrap()
    }

    #[tokio::test]
    async fn search_code_caps_results() {
        let server = MockServer::start().await;
        let items: Vec<_> = (0..25)
            .map(|i| serde_json::json!({"path": format!("src/file{i}.rs")}))
            .collect();
        Mock::given(method("GET"))
            .and(url_path("/search/code"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "items": items })),
            )
            .mount(&server)
            .await;

        let github = Arc::new(GitHubClient::with_base_url(
            "t".into(),
            server.uri(),
            Duration::from_secs(5),
        ));
        let tool = SearchCode::new(github, repo());
        let mut ctx = TaskContext::new("main");

        let outcome = tool
            .execute(&serde_json::json!({"query": "fn"}), &mut ctx)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap().lines().count(), MAX_CODE_RESULTS);
    }

    #[tokio::test]
    async fn find_file_reports_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/search/code"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})),
            )
            .mount(&server)
            .await;

        let github = Arc::new(GitHubClient::with_base_url(
            "t".into(),
            server.uri(),
            Duration::from_secs(5),
        ));
        let tool = FindFile::new(github, repo());
        let mut ctx = TaskContext::new("main");

        let outcome = tool
            .execute(&serde_json::json!({"filename": "nope.rs"}), &mut ctx)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("no files found"));
    }

    #[tokio::test]
    async fn search_error_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad query"))
            .mount(&server)
            .await;

        let github = Arc::new(GitHubClient::with_base_url(
            "t".into(),
            server.uri(),
            Duration::from_secs(5),
        ));
        let tool = SearchCode::new(github, repo());
        let mut ctx = TaskContext::new("main");

        let outcome = tool
            .execute(&serde_json::json!({"query": "((("}), &mut ctx)
            .await;
        assert!(!outcome.success);
    }
}
