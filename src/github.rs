//! GitHub search transport.
//!
//! Issues, pull requests, code and commits go through the REST search API;
//! discussions go through the GraphQL `search(type: DISCUSSION)` connection.
//! Each call is a single attempt; the orchestrator owns retries.
//!
//! # Query Shape
//!
//! ```text
//! repo:<owner/name> [is:issue|is:pr] <planned query> [is:open] [created:A..B]
//! ```
//!
//! Commits filter on `author-date:` instead of `created:`. Code search takes
//! no type or filter qualifiers.
//!
//! # Status Mapping
//!
//! | HTTP | Error |
//! |------|-------|
//! | 401 | `Unauthorized` |
//! | 403 with exhausted rate limit, 429 | `RateLimited` |
//! | 403 otherwise | `Unauthorized` |
//! | 422 and other 4xx | `InvalidQuery` |
//! | 5xx, connection failure, timeout | `Network` |

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use repo_scout_core::xref::closing_refs;
use repo_scout_core::{ContentItem, ContentType, ItemDetail};

use crate::config::TransportConfig;
use crate::transport::{SearchFilters, SearchTransport, TransportError};

const JSON_ACCEPT: &str = "application/vnd.github+json";
const TEXT_MATCH_ACCEPT: &str = "application/vnd.github.text-match+json";
const COMMIT_SEARCH_ACCEPT: &str = "application/vnd.github.cloak-preview+json";
const DISCUSSION_COMMENTS: usize = 10;

const DISCUSSION_QUERY: &str = r#"
query($q: String!, $first: Int!, $after: String) {
  search(query: $q, type: DISCUSSION, first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on Discussion {
        number
        title
        url
        createdAt
        body
        closed
        category { name }
        answer { body }
        comments(first: 10) { nodes { body } }
      }
    }
  }
}
"#;

/// REST and GraphQL client for one repository.
pub struct GitHubTransport {
    client: reqwest::Client,
    api_url: String,
    repo: String,
    token: Option<String>,
    per_page: u32,
    max_pages: u32,
    max_retries: u32,
    retry_base: Duration,
}

impl GitHubTransport {
    pub fn new(repo: &str, config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("repo-scout/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let token = config.token();
        if token.is_none() {
            warn!(
                env = %config.token_env,
                "no API token set; requests are unauthenticated and heavily rate limited"
            );
        }

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token,
            per_page: config.per_page,
            max_pages: config.max_pages,
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
        accept: &str,
    ) -> Result<T, TransportError> {
        let mut req = self
            .client
            .get(url)
            .query(params)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let response = req
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        decode_response(response).await
    }

    async fn search_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        q: &str,
        accept: &str,
    ) -> Result<Vec<T>, TransportError> {
        let url = format!("{}/search/{}", self.api_url, endpoint);
        let mut out = Vec::new();
        for page in 1..=self.max_pages {
            let params = [
                ("q", q.to_string()),
                ("per_page", self.per_page.to_string()),
                ("page", page.to_string()),
            ];
            let resp: SearchPage<T> = self.get_json(&url, &params, accept).await?;
            let n = resp.items.len();
            out.extend(resp.items);
            debug!(endpoint, page, n, total = resp.total_count, "search page");
            if n < self.per_page as usize || out.len() as u64 >= resp.total_count {
                break;
            }
        }
        Ok(out)
    }

    async fn search_discussions(&self, q: &str) -> Result<Vec<ContentItem>, TransportError> {
        let Some(token) = &self.token else {
            return Err(TransportError::Unauthorized(
                "discussion search requires an API token".to_string(),
            ));
        };

        let url = format!("{}/graphql", self.api_url);
        let mut out = Vec::new();
        let mut after: Option<String> = None;
        for _ in 0..self.max_pages {
            let body = serde_json::json!({
                "query": DISCUSSION_QUERY,
                "variables": {
                    "q": q,
                    "first": self.per_page.min(100),
                    "after": after,
                }
            });
            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            let resp: GraphQlResponse = decode_response(response).await?;

            if let Some(err) = resp.errors.first() {
                return Err(if err.kind.as_deref() == Some("RATE_LIMITED") {
                    TransportError::RateLimited {
                        retry_after_secs: None,
                    }
                } else {
                    TransportError::InvalidQuery(err.message.clone())
                });
            }
            let Some(data) = resp.data else {
                return Err(TransportError::Decode("GraphQL response without data".into()));
            };

            out.extend(
                data.search
                    .nodes
                    .into_iter()
                    .flatten()
                    .filter_map(DiscussionNode::into_item),
            );
            if !data.search.page_info.has_next_page {
                break;
            }
            after = data.search.page_info.end_cursor;
        }
        Ok(out)
    }

    async fn comment_bodies(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let url = format!("{}/repos/{}/{}", self.api_url, self.repo, path);
        let params = [("per_page", "100".to_string())];
        let comments: Vec<CommentHit> = self.get_json(&url, &params, JSON_ACCEPT).await?;
        Ok(comments.into_iter().filter_map(|c| c.body).collect())
    }

    async fn changed_files(&self, number: u64) -> Result<BTreeSet<String>, TransportError> {
        let url = format!("{}/repos/{}/pulls/{}/files", self.api_url, self.repo, number);
        let params = [("per_page", "100".to_string())];
        let files: Vec<FileHit> = self.get_json(&url, &params, JSON_ACCEPT).await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }
}

#[async_trait]
impl SearchTransport for GitHubTransport {
    async fn execute(
        &self,
        query: &str,
        content_type: ContentType,
        filters: &SearchFilters,
    ) -> Result<Vec<ContentItem>, TransportError> {
        let q = build_query(&self.repo, query, content_type, filters);
        debug!(%content_type, q = %q, "executing search");

        match content_type {
            ContentType::Issue | ContentType::PullRequest => Ok(self
                .search_pages::<IssueHit>("issues", &q, JSON_ACCEPT)
                .await?
                .into_iter()
                .map(IssueHit::into_item)
                .collect()),
            ContentType::Code => Ok(self
                .search_pages::<CodeHit>("code", &q, TEXT_MATCH_ACCEPT)
                .await?
                .into_iter()
                .map(CodeHit::into_item)
                .collect()),
            ContentType::Commit => Ok(self
                .search_pages::<CommitHit>("commits", &q, COMMIT_SEARCH_ACCEPT)
                .await?
                .into_iter()
                .map(CommitHit::into_item)
                .collect()),
            ContentType::Discussion => self.search_discussions(&q).await,
        }
    }

    async fn fetch_details(&self, mut item: ContentItem) -> Result<ContentItem, TransportError> {
        match &mut item.detail {
            ItemDetail::Issue { number } => {
                let comments = self
                    .comment_bodies(&format!("issues/{}/comments", number))
                    .await?;
                item.comments = Some(comments);
            }
            ItemDetail::PullRequest {
                number,
                changed_file_paths,
                ..
            } => {
                let n = *number;
                let mut comments = self
                    .comment_bodies(&format!("pulls/{}/comments", n))
                    .await?;
                comments.extend(
                    self.comment_bodies(&format!("issues/{}/comments", n))
                        .await?,
                );
                changed_file_paths.extend(self.changed_files(n).await?);
                item.comments = Some(comments);
            }
            _ => {}
        }
        Ok(item)
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base * (1u32 << attempt.saturating_sub(1).min(5))
    }
}

async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()));
    }

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let remaining = header("x-ratelimit-remaining");
    let retry_after = header(RETRY_AFTER.as_str()).and_then(|v| v.parse().ok());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(
        status.as_u16(),
        remaining.as_deref(),
        retry_after,
        &body,
    ))
}

/// Map a non-success HTTP status to a transport error.
pub fn classify_status(
    status: u16,
    rate_remaining: Option<&str>,
    retry_after_secs: Option<u64>,
    body: &str,
) -> TransportError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        429 => TransportError::RateLimited { retry_after_secs },
        403 if rate_remaining == Some("0")
            || retry_after_secs.is_some()
            || body.to_lowercase().contains("rate limit") =>
        {
            TransportError::RateLimited { retry_after_secs }
        }
        401 | 403 => TransportError::Unauthorized(format!("HTTP {}: {}", status, snippet)),
        500..=599 => TransportError::Network(format!("server error {}", status)),
        _ => TransportError::InvalidQuery(format!("HTTP {}: {}", status, snippet)),
    }
}

/// Full search string for one planned query.
pub fn build_query(
    repo: &str,
    query: &str,
    content_type: ContentType,
    filters: &SearchFilters,
) -> String {
    let mut parts = vec![format!("repo:{}", repo)];
    match content_type {
        ContentType::Issue => parts.push("is:issue".into()),
        ContentType::PullRequest => parts.push("is:pr".into()),
        _ => {}
    }
    parts.push(query.to_string());

    if content_type == ContentType::Code {
        return parts.join(" ");
    }

    if matches!(content_type, ContentType::Issue | ContentType::PullRequest) {
        if let Some(state) = &filters.state {
            parts.push(format!("is:{}", state));
        }
    }

    let field = if content_type == ContentType::Commit {
        "author-date"
    } else {
        "created"
    };
    match (filters.date_from, filters.date_to) {
        (Some(from), Some(to)) => parts.push(format!("{}:{}..{}", field, from, to)),
        (Some(from), None) => parts.push(format!("{}:>={}", field, from)),
        (None, Some(to)) => parts.push(format!("{}:<={}", field, to)),
        (None, None) => {}
    }

    parts.join(" ")
}

#[derive(Deserialize)]
struct SearchPage<T> {
    #[serde(default)]
    total_count: u64,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct PullRef {
    #[serde(default)]
    merged_at: Option<String>,
}

#[derive(Deserialize)]
struct IssueHit {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<Named>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    pull_request: Option<PullRef>,
}

impl IssueHit {
    fn into_item(self) -> ContentItem {
        let body = self.body.unwrap_or_default();
        let detail = match self.pull_request {
            Some(pr) => ItemDetail::PullRequest {
                number: self.number,
                merged: pr.merged_at.is_some(),
                linked_issue_refs: closing_refs(&body),
                changed_file_paths: BTreeSet::new(),
            },
            None => ItemDetail::Issue {
                number: self.number,
            },
        };
        ContentItem {
            title: self.title,
            body,
            comments: None,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            state: self.state,
            url: self.html_url,
            created_at: self.created_at,
            detail,
        }
    }
}

#[derive(Deserialize)]
struct TextMatch {
    #[serde(default)]
    fragment: String,
}

#[derive(Deserialize)]
struct CodeHit {
    path: String,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    text_matches: Vec<TextMatch>,
}

impl CodeHit {
    fn into_item(self) -> ContentItem {
        let snippet = self
            .text_matches
            .into_iter()
            .map(|m| m.fragment)
            .collect::<Vec<_>>()
            .join("\n");
        ContentItem {
            title: self.path.clone(),
            body: snippet,
            comments: None,
            labels: BTreeSet::new(),
            state: String::new(),
            url: self.html_url,
            created_at: String::new(),
            detail: ItemDetail::Code {
                file_path: self.path,
                sha: self.sha,
            },
        }
    }
}

#[derive(Deserialize, Default)]
struct CommitAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    date: String,
}

#[derive(Deserialize)]
struct CommitInfo {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitHit {
    sha: String,
    #[serde(default)]
    html_url: String,
    commit: CommitInfo,
}

impl CommitHit {
    fn into_item(self) -> ContentItem {
        let author = self.commit.author.unwrap_or_default();
        let summary = self.commit.message.lines().next().unwrap_or("").to_string();
        ContentItem {
            title: summary,
            body: self.commit.message,
            comments: None,
            labels: BTreeSet::new(),
            state: String::new(),
            url: self.html_url,
            created_at: author.date,
            detail: ItemDetail::Commit {
                sha: self.sha,
                author: author.name,
            },
        }
    }
}

#[derive(Deserialize)]
struct CommentHit {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Deserialize)]
struct FileHit {
    filename: String,
}

#[derive(Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlData {
    search: DiscussionSearch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscussionSearch {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<DiscussionNode>>,
}

#[derive(Deserialize)]
struct BodyNode {
    #[serde(default)]
    body: String,
}

#[derive(Deserialize)]
struct BodyNodes {
    #[serde(default)]
    nodes: Vec<BodyNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscussionNode {
    /// Absent when the search matched something other than a discussion.
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    category: Option<Named>,
    #[serde(default)]
    answer: Option<BodyNode>,
    #[serde(default)]
    comments: Option<BodyNodes>,
}

impl DiscussionNode {
    fn into_item(self) -> Option<ContentItem> {
        let number = self.number?;
        let comments = self
            .comments
            .map(|c| {
                c.nodes
                    .into_iter()
                    .take(DISCUSSION_COMMENTS)
                    .map(|n| n.body)
                    .collect()
            })
            .unwrap_or_default();
        Some(ContentItem {
            title: self.title,
            body: self.body,
            comments: Some(comments),
            labels: BTreeSet::new(),
            state: if self.closed { "closed" } else { "open" }.to_string(),
            url: self.url,
            created_at: self.created_at,
            detail: ItemDetail::Discussion {
                number,
                category: self.category.map(|c| c.name).unwrap_or_default(),
                accepted_answer: self.answer.map(|a| a.body).unwrap_or_default(),
            },
        })
    }
}
