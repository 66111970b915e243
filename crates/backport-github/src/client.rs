//! `RemoteService` over the GitHub REST API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use backport_core::naming::branch_name_for;
use backport_core::remote::{
    CreatePrRequest, IssueComment, PrMetadata, PrRef, RemoteError, RemoteResult, RemoteService,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::endpoint::Endpoints;
use crate::error::{GitHubError, Result};
use crate::wire;

pub const DEFAULT_USER_AGENT: &str = "backport-cherry-pick-action";
const API_VERSION: &str = "2022-11-28";
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PULLS_PER_PAGE: &str = "50";
const ITEMS_PER_PAGE: &str = "100";
const MAX_ERROR_BODY: usize = 512;

/// GitHub client configuration.
#[derive(Clone)]
pub struct GitHubConfig {
    pub token: String,
    /// Enterprise API root; github.com when unset.
    pub base_url: Option<String>,
    pub upload_url: Option<String>,
    pub user_agent: String,
    /// Extra attempts for retryable `GET` failures.
    pub max_retries: u32,
    /// First backoff; doubles after each retry.
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("upload_url", &self.upload_url)
            .field("user_agent", &self.user_agent)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        GitHubConfig {
            token: token.into(),
            base_url: None,
            upload_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Target a GitHub Enterprise instance.
    pub fn with_enterprise_urls(mut self, base_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self.upload_url = Some(upload_url.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// GitHub REST client implementing [`RemoteService`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    max_retries: u32,
    retry_delay: Duration,
}

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

impl GitHubClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing, the endpoints are invalid or
    /// the HTTP client cannot be created.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let token = config.token.trim();
        if token.is_empty() {
            return Err(GitHubError::MissingToken);
        }
        let endpoints = Endpoints::resolve(config.base_url.as_deref(), config.upload_url.as_deref())?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| GitHubError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(GitHubClient {
            http,
            endpoints,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Root that git remotes for this instance live under.
    pub fn web_root(&self) -> String {
        self.endpoints.web_root()
    }

    fn api_url(&self, operation: &str, path: &str) -> RemoteResult<Url> {
        self.endpoints
            .api
            .join(path)
            .map_err(|e| RemoteError::fatal(operation, None, format!("build url for {path}: {e}")))
    }

    /// Send one request; `GET`s are retried on retryable failures.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> RemoteResult<Response> {
        let retries = if method == Method::GET { self.max_retries } else { 0 };
        let mut delay = self.retry_delay;
        let mut attempt = 0;

        loop {
            debug!(operation, method = %method, url = %url, attempt, "github request");
            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            let err = match request.send().await {
                Ok(response) => match check_status(operation, response).await {
                    Ok(response) => return Ok(response),
                    Err(err) => err,
                },
                Err(err) => classify_transport(operation, &err),
            };

            if !err.is_retryable() || attempt >= retries {
                return Err(err);
            }
            attempt += 1;
            warn!(
                operation,
                attempt,
                retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying github request"
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }

    async fn get(&self, operation: &str, url: Url) -> RemoteResult<Response> {
        self.execute::<()>(operation, Method::GET, url, None).await
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, url: Url) -> RemoteResult<T> {
        decode(operation, self.get(operation, url).await?).await
    }

    /// Follow `Link: rel="next"` until the last page.
    async fn get_all<T: DeserializeOwned>(&self, operation: &str, mut url: Url) -> RemoteResult<Vec<T>> {
        let mut items = Vec::new();
        loop {
            let response = self.get(operation, url).await?;
            let next = next_link(response.headers());
            items.extend(decode::<Vec<T>>(operation, response).await?);
            match next {
                Some(next) => {
                    url = Url::parse(&next)
                        .map_err(|e| RemoteError::fatal(operation, None, format!("invalid next page link: {e}")))?;
                }
                None => return Ok(items),
            }
        }
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: &B,
    ) -> RemoteResult<Response> {
        self.execute(operation, method, url, Some(body)).await
    }
}

async fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> RemoteResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::fatal(operation, None, format!("decode response: {e}")))
}

/// Map a non-success response onto a [`RemoteError`].
///
/// 202 Accepted (data still being computed), 429, 5xx and 403 caused by rate
/// limiting are retryable.
async fn check_status(operation: &str, response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() && status != StatusCode::ACCEPTED {
        return Ok(response);
    }

    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    let retry_after = response.headers().contains_key(RETRY_AFTER);

    let text = response.text().await.unwrap_or_default();
    let message = error_message(status, &text);

    let rate_limited =
        status == StatusCode::FORBIDDEN && (exhausted || retry_after || message.to_lowercase().contains("rate limit"));
    let retryable = status == StatusCode::ACCEPTED
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
        || rate_limited;

    let code = Some(status.as_u16());
    Err(if retryable {
        RemoteError::retryable(operation, code, message)
    } else {
        RemoteError::fatal(operation, code, message)
    })
}

fn error_message(status: StatusCode, text: &str) -> String {
    if let Some(message) = serde_json::from_str::<wire::ApiErrorBody>(text)
        .ok()
        .and_then(|body| body.message)
        .filter(|m| !m.trim().is_empty())
    {
        return message;
    }
    let text = text.trim();
    if text.is_empty() {
        return status.canonical_reason().unwrap_or("request failed").to_string();
    }
    let mut end = text.len().min(MAX_ERROR_BODY);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn classify_transport(operation: &str, err: &reqwest::Error) -> RemoteError {
    let status = err.status().map(|s| s.as_u16());
    if err.is_timeout() || err.is_connect() {
        RemoteError::retryable(operation, status, err.to_string())
    } else {
        RemoteError::fatal(operation, status, err.to_string())
    }
}

/// URL of the `rel="next"` entry in a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
        parts
            .any(|p| p.trim().eq_ignore_ascii_case("rel=\"next\""))
            .then(|| target.to_string())
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn pr_ref(pr: wire::PullRequest) -> PrRef {
    PrRef {
        url: pr.html_url.unwrap_or_default(),
        number: pr.number,
        head_branch: pr.head.and_then(|h| h.name).unwrap_or_default(),
        base_branch: pr.base.and_then(|b| b.name).unwrap_or_default(),
    }
}

fn pr_metadata(owner: &str, repo: &str, pr: wire::PullRequest) -> PrMetadata {
    let mut metadata = PrMetadata {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number: pr.number,
        title: pr.title.unwrap_or_default(),
        body: pr.body.unwrap_or_default(),
        merge_commit_sha: pr.merge_commit_sha.unwrap_or_default(),
        labels: pr.labels.into_iter().filter_map(|l| non_empty(l.name)).collect(),
        assignees: pr.assignees.into_iter().filter_map(|u| non_empty(u.login)).collect(),
        is_merged: pr.merged.unwrap_or(false),
        ..Default::default()
    };

    if let Some(head) = pr.head {
        metadata.head_sha = head.sha.unwrap_or_default();
        metadata.head_ref = head.name.unwrap_or_default();
        if let Some(head_repo) = head.repo {
            metadata.head_repo = head_repo.name.unwrap_or_default();
            metadata.head_owner = head_repo.owner.and_then(|o| o.login).unwrap_or_default();
        }
    }

    metadata.is_from_fork = (!metadata.head_owner.is_empty() && !metadata.head_owner.eq_ignore_ascii_case(owner))
        || (!metadata.head_repo.is_empty() && !metadata.head_repo.eq_ignore_ascii_case(repo));
    metadata
}

#[async_trait]
impl RemoteService for GitHubClient {
    async fn get_pull_request(&self, owner: &str, repo: &str, number: u64) -> RemoteResult<PrMetadata> {
        let op = "get pull request";
        let url = self.api_url(op, &format!("repos/{}/{}/pulls/{number}", enc(owner), enc(repo)))?;
        let pr: wire::PullRequest = self.get_json(op, url).await?;
        Ok(pr_metadata(owner, repo, pr))
    }

    async fn ensure_branch_exists(&self, owner: &str, repo: &str, branch: &str) -> RemoteResult<()> {
        let op = format!("get branch {branch}");
        let url = self.api_url(&op, &format!("repos/{}/{}/branches/{}", enc(owner), enc(repo), enc(branch)))?;
        match self.get(&op, url).await {
            Ok(_) => Ok(()),
            Err(err) if err.status() == Some(404) => Err(RemoteError::BranchNotFound {
                branch: branch.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn list_cherry_pick_prs(
        &self,
        owner: &str,
        repo: &str,
        source_pr: u64,
        target_branch: &str,
    ) -> RemoteResult<Vec<PrRef>> {
        let op = "list pull requests";
        let head = format!("{owner}:{}", branch_name_for(target_branch, source_pr));
        let mut url = self.api_url(op, &format!("repos/{}/{}/pulls", enc(owner), enc(repo)))?;
        url.query_pairs_mut()
            .append_pair("state", "all")
            .append_pair("head", &head)
            .append_pair("base", target_branch)
            .append_pair("per_page", PULLS_PER_PAGE);

        let prs: Vec<wire::PullRequest> = self.get_all(op, url).await?;
        Ok(prs.into_iter().map(pr_ref).collect())
    }

    async fn commit_exists_on_branch(
        &self,
        owner: &str,
        repo: &str,
        commit_sha: &str,
        branch: &str,
    ) -> RemoteResult<bool> {
        let op = format!("compare commits {branch}...{commit_sha}");
        let url = self.api_url(
            &op,
            &format!("repos/{}/{}/compare/{}...{}", enc(owner), enc(repo), enc(branch), enc(commit_sha)),
        )?;
        match self.get_json::<wire::Comparison>(&op, url).await {
            Ok(comparison) => Ok(matches!(comparison.status.as_str(), "behind" | "identical")),
            Err(err) if err.status() == Some(404) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn create_pull_request(&self, owner: &str, repo: &str, request: CreatePrRequest) -> RemoteResult<PrRef> {
        let op = "create pull request";
        let url = self.api_url(op, &format!("repos/{}/{}/pulls", enc(owner), enc(repo)))?;
        let body = wire::NewPullRequest {
            title: &request.title,
            head: &request.head,
            base: &request.base,
            body: &request.body,
            draft: request.draft,
            maintainer_can_modify: request.maintainer_can_modify,
        };
        let response = self.send_json(op, Method::POST, url, &body).await?;
        let created = pr_ref(decode::<wire::PullRequest>(op, response).await?);

        // The pull request exists from here on; decoration failures only warn.
        let issue = format!("repos/{}/{}/issues/{}", enc(owner), enc(repo), created.number);
        if !request.labels.is_empty() {
            let op = "add labels to pull request";
            let result = match self.api_url(op, &format!("{issue}/labels")) {
                Ok(url) => self
                    .send_json(op, Method::POST, url, &wire::LabelsRequest {
                        labels: &request.labels,
                    })
                    .await
                    .map(drop),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                warn!(pr_number = created.number, error = %err, "failed to copy labels onto pull request");
            }
        }
        if !request.assignees.is_empty() {
            let op = "add assignees to pull request";
            let result = match self.api_url(op, &format!("{issue}/assignees")) {
                Ok(url) => self
                    .send_json(op, Method::POST, url, &wire::AssigneesRequest {
                        assignees: &request.assignees,
                    })
                    .await
                    .map(drop),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                warn!(pr_number = created.number, error = %err, "failed to copy assignees onto pull request");
            }
        }

        Ok(created)
    }

    async fn has_label(&self, owner: &str, repo: &str, number: u64, label: &str) -> RemoteResult<bool> {
        let op = "list labels";
        let mut url = self.api_url(op, &format!("repos/{}/{}/issues/{number}/labels", enc(owner), enc(repo)))?;
        url.query_pairs_mut().append_pair("per_page", ITEMS_PER_PAGE);
        let labels: Vec<wire::Label> = self.get_all(op, url).await?;
        Ok(labels
            .into_iter()
            .filter_map(|l| l.name)
            .any(|name| name.eq_ignore_ascii_case(label)))
    }

    async fn add_label(&self, owner: &str, repo: &str, number: u64, label: &str) -> RemoteResult<()> {
        let op = "add label";
        let url = self.api_url(op, &format!("repos/{}/{}/issues/{number}/labels", enc(owner), enc(repo)))?;
        let labels = [label.to_string()];
        self.send_json(op, Method::POST, url, &wire::LabelsRequest { labels: &labels })
            .await
            .map(drop)
    }

    async fn check_org_membership(&self, org: &str, user: &str) -> RemoteResult<bool> {
        let op = "get org membership";
        let url = self.api_url(op, &format!("orgs/{}/memberships/{}", enc(org), enc(user)))?;
        match self.get(op, url).await {
            Ok(_) => Ok(true),
            Err(err) if err.status() == Some(404) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn comment_on_pull_request(&self, owner: &str, repo: &str, number: u64, body: &str) -> RemoteResult<()> {
        let op = "create comment";
        let url = self.api_url(op, &format!("repos/{}/{}/issues/{number}/comments", enc(owner), enc(repo)))?;
        self.send_json(op, Method::POST, url, &wire::CommentRequest { body })
            .await
            .map(drop)
    }

    async fn list_pull_request_comments(&self, owner: &str, repo: &str, number: u64) -> RemoteResult<Vec<IssueComment>> {
        let op = "list comments";
        let mut url = self.api_url(op, &format!("repos/{}/{}/issues/{number}/comments", enc(owner), enc(repo)))?;
        url.query_pairs_mut().append_pair("per_page", ITEMS_PER_PAGE);
        let comments: Vec<wire::IssueComment> = self.get_all(op, url).await?;
        Ok(comments
            .into_iter()
            .map(|c| IssueComment {
                id: c.id,
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn update_comment(&self, owner: &str, repo: &str, comment_id: u64, body: &str) -> RemoteResult<()> {
        let op = "edit comment";
        let url = self.api_url(op, &format!("repos/{}/{}/issues/comments/{comment_id}", enc(owner), enc(repo)))?;
        self.send_json(op, Method::PATCH, url, &wire::CommentRequest { body })
            .await
            .map(drop)
    }
}
