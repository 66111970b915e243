//! API endpoint resolution for github.com and GitHub Enterprise.

use reqwest::Url;

use crate::error::{GitHubError, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com/";

const PUBLIC_API_HOST: &str = "api.github.com";
const PUBLIC_WEB_ROOT: &str = "https://github.com";

/// Parse `raw` and normalise it into an API root: scheme and host required,
/// path ends with `/`, no query or fragment.
pub fn normalize_url(kind: &'static str, raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let invalid = |reason: &str| GitHubError::InvalidEndpoint {
        kind,
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.is_empty() {
        return Err(invalid("url cannot be empty"));
    }
    if !raw.contains("://") {
        return Err(invalid("url must include scheme (e.g. https://)"));
    }

    let mut url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("url must include host"));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Resolved API and upload roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api: Url,
    pub upload: Option<Url>,
}

impl Endpoints {
    /// Public github.com when neither URL is given; Enterprise needs both.
    pub fn resolve(base_url: Option<&str>, upload_url: Option<&str>) -> Result<Self> {
        let base_url = base_url.map(str::trim).filter(|s| !s.is_empty());
        let upload_url = upload_url.map(str::trim).filter(|s| !s.is_empty());

        match (base_url, upload_url) {
            (None, None) => Ok(Self {
                api: normalize_url("base", DEFAULT_API_URL)?,
                upload: None,
            }),
            (None, Some(_)) => Err(GitHubError::IncompleteEnterprise(
                "github upload url cannot be set without base url",
            )),
            (Some(_), None) => Err(GitHubError::IncompleteEnterprise(
                "github upload url must be provided when base url is set",
            )),
            (Some(base), Some(upload)) => Ok(Self {
                api: normalize_url("base", base)?,
                upload: Some(normalize_url("upload", upload)?),
            }),
        }
    }

    /// Web root git remotes live under: `https://github.com` for the public
    /// API, otherwise the API's scheme, host and port.
    pub fn web_root(&self) -> String {
        let host = self.api.host_str().unwrap_or_default();
        if host.eq_ignore_ascii_case(PUBLIC_API_HOST) {
            return PUBLIC_WEB_ROOT.to_string();
        }
        match self.api.port() {
            Some(port) => format!("{}://{host}:{port}", self.api.scheme()),
            None => format!("{}://{host}", self.api.scheme()),
        }
    }
}
