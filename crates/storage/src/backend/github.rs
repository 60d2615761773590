//! GitHub contents API storage backend.
//!
//! Records are files in a single repository, read and written through
//! `/repos/{owner}/{repo}/contents/{path}`. Every write is a commit. The
//! revision of a record is its blob SHA.
//!
//! # Credentials
//!
//! A personal access token is attached to every request as
//! `Authorization: token <pat>`. Without one, only public repositories can be
//! read and every write fails with [`AccessDenied`](ErrorKind::AccessDenied).

use crate::backend::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{EntryInfo, EntryKind, Record, Revision};
use crate::path::{validate as validate_path, validate_collection};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use exn::ResultExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
/// No call is allowed to hang forever; a timeout surfaces as a
/// [`Network`](ErrorKind::Network) error.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ACCEPT_V3: &str = "application/vnd.github.v3+json";

/// GitHub contents API storage backend.
///
/// # Examples
///
/// ```no_run
/// use feedman_storage::backend::{GithubBackend, StorageBackend};
/// use std::time::Duration;
///
/// # async fn example() -> feedman_storage::error::Result<()> {
/// let backend = GithubBackend::new("github", "AlL4music", "Imusic")?
///     .with_token("ghp_xxx")
///     .with_timeout(Duration::from_secs(10));
/// let feeds = backend.list("feeds").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GithubBackend {
    name: String,
    client: Client,
    api_base: Url,
    owner: String,
    repo: String,
    branch: Option<String>,
    token: Option<String>,
    timeout: Duration,
}

impl GithubBackend {
    /// Create a backend for `owner/repo` on the public GitHub API, using the
    /// repository's default branch.
    pub fn new(name: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V3));
        // GitHub rejects requests without a user agent.
        headers.insert(USER_AGENT, HeaderValue::from_static(concat!("feedman/", env!("CARGO_PKG_VERSION"))));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .or_raise(|| ErrorKind::BackendError("could not construct HTTP client".to_string()))?;
        let api_base = Url::parse(DEFAULT_API_BASE)
            .or_raise(|| ErrorKind::BackendError(format!("invalid API base `{DEFAULT_API_BASE}`")))?;
        Ok(Self {
            name: name.into(),
            client,
            api_base,
            owner: owner.into(),
            repo: repo.into(),
            branch: None,
            token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Read from and commit to `branch` instead of the default branch.
    pub fn with_branch(mut self, branch: impl Into<Option<String>>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Point at a different API root, e.g. GitHub Enterprise
    /// (`https://ghe.example.com/api/v3`) or a local fake in tests.
    pub fn with_api_base(mut self, api_base: impl AsRef<str>) -> Result<Self> {
        let api_base = api_base.as_ref();
        self.api_base =
            Url::parse(api_base).or_raise(|| ErrorKind::BackendError(format!("invalid API base `{api_base}`")))?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        {
            let Ok(mut path) = url.path_segments_mut() else {
                exn::bail!(ErrorKind::BackendError(format!("API base `{}` cannot hold a path", self.api_base)));
            };
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn contents_url(&self, path: &str) -> Result<Url> {
        let mut segments = vec!["repos", self.owner.as_str(), self.repo.as_str(), "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        self.endpoint(segments)
    }

    /// Reads select the branch via the `ref` query parameter; writes carry it
    /// in the request body instead.
    fn read_url(&self, path: &str) -> Result<Url> {
        let mut url = self.contents_url(path)?;
        if let Some(branch) = &self.branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response> {
        let request = match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        };
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("request for `{path}` did not complete")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.json::<ApiMessage>().await.ok().map(|m| m.message);
        debug!(backend = %self.name, %status, path, ?message, "GitHub API request failed");
        exn::bail!(classify(status, path, message.as_deref()))
    }

    async fn contents(&self, path: &str) -> Result<Contents> {
        let response = self.send(self.client.get(self.read_url(path)?), path).await?;
        response.json::<Contents>().await.or_raise(|| ErrorKind::InvalidData(format!("unexpected response for `{path}`")))
    }
}

impl Debug for GithubBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GithubBackend")
            .field("name", &self.name)
            .field("api_base", &self.api_base.as_str())
            .field("repository", &format_args!("{}/{}", self.owner, self.repo))
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl StorageBackend for GithubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn identity(&self) -> Result<String> {
        let url = self.endpoint(["user"])?;
        let response = self.send(self.client.get(url), "user").await?;
        let user = response.json::<User>().await.or_raise(|| ErrorKind::InvalidData("unexpected user".to_string()))?;
        Ok(user.login)
    }

    async fn list(&self, collection: &str) -> Result<Vec<EntryInfo>> {
        let collection = validate_collection(collection)?;
        debug!(backend = %self.name, collection = %collection, "Listing collection");
        match self.contents(&collection).await? {
            Contents::Listing(entries) => Ok(entries.into_iter().map(EntryInfo::from).collect()),
            Contents::File(_) => exn::bail!(ErrorKind::InvalidData(format!("`{collection}` is a file"))),
        }
    }

    async fn read(&self, path: &str) -> Result<Record> {
        let path = validate_path(path)?;
        debug!(backend = %self.name, path = %path, "Reading record");
        match self.contents(&path).await? {
            Contents::File(file) => decode(&path, file),
            Contents::Listing(_) => exn::bail!(ErrorKind::InvalidData(format!("`{path}` is a collection"))),
        }
    }

    async fn write(&self, path: &str, content: &str, revision: Option<&Revision>, message: &str) -> Result<Revision> {
        let path = validate_path(path)?;
        debug!(backend = %self.name, path = %path, create = revision.is_none(), "Writing record");
        let body = WriteRequest {
            message,
            content: BASE64.encode(content.as_bytes()),
            sha: revision.map(Revision::as_str),
            branch: self.branch.as_deref(),
        };
        let response = self.send(self.client.put(self.contents_url(&path)?).json(&body), &path).await?;
        let written = response
            .json::<WriteResponse>()
            .await
            .or_raise(|| ErrorKind::InvalidData(format!("unexpected write response for `{path}`")))?;
        Ok(Revision::new(written.content.sha))
    }

    async fn delete(&self, path: &str, revision: &Revision, message: &str) -> Result<()> {
        let path = validate_path(path)?;
        debug!(backend = %self.name, path = %path, "Deleting record");
        let body = DeleteRequest {
            message,
            sha: revision.as_str(),
            branch: self.branch.as_deref(),
        };
        self.send(self.client.delete(self.contents_url(&path)?).json(&body), &path).await?;
        Ok(())
    }
}

/// Maps a failed response onto an actionable error category.
///
/// GitHub answers a stale SHA with `409`, and a create over an existing file
/// (no SHA supplied) with `422`; both are revision conflicts to the caller.
fn classify(status: StatusCode, path: &str, message: Option<&str>) -> ErrorKind {
    let subject = match path.is_empty() {
        true => "/".to_string(),
        false => path.to_string(),
    };
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound(subject),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AccessDenied(subject),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Conflict(subject),
        _ => ErrorKind::Network(match message {
            Some(message) => format!("GitHub API error {status} for `{subject}`: {message}"),
            None => format!("GitHub API error {status} for `{subject}`"),
        }),
    }
}

fn decode(path: &str, file: FileContent) -> Result<Record> {
    if let Some(encoding) = file.encoding.as_deref()
        && encoding != "base64"
    {
        exn::bail!(ErrorKind::InvalidData(format!("`{path}` has unsupported encoding `{encoding}`")));
    }
    // The API wraps base64 content at 60 columns.
    let packed: String = file.content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64.decode(packed).or_raise(|| ErrorKind::InvalidData(format!("`{path}` is not valid base64")))?;
    let content = String::from_utf8(bytes).or_raise(|| ErrorKind::InvalidData(format!("`{path}` is not UTF-8")))?;
    Ok(Record {
        content,
        revision: Revision::new(file.sha),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Contents {
    Listing(Vec<ContentEntry>),
    File(FileContent),
}

#[derive(Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(default)]
    size: u64,
    download_url: Option<String>,
    #[serde(rename = "type")]
    kind: String,
}
impl From<ContentEntry> for EntryInfo {
    fn from(entry: ContentEntry) -> Self {
        let kind = match entry.kind.as_str() {
            "file" => EntryKind::File,
            "dir" => EntryKind::Directory,
            _ => EntryKind::Other,
        };
        Self {
            name: entry.name,
            path: entry.path,
            size: entry.size,
            download_url: entry.download_url,
            kind,
        }
    }
}

#[derive(Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    encoding: Option<String>,
    sha: String,
}

#[derive(Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Deserialize)]
struct WrittenContent {
    sha: String,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}
