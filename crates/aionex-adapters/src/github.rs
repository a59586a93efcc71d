//! GitHub repository store
//!
//! Lists, reads, and writes single files through the REST contents API. The
//! blob sha GitHub returns for each file is the version token; GitHub itself
//! rejects a write whose sha is stale.

use aionex_core::error::{Error, Result};
use aionex_core::store::{
    FileBlob, RemoteFileStore, StoreCapabilities, StoreFuture, VersionToken, WriteRequest,
};
use aionex_core::tree::TreeEntry;
use aionex_core::util::sanitize_error_body;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_TIMEOUT_SECS: u64 = 60;
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("aionex/", env!("CARGO_PKG_VERSION"));

/// `owner/repo` pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Accepts `owner/repo` or a github.com remote URL (https or ssh).
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (owner, name) = parse_remote_url(input)
            .or_else(|| split_slug(input))
            .ok_or_else(|| {
                Error::validation(input, "invalid repository format, expected 'owner/repo'")
            })?;
        Ok(Self { owner, name })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn split_slug(input: &str) -> Option<(String, String)> {
    let (owner, name) = input.split_once('/')?;
    let name = name.trim_end_matches(".git");
    if valid_segment(owner) && valid_segment(name) {
        Some((owner.to_string(), name.to_string()))
    } else {
        None
    }
}

/// Extract owner and repo from a github.com remote URL.
///
/// Supports:
/// - git@github.com:owner/repo.git
/// - https://github.com/owner/repo(.git)
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    if let Some(rest) = url.strip_prefix("git@github.com:") {
        return split_slug(rest);
    }
    let parsed = Url::parse(url).ok()?;
    if parsed.host_str() != Some("github.com") {
        return None;
    }
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let name = segments.next()?;
    split_slug(&format!("{}/{}", owner, name))
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct UpdateFileRequest<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
}

#[derive(Deserialize)]
struct UpdateFileResponse {
    content: ContentRef,
}

#[derive(Deserialize)]
struct ContentRef {
    sha: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
}

pub struct GitHubStore {
    client: reqwest::Client,
    api_url: Url,
    token: Option<String>,
    repo: RepoSlug,
}

impl GitHubStore {
    /// Without a token only public repositories can be read and nothing can
    /// be written.
    pub fn new(repo: RepoSlug, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        let api_url = Url::parse(DEFAULT_API_URL)
            .map_err(|e| Error::validation(DEFAULT_API_URL, e.to_string()))?;
        Ok(Self {
            client,
            api_url,
            token: token.filter(|t| !t.trim().is_empty()),
            repo,
        })
    }

    /// Point at a different API root (GitHub Enterprise, tests).
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self> {
        self.api_url =
            Url::parse(api_url).map_err(|e| Error::validation(api_url, e.to_string()))?;
        Ok(self)
    }

    fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["repos", self.repo.owner.as_str(), self.repo.name.as_str()])
                .extend(segments);
        }
        url
    }

    fn contents_url(&self, path: &str) -> Url {
        self.endpoint(std::iter::once("contents").chain(path.split('/')))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        subject: &str,
        expected: Option<&VersionToken>,
    ) -> Result<String> {
        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let body = response.text().await.map_err(network_error)?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(status, &body, subject, expected))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, subject: &str) -> Result<T> {
        let body = self
            .send(self.request(reqwest::Method::GET, url), subject, None)
            .await?;
        serde_json::from_str(&body).map_err(|e| {
            Error::Network(format!("Unexpected GitHub response for {}: {}", subject, e))
        })
    }

    async fn list(&self) -> Result<Vec<TreeEntry>> {
        let slug = self.repo.to_string();
        let repo: RepoResponse = self.get_json(self.endpoint(std::iter::empty()), &slug).await?;
        let branch: BranchResponse = self
            .get_json(
                self.endpoint(["branches", repo.default_branch.as_str()]),
                &repo.default_branch,
            )
            .await?;

        let mut url = self.endpoint(["git", "trees", branch.commit.sha.as_str()]);
        url.query_pairs_mut().append_pair("recursive", "1");
        let tree: TreeResponse = self.get_json(url, &slug).await?;
        if tree.truncated {
            tracing::warn!("GitHub truncated the tree listing for {}; some files are missing", slug);
        }

        let entries = tree
            .tree
            .into_iter()
            .filter_map(|item| match item.kind.as_str() {
                "tree" => Some(TreeEntry::directory(item.path)),
                "blob" => Some(TreeEntry::file(item.path)),
                other => {
                    tracing::debug!("Skipping {} entry {}", other, item.path);
                    None
                }
            })
            .collect::<Vec<_>>();
        tracing::info!(
            "Listed {} entries in {} ({})",
            entries.len(),
            slug,
            repo.default_branch
        );
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<FileBlob> {
        let body = self
            .send(
                self.request(reqwest::Method::GET, self.contents_url(path)),
                path,
                None,
            )
            .await?;
        decode_contents(path, &body)
    }

    async fn write(&self, request: WriteRequest<'_>) -> Result<VersionToken> {
        let payload = UpdateFileRequest {
            message: request.message,
            content: BASE64.encode(request.content.as_bytes()),
            sha: request.expected_version.as_str(),
        };
        let body = self
            .send(
                self.request(reqwest::Method::PUT, self.contents_url(request.path))
                    .json(&payload),
                request.path,
                Some(request.expected_version),
            )
            .await?;
        let updated: UpdateFileResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Network(format!(
                "Unexpected GitHub response for {}: {}",
                request.path, e
            ))
        })?;
        Ok(VersionToken::new(updated.content.sha))
    }
}

impl RemoteFileStore for GitHubStore {
    fn label(&self) -> String {
        self.repo.to_string()
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::READ_WRITE
    }

    fn list_entries(&self) -> StoreFuture<'_, Vec<TreeEntry>> {
        Box::pin(self.list())
    }

    fn read_file<'a>(&'a self, path: &'a str) -> StoreFuture<'a, FileBlob> {
        Box::pin(self.read(path))
    }

    fn write_file<'a>(&'a self, request: WriteRequest<'a>) -> StoreFuture<'a, VersionToken> {
        Box::pin(self.write(request))
    }
}

fn network_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Network(format!(
            "GitHub did not respond within {}s",
            API_TIMEOUT_SECS
        ))
    } else {
        Error::Network(format!("Request to GitHub failed: {}", err))
    }
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| sanitize_error_body(&e.message))
        .unwrap_or_else(|_| sanitize_error_body(body))
}

/// Map a non-success status to the error taxonomy.
fn status_error(
    status: StatusCode,
    body: &str,
    subject: &str,
    expected: Option<&VersionToken>,
) -> Error {
    let message = api_message(body);
    let conflict = || Error::Conflict {
        path: subject.to_string(),
        expected: expected.map(|v| v.to_string()).unwrap_or_default(),
    };
    match status.as_u16() {
        404 => Error::NotFound(subject.to_string()),
        401 | 403 => Error::PermissionDenied(format!("{} ({})", message, status)),
        409 if expected.is_some() => conflict(),
        422 if expected.is_some() && body.to_lowercase().contains("sha") => conflict(),
        _ => Error::Network(format!("GitHub API error ({}): {}", status, message)),
    }
}

fn decode_contents(path: &str, body: &str) -> Result<FileBlob> {
    let decode_error = |reason: String| Error::Decode {
        path: path.to_string(),
        reason,
    };
    let contents: ContentsResponse = serde_json::from_str(body)
        .map_err(|_| decode_error("not a file".to_string()))?;
    match contents.encoding.as_deref() {
        Some("base64") => {}
        other => {
            return Err(decode_error(format!(
                "unsupported encoding {}",
                other.unwrap_or("(none)")
            )))
        }
    }
    let packed: String = contents
        .content
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = BASE64
        .decode(packed)
        .map_err(|e| decode_error(format!("invalid base64: {}", e)))?;
    let content =
        String::from_utf8(bytes).map_err(|_| decode_error("not valid UTF-8".to_string()))?;
    Ok(FileBlob {
        content,
        version: VersionToken::new(contents.sha),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn store(server: &mockito::Server) -> GitHubStore {
        GitHubStore::new(RepoSlug::parse("octo/demo").unwrap(), Some("ghp_test".into()))
            .unwrap()
            .with_api_url(&server.url())
            .unwrap()
    }

    #[test]
    fn test_parse_slug_and_remote_urls() {
        let slug = RepoSlug::parse("octo/demo").unwrap();
        assert_eq!(slug.to_string(), "octo/demo");
        assert_eq!(
            RepoSlug::parse("git@github.com:MyOrg/my_repo.git").unwrap(),
            RepoSlug {
                owner: "MyOrg".into(),
                name: "my_repo".into()
            }
        );
        assert_eq!(
            RepoSlug::parse("https://github.com/octo/demo.git")
                .unwrap()
                .name,
            "demo"
        );
    }

    #[test]
    fn test_invalid_slugs_are_validation_errors() {
        for input in ["", "octo", "/demo", "octo/", "a/b/c", "https://gitlab.com/a/b"] {
            assert!(
                matches!(RepoSlug::parse(input), Err(Error::Validation { .. })),
                "accepted {:?}",
                input
            );
        }
    }

    #[tokio::test]
    async fn test_list_entries_walks_repo_branch_and_tree() {
        let mut server = mockito::Server::new_async().await;
        let repo = server
            .mock("GET", "/repos/octo/demo")
            .match_header("authorization", "Bearer ghp_test")
            .with_body(r#"{"default_branch":"main"}"#)
            .create_async()
            .await;
        let branch = server
            .mock("GET", "/repos/octo/demo/branches/main")
            .with_body(r#"{"commit":{"sha":"c0ffee"}}"#)
            .create_async()
            .await;
        let tree = server
            .mock("GET", Matcher::Regex(r"^/repos/octo/demo/git/trees/c0ffee".into()))
            .match_query(Matcher::UrlEncoded("recursive".into(), "1".into()))
            .with_body(
                r#"{"tree":[
                    {"path":"src/main.rs","type":"blob"},
                    {"path":"src","type":"tree"},
                    {"path":"vendor/lib","type":"commit"}
                ],"truncated":false}"#,
            )
            .create_async()
            .await;

        let entries = store(&server).list_entries().await.unwrap();

        repo.assert_async().await;
        branch.assert_async().await;
        tree.assert_async().await;
        assert_eq!(
            entries,
            vec![TreeEntry::file("src/main.rs"), TreeEntry::directory("src")]
        );
    }

    #[tokio::test]
    async fn test_read_file_decodes_wrapped_base64() {
        let mut server = mockito::Server::new_async().await;
        let encoded = BASE64.encode("fn main() {}\n");
        let (head, tail) = encoded.split_at(8);
        let body = format!(
            r#"{{"sha":"abc123","encoding":"base64","content":"{}\n{}\n"}}"#,
            head, tail
        );
        server
            .mock("GET", "/repos/octo/demo/contents/src/main.rs")
            .with_body(body)
            .create_async()
            .await;

        let blob = store(&server).read_file("src/main.rs").await.unwrap();

        assert_eq!(blob.content, "fn main() {}\n");
        assert_eq!(blob.version, VersionToken::new("abc123"));
    }

    #[tokio::test]
    async fn test_read_rejects_unsupported_encoding_and_binary() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octo/demo/contents/big.bin")
            .with_body(r#"{"sha":"1","encoding":"none","content":""}"#)
            .create_async()
            .await;
        let binary = BASE64.encode([0xff, 0xfe, 0x00]);
        server
            .mock("GET", "/repos/octo/demo/contents/logo.png")
            .with_body(format!(r#"{{"sha":"2","encoding":"base64","content":"{}"}}"#, binary))
            .create_async()
            .await;

        let store = store(&server);
        assert!(matches!(
            store.read_file("big.bin").await,
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            store.read_file("logo.png").await,
            Err(Error::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_maps_status_codes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/octo/demo/contents/missing.txt")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/octo/demo/contents/secret.txt")
            .with_status(403)
            .with_body(r#"{"message":"Resource not accessible"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/octo/demo/contents/flaky.txt")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let store = store(&server);
        assert_eq!(
            store.read_file("missing.txt").await.unwrap_err(),
            Error::NotFound("missing.txt".into())
        );
        assert!(matches!(
            store.read_file("secret.txt").await,
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            store.read_file("flaky.txt").await,
            Err(Error::Network(msg)) if msg.contains("502")
        ));
    }

    #[tokio::test]
    async fn test_write_sends_base64_and_expected_sha() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/repos/octo/demo/contents/README.md")
            .match_body(Matcher::Json(serde_json::json!({
                "message": "Update README",
                "content": BASE64.encode("# Hello"),
                "sha": "old-sha"
            })))
            .with_body(r#"{"content":{"sha":"new-sha"},"commit":{"sha":"c1"}}"#)
            .create_async()
            .await;

        let version = store(&server)
            .write_file(WriteRequest {
                path: "README.md",
                content: "# Hello",
                expected_version: &VersionToken::new("old-sha"),
                message: "Update README",
            })
            .await
            .unwrap();

        put.assert_async().await;
        assert_eq!(version, VersionToken::new("new-sha"));
    }

    #[tokio::test]
    async fn test_stale_sha_is_a_conflict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/repos/octo/demo/contents/a.txt")
            .with_status(409)
            .with_body(r#"{"message":"a.txt does not match 1234"}"#)
            .create_async()
            .await;
        server
            .mock("PUT", "/repos/octo/demo/contents/b.txt")
            .with_status(422)
            .with_body(r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#)
            .create_async()
            .await;

        let store = store(&server);
        let v1 = VersionToken::new("v1");
        for path in ["a.txt", "b.txt"] {
            let err = store
                .write_file(WriteRequest {
                    path,
                    content: "x",
                    expected_version: &v1,
                    message: "msg",
                })
                .await
                .unwrap_err();
            assert_eq!(
                err,
                Error::Conflict {
                    path: path.to_string(),
                    expected: "v1".to_string()
                }
            );
        }
    }

    #[test]
    fn test_error_bodies_are_sanitized() {
        let err = status_error(
            StatusCode::UNAUTHORIZED,
            r#"{"message":"Bad credentials"}"#,
            "a.txt",
            None,
        );
        match err {
            Error::PermissionDenied(msg) => assert!(msg.starts_with("Bad credentials")),
            other => panic!("unexpected {:?}", other),
        }

        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"message":"token ghp_abc123 is malformed"}"#,
            "a.txt",
            None,
        );
        match err {
            Error::Network(msg) => {
                assert!(!msg.contains("ghp_abc123"));
                assert!(msg.contains("redacted"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
