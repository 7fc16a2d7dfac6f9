use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use beacon_core::config::HttpConfig;
use beacon_core::error::AppError;
use beacon_core::models::FileKind;
use beacon_core::traits::PlatformClient;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

/// Header carrying the Galaxy API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Response of `GET /api/whoami`.
///
/// Galaxy API reference: <https://docs.galaxyproject.org/en/master/api_doc.html>
#[derive(Deserialize, Debug)]
struct WhoAmI {
    username: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Debug)]
struct HistorySummary {
    id: String,
}

#[derive(Deserialize, Debug)]
struct HistoryDetails {
    user_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct UserDetails {
    #[serde(default)]
    preferences: HashMap<String, Value>,
}

/// HTTP client for the Galaxy API.
///
/// Every request carries the API key in the `x-api-key` header. Transient
/// failures (timeouts, connection errors, 5xx, 429) are retried with backoff;
/// any other 4xx fails immediately.
///
/// # Examples
///
/// ```no_run
/// use beacon_client::GalaxyClient;
/// use beacon_core::traits::PlatformClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let galaxy = GalaxyClient::new("https://usegalaxy.eu", "api-key")?;
/// let account = galaxy.whoami().await?;
/// println!("Logged in as {}", account);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GalaxyClient {
    client: Client,
    base_url: Url,
    api_key: String,
    http: HttpConfig,
}

impl GalaxyClient {
    /// Creates a client with the default HTTP settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the URL is malformed.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(base_url_str: &str, api_key: &str) -> Result<Self, AppError> {
        Self::with_config(base_url_str, api_key, HttpConfig::default())
    }

    /// Creates a client with explicit timeout and retry settings.
    ///
    /// A URL without a scheme is taken to be `https`.
    pub fn with_config(
        base_url_str: &str,
        api_key: &str,
        http: HttpConfig,
    ) -> Result<Self, AppError> {
        let base_url = parse_base_url(base_url_str)?;

        // Connect phase only; JSON requests set their own timeout.
        let client = Client::builder()
            .user_agent("GalaxyBeacon/0.1 (variant-importer)")
            .connect_timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::InvalidUrl(e.to_string()))
    }

    /// Builds the paged dataset listing URL for one history.
    fn datasets_url(
        &self,
        history_id: &str,
        kinds: &[FileKind],
        offset: usize,
        limit: usize,
    ) -> Result<Url, AppError> {
        let extensions = kinds
            .iter()
            .map(|k| k.extension())
            .collect::<Vec<_>>()
            .join(",");

        let mut url = self.endpoint("api/datasets")?;
        url.query_pairs_mut()
            .append_pair("history_id", history_id)
            .append_pair("q", "deleted")
            .append_pair("qv", "false")
            .append_pair("q", "extension-in")
            .append_pair("qv", &extensions)
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    fn get(&self, url: &Url) -> RequestBuilder {
        self.client
            .get(url.clone())
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, AppError> {
        let resp = self
            .request_with_retry(url, Some(self.http.timeout))
            .await?;
        resp.json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))
    }

    /// Makes an HTTP GET request with automatic retry on transient failures.
    ///
    /// Implements backoff for retries on:
    /// - Network errors
    /// - Timeouts
    /// - Server errors (5xx)
    /// - Rate limiting (429)
    async fn request_with_retry(
        &self,
        url: &Url,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, AppError> {
        let max_retries = self.http.max_retries.max(1);
        let base_delay = self.http.retry_base_delay;
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=max_retries {
            let mut request = self.get(url);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return Ok(resp);
                    }

                    // Rate limited - retry with backoff
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = AppError::RateLimitExceeded;
                        if attempt < max_retries {
                            sleep(base_delay * 2_u32.pow(attempt)).await;
                            continue;
                        }
                    }

                    // Server error - retry
                    if status.is_server_error() {
                        last_error = AppError::ClientError(format!(
                            "Server error: HTTP {}",
                            status.as_u16()
                        ));
                        if attempt < max_retries {
                            sleep(base_delay * attempt).await;
                            continue;
                        }
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        break;
                    }

                    // Client error (4xx except 429) - don't retry
                    return Err(AppError::ClientError(format!(
                        "HTTP {} from {}",
                        status.as_u16(),
                        url.path()
                    )));
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = AppError::Timeout(self.http.timeout.as_secs());
                    } else if e.is_connect() {
                        last_error = AppError::NetworkError(format!("Connection failed: {}", e));
                    } else {
                        last_error = AppError::ClientError(e.to_string());
                    }

                    if attempt < max_retries && (e.is_timeout() || e.is_connect()) {
                        sleep(base_delay * attempt).await;
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_error)
    }
}

impl PlatformClient for GalaxyClient {
    async fn whoami(&self) -> Result<String, AppError> {
        let me: WhoAmI = self.get_json(&self.endpoint("api/whoami")?).await?;
        me.username
            .or(me.email)
            .ok_or_else(|| AppError::ClientError("whoami returned no user".to_string()))
    }

    async fn list_collections(&self, name: &str) -> Result<Vec<String>, AppError> {
        let mut url = self.endpoint("api/histories")?;
        url.query_pairs_mut()
            .append_pair("q", "name")
            .append_pair("qv", name)
            .append_pair("all", "true")
            .append_pair("deleted", "false");

        let histories: Vec<HistorySummary> = self.get_json(&url).await?;
        Ok(histories.into_iter().map(|h| h.id).collect())
    }

    async fn owner_of(&self, collection_id: &str) -> Result<Option<String>, AppError> {
        let url = self.endpoint(&format!("api/histories/{}", collection_id))?;
        let history: HistoryDetails = self.get_json(&url).await?;
        Ok(history.user_id)
    }

    async fn sharing_preference(
        &self,
        owner_id: &str,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        let url = self.endpoint(&format!("api/users/{}", owner_id))?;
        let user: UserDetails = self.get_json(&url).await?;
        Ok(user.preferences.get(key).and_then(preference_text))
    }

    async fn list_datasets(
        &self,
        collection_id: &str,
        kinds: &[FileKind],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, AppError> {
        let url = self.datasets_url(collection_id, kinds, offset, limit)?;
        self.get_json(&url).await
    }

    async fn show_dataset(&self, dataset_id: &str) -> Result<Value, AppError> {
        let url = self.endpoint(&format!("api/datasets/{}", dataset_id))?;
        self.get_json(&url).await
    }

    async fn download(&self, dataset_id: &str, kind: FileKind, dest: &Path) -> Result<u64, AppError> {
        let mut url = self.endpoint(&format!("api/datasets/{}/display", dataset_id))?;
        url.query_pairs_mut().append_pair("to_ext", kind.extension());

        let mut resp = self.request_with_retry(&url, None).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded dataset {}: {} bytes", dataset_id, written);
        Ok(written)
    }
}

/// Normalizes the instance URL so that relative API paths join below it.
fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|_| AppError::InvalidUrl(format!("Invalid Galaxy URL: {}", raw)))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(AppError::InvalidUrl(format!("Invalid Galaxy URL: {}", raw)));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Preferences are strings, but older instances return booleans.
fn preference_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
