//! The progress watermark and its two durable backends.
//!
//! A run reads the watermark once at start and writes it at most once at the
//! end. Both backends map "nothing stored yet" to [`Watermark::MIN`], so the
//! first run processes the whole feed backlog.
//!
//! Neither backend locks: two overlapping runs would race and the last writer
//! wins. The external scheduler must guarantee that runs do not overlap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{GithubVariableConfig, StateBackend};
use crate::contract::WatermarkStore;
use crate::error::{Error, Result};

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Point in time up to which feed items have been turned into a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// The "never ran" sentinel. Every dated entry is newer than this.
    pub const MIN: Watermark = Watermark(DateTime::<Utc>::MIN_UTC);

    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn is_min(&self) -> bool {
        *self == Self::MIN
    }

    /// Strictly newer only: an entry published exactly at the watermark was
    /// already covered by the run that wrote it.
    pub fn admits(&self, published: DateTime<Utc>) -> bool {
        published > self.0
    }

    /// Accepts RFC 3339 and naive ISO-8601 (`2024-05-01T10:00:00.123456`).
    /// Naive values are read as UTC.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self(at.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Self(naive.and_utc()))
            .map_err(|source| Error::Watermark {
                value: value.to_string(),
                source,
            })
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_min() {
            f.write_str("<never>")
        } else {
            f.write_str(&self.to_rfc3339())
        }
    }
}

/// Builds the store selected by configuration.
pub fn build_store(backend: &StateBackend) -> Result<Box<dyn WatermarkStore>> {
    Ok(match backend {
        StateBackend::File { path } => Box::new(FileWatermarkStore::new(path)),
        StateBackend::Github(cfg) => Box::new(GithubVariableStore::new(cfg.clone())?),
    })
}

/// On-disk format: `{"last_update": "<ISO-8601>"}`.
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    last_update: String,
}

/// Keeps the watermark in a local JSON file. A missing file means "never ran".
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self) -> Result<Watermark> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file yet, starting from the beginning");
                return Ok(Watermark::MIN);
            }
            Err(e) => return Err(e.into()),
        };
        let state: StateFile = serde_json::from_str(&content)?;
        let watermark = Watermark::parse(&state.last_update)?;
        debug!(path = %self.path.display(), %watermark, "Loaded watermark from file");
        Ok(watermark)
    }

    async fn save(&self, watermark: Watermark) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_string(&StateFile {
            last_update: watermark.to_rfc3339(),
        })?;

        // Write-then-rename so a crash never leaves a half-written state file.
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        info!(path = %self.path.display(), %watermark, "Saved watermark to file");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Variable {
    name: String,
    value: String,
}

/// Keeps the watermark in a GitHub Actions repository variable.
pub struct GithubVariableStore {
    client: Client,
    config: GithubVariableConfig,
    api_base: String,
}

impl GithubVariableStore {
    pub fn new(config: GithubVariableConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("feed-campaign/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            api_base: GITHUB_API_URL.to_string(),
        })
    }

    /// Points the store at another API root (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn variables_url(&self) -> String {
        format!(
            "{}/repos/{}/actions/variables",
            self.api_base, self.config.repository
        )
    }

    fn variable_url(&self) -> String {
        format!("{}/{}", self.variables_url(), self.config.variable)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }
}

#[async_trait]
impl WatermarkStore for GithubVariableStore {
    async fn load(&self) -> Result<Watermark> {
        let response = self
            .request(reqwest::Method::GET, self.variable_url())
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            info!(
                repository = %self.config.repository,
                variable = %self.config.variable,
                "Repository variable not set, starting from the beginning"
            );
            return Ok(Watermark::MIN);
        }
        let response = Error::check_status("load repository variable", response).await?;
        let variable: Variable = response.json().await?;
        let watermark = Watermark::parse(&variable.value)?;
        debug!(variable = %variable.name, %watermark, "Loaded watermark from repository variable");
        Ok(watermark)
    }

    async fn save(&self, watermark: Watermark) -> Result<()> {
        let body = Variable {
            name: self.config.variable.clone(),
            value: watermark.to_rfc3339(),
        };
        let response = self
            .request(reqwest::Method::PATCH, self.variable_url())
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(variable = %self.config.variable, "Repository variable missing, creating it");
            let response = self
                .request(reqwest::Method::POST, self.variables_url())
                .json(&body)
                .send()
                .await?;
            Error::check_status("create repository variable", response).await?;
        } else {
            Error::check_status("update repository variable", response).await?;
        }

        info!(
            repository = %self.config.repository,
            variable = %self.config.variable,
            %watermark,
            "Saved watermark to repository variable"
        );
        Ok(())
    }
}
