//! `load_config`: builds the run's [`Settings`] from an optional YAML file,
//! the environment and command-line overrides.
//!
//! Precedence, lowest to highest: YAML file, environment (including `.env`),
//! command-line flags. The YAML file is for non-secret settings only; API
//! tokens are always read from the environment.
//!
//! ```yaml
//! feed_url: https://blog.example.com/feed.xml
//! template: template.md.j2
//! listmonk_host: https://lists.example.com
//! list_name: Newsletter
//! subject: Latest Updates from RSS Feed
//! delay_minutes: 30
//! state:
//!   backend: github        # or: file
//!   path: last_update.json
//!   repository: me/blog
//!   variable: LAST_UPDATE
//! ```
//!
//! # Errors
//! Missing or malformed required settings become
//! [`feed_campaign_core::Error::Configuration`], wrapped in `anyhow::Error`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use feed_campaign_core::config::{
    CampaignConfig, GithubVariableConfig, ListmonkConfig, NotifyConfig, Settings, StateBackend,
    DEFAULT_DELAY_MINUTES, DEFAULT_STATE_FILE, DEFAULT_SUBJECT, DEFAULT_TEMPLATE_FILE,
    DEFAULT_VARIABLE_NAME, MAX_DELAY_MINUTES,
};
use feed_campaign_core::Error;
use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub feed_url: Option<String>,
    pub template: Option<PathBuf>,
    pub listmonk_host: Option<String>,
    pub list_name: Option<String>,
    pub subject: Option<String>,
    pub delay_minutes: Option<i64>,
    #[serde(default)]
    pub state: StateSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSection {
    pub backend: Option<String>,
    pub path: Option<PathBuf>,
    pub repository: Option<String>,
    pub variable: Option<String>,
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub dry_run: bool,
    pub state_file: Option<PathBuf>,
    pub template: Option<PathBuf>,
}

/// Loads settings from the optional YAML file and the process environment.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<Settings> {
    let file = match path {
        Some(path) => read_file_config(path)?,
        None => FileConfig::default(),
    };
    let settings = build_settings(file, |key| std::env::var(key).ok(), overrides)?;
    Ok(settings)
}

pub fn read_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;
    let config: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path, "Parsed config YAML successfully");
    Ok(config)
}

/// Merges file values, environment lookups and overrides into [`Settings`].
///
/// `env` returns the value of an environment variable; blank values count as unset.
pub fn build_settings<F>(file: FileConfig, env: F, overrides: &Overrides) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
    let missing = |key: &str| Error::configuration(format!("{key} is not set"));

    let feed_url = var("RSS_FEED")
        .or(file.feed_url)
        .ok_or_else(|| missing("RSS_FEED"))?;

    let template_path = overrides
        .template
        .clone()
        .or_else(|| var("TEMPLATE_FILE").map(PathBuf::from))
        .or(file.template)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_FILE));

    let delay_minutes = match var("DELAY_SEND_MINS").or_else(|| var("SEND_DELAY")) {
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            Error::configuration(format!("DELAY_SEND_MINS must be a whole number, got '{raw}'"))
        })?,
        None => file.delay_minutes.unwrap_or(DEFAULT_DELAY_MINUTES),
    };
    if delay_minutes < 0 {
        return Err(Error::configuration("DELAY_SEND_MINS must not be negative").into());
    }
    if delay_minutes > MAX_DELAY_MINUTES {
        return Err(Error::configuration(format!(
            "DELAY_SEND_MINS must be at most {MAX_DELAY_MINUTES}, got {delay_minutes}"
        ))
        .into());
    }
    let campaign = CampaignConfig {
        subject: var("SUBJECT_NAME")
            .or(file.subject)
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        delay_minutes,
    };

    let listmonk = match (
        var("LISTMONK_HOST").or(file.listmonk_host),
        var("LISTMONK_API_USER"),
        var("LISTMONK_API_TOKEN"),
        var("LIST_NAME").or(file.list_name),
    ) {
        (Some(host), Some(api_user), Some(api_token), Some(list_name)) => Some(ListmonkConfig {
            host,
            api_user,
            api_token,
            list_name,
        }),
        (host, user, token, list) if !overrides.dry_run => {
            let absent = [
                ("LISTMONK_HOST", host.is_none()),
                ("LISTMONK_API_USER", user.is_none()),
                ("LISTMONK_API_TOKEN", token.is_none()),
                ("LIST_NAME", list.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(key, _)| key)
            .collect::<Vec<_>>()
            .join(", ");
            return Err(Error::configuration(format!("{absent} not set")).into());
        }
        _ => None,
    };

    let state = match overrides.state_file.clone() {
        Some(path) => StateBackend::File { path },
        None => state_backend(file.state, &var)?,
    };

    let notify = match (var("PUSHOVER_USER_KEY"), var("PUSHOVER_API_TOKEN")) {
        (Some(user_key), Some(api_token)) => Some(NotifyConfig {
            user_key,
            api_token,
        }),
        (None, None) => None,
        _ => {
            warn!("Only one of PUSHOVER_USER_KEY / PUSHOVER_API_TOKEN is set, notifications disabled");
            None
        }
    };

    Ok(Settings {
        feed_url,
        template_path,
        state,
        listmonk,
        campaign,
        notify,
    })
}

fn state_backend<V>(section: StateSection, var: &V) -> Result<StateBackend>
where
    V: Fn(&str) -> Option<String>,
{
    let backend = var("STATE_BACKEND")
        .or(section.backend)
        .unwrap_or_else(|| "file".to_string());

    match backend.trim().to_ascii_lowercase().as_str() {
        "file" => Ok(StateBackend::File {
            path: var("STATE_FILE")
                .map(PathBuf::from)
                .or(section.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
        }),
        "github" => {
            let token = var("GH_TOKEN")
                .ok_or_else(|| Error::configuration("GH_TOKEN is not set"))?;
            let repository = var("GH_REPOSITORY")
                .or(section.repository)
                .ok_or_else(|| Error::configuration("GH_REPOSITORY is not set"))?;
            let variable = var("GH_VARIABLE")
                .or(section.variable)
                .unwrap_or_else(|| DEFAULT_VARIABLE_NAME.to_string());
            Ok(StateBackend::Github(GithubVariableConfig {
                repository,
                token,
                variable,
            }))
        }
        other => Err(Error::configuration(format!(
            "STATE_BACKEND must be 'file' or 'github', got '{other}'"
        ))
        .into()),
    }
}
