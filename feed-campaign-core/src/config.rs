use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_SUBJECT: &str = "Latest Updates from RSS Feed";
pub const DEFAULT_DELAY_MINUTES: i64 = 30;
/// Ten years; anything longer is a typo, not a schedule.
pub const MAX_DELAY_MINUTES: i64 = 10 * 365 * 24 * 60;
pub const DEFAULT_STATE_FILE: &str = "last_update.json";
pub const DEFAULT_VARIABLE_NAME: &str = "LAST_UPDATE";
pub const DEFAULT_TEMPLATE_FILE: &str = "template.md.j2";

/// Everything a run needs, built once at startup and passed down by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    pub feed_url: String,
    pub template_path: PathBuf,
    pub state: StateBackend,
    /// Absent only when the run cannot publish (dry run without service settings).
    pub listmonk: Option<ListmonkConfig>,
    pub campaign: CampaignConfig,
    pub notify: Option<NotifyConfig>,
}

/// Where the watermark lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackend {
    File { path: PathBuf },
    Github(GithubVariableConfig),
}

#[derive(Clone, PartialEq, Eq)]
pub struct GithubVariableConfig {
    /// `owner/name`
    pub repository: String,
    pub token: String,
    pub variable: String,
}

impl fmt::Debug for GithubVariableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubVariableConfig")
            .field("repository", &self.repository)
            .field("token", &"<redacted>")
            .field("variable", &self.variable)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ListmonkConfig {
    pub host: String,
    pub api_user: String,
    pub api_token: String,
    pub list_name: String,
}

impl fmt::Debug for ListmonkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListmonkConfig")
            .field("host", &self.host)
            .field("api_user", &self.api_user)
            .field("api_token", &"<redacted>")
            .field("list_name", &self.list_name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignConfig {
    pub subject: String,
    pub delay_minutes: i64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            delay_minutes: DEFAULT_DELAY_MINUTES,
        }
    }
}

/// Pushover credentials. Notification is enabled only when both are present.
#[derive(Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub user_key: String,
    pub api_token: String,
}

impl fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyConfig").finish_non_exhaustive()
    }
}

impl Settings {
    pub fn trace_loaded(&self) {
        info!(
            feed_url = %self.feed_url,
            template = %self.template_path.display(),
            state_backend = self.state.kind(),
            publishing = self.listmonk.is_some(),
            notify = self.notify.is_some(),
            delay_minutes = self.campaign.delay_minutes,
            "Loaded Settings"
        );
        debug!(?self, "Settings loaded (full debug)");
    }
}

impl StateBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            StateBackend::File { .. } => "file",
            StateBackend::Github(_) => "github",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secrets() {
        let listmonk = ListmonkConfig {
            host: "https://lists.example.com".into(),
            api_user: "api".into(),
            api_token: "s3cret-token".into(),
            list_name: "Newsletter".into(),
        };
        let github = GithubVariableConfig {
            repository: "me/blog".into(),
            token: "ghp_secret".into(),
            variable: DEFAULT_VARIABLE_NAME.into(),
        };
        let notify = NotifyConfig {
            user_key: "user-secret".into(),
            api_token: "push-secret".into(),
        };

        let rendered = format!("{listmonk:?} {github:?} {notify:?}");
        assert!(!rendered.contains("s3cret-token"));
        assert!(!rendered.contains("ghp_secret"));
        assert!(!rendered.contains("push-secret"));
        assert!(rendered.contains("Newsletter"));
    }
}
