//! Runtime configuration
//!
//! Target-application constants (URLs, sign-in credentials, OAuth client data)
//! are inputs, not engine logic. They are collected from command-line flags or
//! `N8N_*` environment variables and folded into an [`AutomationConfig`].

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

/// Everything a workflow run needs from the environment.
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub target: TargetConfig,
    pub session: SessionConfig,
    pub timing: Timing,
}

/// The n8n instance being driven.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub base_url: String,
    /// Path of the credentials page, relative to `base_url`
    pub credentials_path: String,
    pub email: String,
    pub password: String,
    pub oauth: OAuthClientConfig,
}

impl TargetConfig {
    /// Absolute URL of the credentials page.
    pub fn credentials_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.credentials_path.trim_start_matches('/')
        )
    }
}

/// Values entered into the new OAuth credential form.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Query typed into the credential-type picker
    pub credential_type: String,
}

/// Fixed browser capabilities for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub no_sandbox: bool,
    pub disable_gpu: bool,
    pub disable_dev_shm: bool,
    pub window: (u32, u32),
    pub chrome_path: Option<PathBuf>,
    /// Delay before teardown so clipboard writes and late navigations settle
    pub grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: false,
            no_sandbox: true,
            disable_gpu: true,
            disable_dev_shm: true,
            window: (1920, 1080),
            chrome_path: None,
            grace: Duration::from_secs(5),
        }
    }
}

/// Wait budgets and settle pauses used by the step tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Default element wait: the locate budget of every step
    pub element_timeout: Duration,
    /// Short checks for UI that may legitimately never appear (modals, form markers)
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub scroll_settle: Duration,
    pub action_settle: Duration,
    pub key_pause: Duration,
    pub new_window_timeout: Duration,
    pub window_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
            scroll_settle: Duration::from_secs(1),
            action_settle: Duration::from_secs(2),
            key_pause: Duration::from_secs(5),
            new_window_timeout: Duration::from_secs(10),
            window_settle: Duration::from_secs(3),
        }
    }
}

impl Timing {
    /// Short budgets and no settle pauses, for scripted drivers.
    pub fn instant() -> Self {
        Self {
            element_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            scroll_settle: Duration::ZERO,
            action_settle: Duration::ZERO,
            key_pause: Duration::ZERO,
            new_window_timeout: Duration::from_millis(200),
            window_settle: Duration::from_millis(50),
        }
    }
}

/// Command-line / environment form of [`AutomationConfig`].
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Base URL of the n8n instance
    #[arg(long, env = "N8N_BASE_URL", default_value = "https://n8n.realtyamp.ai")]
    pub base_url: String,

    /// Credentials page path, relative to the base URL
    #[arg(
        long,
        env = "N8N_CREDENTIALS_PATH",
        default_value = "projects/N5IZDJlcXNhJSNRP/credentials/create"
    )]
    pub credentials_path: String,

    /// Sign-in email
    #[arg(long, env = "N8N_EMAIL", default_value = "")]
    pub email: String,

    /// Sign-in password
    #[arg(long, env = "N8N_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// OAuth client id entered into the new credential
    #[arg(long, env = "N8N_OAUTH_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// OAuth client secret entered into the new credential
    #[arg(
        long,
        env = "N8N_OAUTH_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    pub client_secret: String,

    /// Credential type searched for in the picker
    #[arg(long, env = "N8N_CREDENTIAL_TYPE", default_value = "Gmail OAuth2 API")]
    pub credential_type: String,

    /// Run Chrome without a visible window
    #[arg(long, env = "N8N_HEADLESS")]
    pub headless: bool,

    /// Chrome executable to launch instead of the detected one
    #[arg(long, env = "N8N_CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Seconds each step waits for its element before giving up
    #[arg(long, env = "N8N_ELEMENT_TIMEOUT_SECS", default_value_t = 15)]
    pub element_timeout_secs: u64,

    /// Seconds to keep the browser open after a run before teardown
    #[arg(long, env = "N8N_GRACE_SECS", default_value_t = 5)]
    pub grace_secs: u64,
}

impl ConfigArgs {
    pub fn into_config(self) -> AutomationConfig {
        AutomationConfig {
            target: TargetConfig {
                base_url: self.base_url,
                credentials_path: self.credentials_path,
                email: self.email,
                password: self.password,
                oauth: OAuthClientConfig {
                    client_id: self.client_id,
                    client_secret: self.client_secret,
                    credential_type: self.credential_type,
                },
            },
            session: SessionConfig {
                headless: self.headless,
                chrome_path: self.chrome_path,
                grace: Duration::from_secs(self.grace_secs),
                ..SessionConfig::default()
            },
            timing: Timing {
                element_timeout: Duration::from_secs(self.element_timeout_secs),
                ..Timing::default()
            },
        }
    }
}
