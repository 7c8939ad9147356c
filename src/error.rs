use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("No selector strategy matched (tried: {})", attempted.join(", "))]
    LocatorNotFound {
        attempted: Vec<String>,
        last_error: Option<String>,
    },

    #[error("Interaction failed: {0}")]
    InteractionFailed(String),

    #[error("Timed out after {}ms waiting for {condition}", elapsed.as_millis())]
    WaitTimedOut { condition: String, elapsed: Duration },

    #[error("Failed to set up browser session: {0}")]
    SessionSetupFailed(String),

    #[error("Window handoff failed: {0}")]
    WindowHandoffFailed(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Workflow aborted by an unexpected fault: {0}")]
    Fault(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl AutomationError {
    /// Strategies attempted before the error, when the error came from a locator chain.
    pub fn attempted(&self) -> &[String] {
        match self {
            AutomationError::LocatorNotFound { attempted, .. } => attempted,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;
