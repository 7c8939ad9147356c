//! Following a window opened by an action
//!
//! The window set is captured before the triggering action; afterwards the
//! set difference names the new window. Whatever happens while reading it,
//! focus goes back to the window the step started in.

use crate::driver::{BrowserDriver, WindowHandle};
use crate::error::{AutomationError, Result};
use crate::wait::{poll_until, Budget};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffBudget {
    /// How long the new window may take to appear
    pub appear: Budget,
    /// How long the new window may take to leave `about:blank`
    pub settle: Duration,
}

/// Windows open before the triggering action, and the one in focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSet {
    pub original: WindowHandle,
    pub before: BTreeSet<WindowHandle>,
}

impl WindowSet {
    /// First handle in `now` that was not open before.
    pub fn new_window(&self, now: &[WindowHandle]) -> Option<WindowHandle> {
        now.iter().find(|h| !self.before.contains(*h)).cloned()
    }
}

pub async fn capture<D: BrowserDriver>(driver: &D) -> Result<WindowSet> {
    let original = driver.current_window().await.map_err(|e| {
        AutomationError::WindowHandoffFailed(format!("reading current window: {}", e))
    })?;
    let before = driver.window_handles().await.map_err(|e| {
        AutomationError::WindowHandoffFailed(format!("listing windows: {}", e))
    })?;

    Ok(WindowSet {
        original,
        before: before.into_iter().collect(),
    })
}

/// Wait for a window outside `set`, read its address, and return to `set.original`.
pub async fn resolve<D: BrowserDriver>(
    driver: &D,
    set: &WindowSet,
    budget: HandoffBudget,
) -> Result<String> {
    let opened = poll_until(budget.appear, "a new window", || async {
        let now = driver.window_handles().await.ok()?;
        set.new_window(&now)
    })
    .await
    .map_err(|_| {
        AutomationError::WindowHandoffFailed(format!(
            "no new window within {:?}",
            budget.appear.timeout
        ))
    })?;

    log::info!("New window opened: {}", opened);

    let read = read_address(driver, &opened, budget).await;
    let restored = driver.switch_to_window(&set.original).await;

    match (read, restored) {
        (Ok(url), Ok(())) => Ok(url),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore)) => {
            log::error!("Could not return to original window: {}", restore);
            Err(e)
        }
        (Ok(_), Err(restore)) => Err(AutomationError::WindowHandoffFailed(format!(
            "could not return to original window: {}",
            restore
        ))),
    }
}

async fn read_address<D: BrowserDriver>(
    driver: &D,
    window: &WindowHandle,
    budget: HandoffBudget,
) -> Result<String> {
    driver.switch_to_window(window).await.map_err(|e| {
        AutomationError::WindowHandoffFailed(format!("switching to {}: {}", window, e))
    })?;

    let loaded = Budget::new(budget.settle, budget.appear.poll);
    poll_until(loaded, "new window address", || async {
        driver
            .current_url()
            .await
            .ok()
            .filter(|url| !is_blank(url))
    })
    .await
    .map_err(|_| {
        AutomationError::WindowHandoffFailed(format!("window {} never left about:blank", window))
    })
}

fn is_blank(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url == "about:blank"
}
