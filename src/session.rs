//! Session lifecycle
//!
//! A [`Session`] owns one driver for one run. [`Session::close`] may be called
//! from any exit path; only the first call waits out the grace delay and quits
//! the browser.

use crate::driver::{BrowserDriver, SessionFactory};
use crate::error::{AutomationError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct Session<D: BrowserDriver> {
    driver: D,
    grace: Duration,
    closed: AtomicBool,
}

impl<D: BrowserDriver> Session<D> {
    pub fn new(driver: D, grace: Duration) -> Self {
        Self {
            driver,
            grace,
            closed: AtomicBool::new(false),
        }
    }

    /// Acquire a browser from `factory`.
    pub async fn open<F>(factory: &F, grace: Duration) -> Result<Self>
    where
        F: SessionFactory<Driver = D>,
    {
        let driver = factory.open().await.map_err(|e| match e {
            AutomationError::SessionSetupFailed(_) => e,
            other => AutomationError::SessionSetupFailed(other.to_string()),
        })?;
        Ok(Self::new(driver, grace))
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the browser down. Later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if !self.grace.is_zero() {
            log::info!("Keeping browser open for {:?} before teardown", self.grace);
            tokio::time::sleep(self.grace).await;
        }

        match self.driver.quit().await {
            Ok(()) => {
                log::info!("Browser session closed");
                Ok(())
            }
            Err(e) => {
                log::warn!("Browser teardown reported an error: {}", e);
                Err(e)
            }
        }
    }
}

impl<D: BrowserDriver> Drop for Session<D> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            log::warn!("Session dropped without being closed");
        }
    }
}
