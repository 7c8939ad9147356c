// spider_chrome re-exports chromiumoxide API
use crate::config::SessionConfig;
use crate::driver::{BrowserDriver, By, Key, SessionFactory, WindowHandle};
use crate::error::{AutomationError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts made while a freshly opened target is still being attached.
const ATTACH_ATTEMPTS: usize = 20;
const ATTACH_INTERVAL: Duration = Duration::from_millis(100);

const SYNTHETIC_CLICK_FN: &str = "function() { this.click(); }";

const CLEAR_FN: &str = r#"function() {
    if ('value' in this) {
        this.value = '';
        this.dispatchEvent(new Event('input', { bubbles: true }));
        this.dispatchEvent(new Event('change', { bubbles: true }));
    }
}"#;

const CLICKABLE_FN: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0
        && rect.height > 0
        && style.visibility !== 'hidden'
        && style.display !== 'none'
        && !this.disabled;
}"#;

/// Attribute briefly set on XPath hits inside a scope so CSS can collect them.
const SCOPE_MARK: &str = "data-n8n-automation-hit";

/// Marks every element below `this` that the XPath (evaluated relative to `this`) selects.
fn mark_xpath_fn(path: &str) -> Result<String> {
    // Absolute paths would escape the context node
    let relative = if path.starts_with('/') {
        format!(".{path}")
    } else {
        path.to_string()
    };
    let literal = serde_json::to_string(&relative)
        .map_err(|e| AutomationError::Other(format!("Unencodable XPath {}: {}", path, e)))?;

    Ok(format!(
        r#"function() {{
    const hits = document.evaluate({literal}, this, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    for (let i = 0; i < hits.snapshotLength; i++) {{
        const node = hits.snapshotItem(i);
        if (node.nodeType === Node.ELEMENT_NODE && node !== this && this.contains(node)) {{
            node.setAttribute('{SCOPE_MARK}', '');
        }}
    }}
}}"#
    ))
}

fn unmark_fn() -> String {
    format!(
        r#"function() {{
    this.querySelectorAll('[{SCOPE_MARK}]').forEach(node => node.removeAttribute('{SCOPE_MARK}'));
}}"#
    )
}

/// Throwaway Chrome profile directory, removed when dropped.
#[derive(Debug)]
struct ProfileDir(PathBuf);

impl ProfileDir {
    fn create() -> Result<Self> {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);

        // Unique per session so runs never share state
        let unique_id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let path = std::env::temp_dir().join(format!(
            "n8n-automation-{}-{}-{}",
            std::process::id(),
            unique_id,
            SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&path).map_err(|e| {
            AutomationError::SessionSetupFailed(format!("Failed to create profile directory: {}", e))
        })?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        if self.0.exists() {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}

/// Handle to an element in a Chrome page.
#[derive(Clone)]
pub struct ChromeElement(Arc<Element>);

impl fmt::Debug for ChromeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChromeElement")
            .field(&self.0.backend_node_id)
            .finish()
    }
}

/// Chrome session driven over the DevTools protocol.
///
/// The driver tracks one "current" page the way a WebDriver session tracks its
/// current window; [`BrowserDriver::switch_to_window`] re-points it.
pub struct ChromeDriver {
    browser: Mutex<Option<Browser>>,
    current: Mutex<Page>,
    handler: JoinHandle<()>,
    // Dropped after the browser fields, so the profile outlives the process using it
    _profile: ProfileDir,
}

impl ChromeDriver {
    /// Launch Chrome with the session's fixed capabilities.
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        let profile = ProfileDir::create()?;

        let (width, height) = config.window;
        let mut builder = if config.headless {
            BrowserConfig::builder()
        } else {
            BrowserConfig::builder().with_head()
        };
        builder = builder
            .user_data_dir(profile.path())
            .window_size(width, height)
            .arg(format!("--window-size={},{}", width, height));

        if config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if config.disable_gpu {
            builder = builder.arg("--disable-gpu");
        }
        if config.disable_dev_shm {
            builder = builder.arg("--disable-dev-shm-usage");
        }
        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(|e| {
            AutomationError::SessionSetupFailed(format!("Invalid browser configuration: {}", e))
        })?;

        let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            AutomationError::SessionSetupFailed(format!(
                "{}. Install Chrome or pass --chrome-path /path/to/chrome",
                e
            ))
        })?;

        let handler = tokio::spawn(async move {
            while (handler.next().await).is_some() {
                // Drive the CDP connection
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                // No driver exists yet to tear this down; the profile goes with `profile`
                let _ = browser.close().await;
                handler.abort();
                return Err(AutomationError::SessionSetupFailed(format!(
                    "Failed to open initial page: {}",
                    e
                )));
            }
        };

        log::info!(
            "Chrome session started ({}x{}, headless={})",
            width,
            height,
            config.headless
        );

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            current: Mutex::new(page),
            handler,
            _profile: profile,
        })
    }

    /// XPath matches below `root`. CDP only searches XPath document-wide, so
    /// the hits are tagged in the page and collected with a scoped CSS query.
    async fn find_xpaths_within(root: &ChromeElement, path: &str) -> Result<Vec<ChromeElement>> {
        root.0.call_js_fn(mark_xpath_fn(path)?, false).await?;
        let found = root.0.find_elements(format!("[{SCOPE_MARK}]")).await;
        root.0.call_js_fn(unmark_fn(), false).await?;

        Ok(found?
            .into_iter()
            .map(|element| ChromeElement(Arc::new(element)))
            .collect())
    }

    async fn page(&self) -> Page {
        self.current.lock().await.clone()
    }

    fn handle_of(page: &Page) -> WindowHandle {
        WindowHandle::new(page.target_id().inner().clone())
    }

    /// Find the attached page for `handle`, waiting briefly for new targets.
    async fn find_page(&self, handle: &WindowHandle) -> Result<Page> {
        for _ in 0..ATTACH_ATTEMPTS {
            {
                let guard = self.browser.lock().await;
                let browser = guard
                    .as_ref()
                    .ok_or_else(|| AutomationError::Driver("Browser already closed".to_string()))?;
                let pages = browser.pages().await?;
                if let Some(page) = pages
                    .into_iter()
                    .find(|p| p.target_id().inner() == handle.as_str())
                {
                    return Ok(page);
                }
            }
            tokio::time::sleep(ATTACH_INTERVAL).await;
        }

        Err(AutomationError::Driver(format!(
            "No attached page for window {}",
            handle
        )))
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    type Element = ChromeElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        // Normalize URL - add https:// if no protocol specified
        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        let page = self.page().await;
        log::debug!("Navigating to {}", normalized_url);

        match tokio::time::timeout(NAVIGATION_TIMEOUT, page.goto(normalized_url.as_str())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                // "oneshot canceled" means the CDP connection is gone
                if e.to_string().contains("oneshot canceled") {
                    Err(AutomationError::Driver(
                        "Browser connection lost during navigation".to_string(),
                    ))
                } else {
                    Err(AutomationError::Driver(format!(
                        "Failed to navigate to {}: {}",
                        normalized_url, e
                    )))
                }
            }
            Err(_) => Err(AutomationError::Driver(format!(
                "Navigation to {} did not finish within {}s",
                normalized_url,
                NAVIGATION_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.page().await;
        Ok(page
            .url()
            .await?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn find_elements(
        &self,
        by: &By,
        scope: Option<&ChromeElement>,
    ) -> Result<Vec<ChromeElement>> {
        let found = match (by, scope) {
            (By::Css(selector), Some(root)) | (By::TagName(selector), Some(root)) => {
                root.0.find_elements(selector.as_str()).await?
            }
            (By::Css(selector), None) | (By::TagName(selector), None) => {
                self.page().await.find_elements(selector.as_str()).await?
            }
            (By::XPath(path), Some(root)) => return Self::find_xpaths_within(root, path).await,
            (By::XPath(path), None) => self.page().await.find_xpaths(path.as_str()).await?,
        };

        Ok(found
            .into_iter()
            .map(|element| ChromeElement(Arc::new(element)))
            .collect())
    }

    async fn click(&self, element: &ChromeElement) -> Result<()> {
        element.0.click().await?;
        Ok(())
    }

    async fn synthetic_click(&self, element: &ChromeElement) -> Result<()> {
        element.0.call_js_fn(SYNTHETIC_CLICK_FN, false).await?;
        Ok(())
    }

    async fn clear(&self, element: &ChromeElement) -> Result<()> {
        element.0.call_js_fn(CLEAR_FN, false).await?;
        Ok(())
    }

    async fn type_text(&self, element: &ChromeElement, text: &str) -> Result<()> {
        element.0.focus().await?;
        element.0.type_str(text).await?;
        Ok(())
    }

    async fn press_key(&self, element: &ChromeElement, key: Key) -> Result<()> {
        element.0.focus().await?;
        element.0.press_key(key.name()).await?;
        Ok(())
    }

    async fn text(&self, element: &ChromeElement) -> Result<String> {
        Ok(element.0.inner_text().await?.unwrap_or_default())
    }

    async fn attribute(&self, element: &ChromeElement, name: &str) -> Result<Option<String>> {
        Ok(element.0.attribute(name).await?)
    }

    async fn is_clickable(&self, element: &ChromeElement) -> Result<bool> {
        let returns = element.0.call_js_fn(CLICKABLE_FN, false).await?;
        Ok(matches!(
            returns.result.value,
            Some(serde_json::Value::Bool(true))
        ))
    }

    async fn scroll_into_view(&self, element: &ChromeElement) -> Result<()> {
        element.0.scroll_into_view().await?;
        Ok(())
    }

    async fn active_element(&self) -> Result<ChromeElement> {
        let page = self.page().await;
        let element = match page.find_element(":focus").await {
            Ok(element) => element,
            Err(_) => page.find_element("body").await?,
        };
        Ok(ChromeElement(Arc::new(element)))
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>> {
        let mut guard = self.browser.lock().await;
        let browser = guard
            .as_mut()
            .ok_or_else(|| AutomationError::Driver("Browser already closed".to_string()))?;

        let targets = browser.fetch_targets().await?;
        Ok(targets
            .into_iter()
            .filter(|target| target.r#type == "page")
            .map(|target| WindowHandle::new(target.target_id.inner().clone()))
            .collect())
    }

    async fn current_window(&self) -> Result<WindowHandle> {
        Ok(Self::handle_of(&*self.current.lock().await))
    }

    async fn switch_to_window(&self, handle: &WindowHandle) -> Result<()> {
        if Self::handle_of(&*self.current.lock().await) == *handle {
            return Ok(());
        }

        let page = self.find_page(handle).await?;
        page.bring_to_front().await?;
        *self.current.lock().await = page;
        log::debug!("Switched to window {}", handle);
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        let closed = browser.close().await;
        let _ = browser.wait().await;
        self.handler.abort();
        closed?;

        log::info!("Chrome session closed");
        Ok(())
    }
}

/// [`SessionFactory`] launching a fresh Chrome per run.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: SessionConfig,
}

impl ChromeLauncher {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for ChromeLauncher {
    type Driver = ChromeDriver;

    async fn open(&self) -> Result<ChromeDriver> {
        ChromeDriver::launch(&self.config).await
    }
}
