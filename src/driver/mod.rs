//! Browser automation driver interface
//!
//! The engine never talks to a browser directly. Everything it needs (finding
//! elements, acting on them, enumerating and switching windows) goes through
//! [`BrowserDriver`], so the same step tables run against Chrome or a scripted
//! stand-in.

pub mod chrome;

pub use chrome::{ChromeDriver, ChromeElement, ChromeLauncher};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw locating mechanism understood by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "value")]
pub enum By {
    Css(String),
    XPath(String),
    TagName(String),
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            By::Css(selector) => write!(f, "css={selector}"),
            By::XPath(path) => write!(f, "xpath={path}"),
            By::TagName(tag) => write!(f, "tag={tag}"),
        }
    }
}

/// Keys the workflows press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Enter,
    Tab,
}

impl Key {
    /// DOM `KeyboardEvent.key` name
    pub fn name(self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Tab => "Tab",
        }
    }
}

/// Opaque identifier of a browser window or tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub String);

impl WindowHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    type Element: Clone + Send + Sync + fmt::Debug;

    /// Load `url` in the current window.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Address of the current window.
    async fn current_url(&self) -> Result<String>;

    /// All elements matching `by`, searched within `scope` or the whole document.
    async fn find_elements(
        &self,
        by: &By,
        scope: Option<&Self::Element>,
    ) -> Result<Vec<Self::Element>>;

    /// Native pointer click at the element's center.
    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// Programmatic `click()` dispatched on the element itself.
    async fn synthetic_click(&self, element: &Self::Element) -> Result<()>;

    async fn clear(&self, element: &Self::Element) -> Result<()>;

    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<()>;

    async fn press_key(&self, element: &Self::Element, key: Key) -> Result<()>;

    /// Rendered text of the element.
    async fn text(&self, element: &Self::Element) -> Result<String>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    /// Whether the element is rendered, visible and enabled.
    async fn is_clickable(&self, element: &Self::Element) -> Result<bool>;

    async fn scroll_into_view(&self, element: &Self::Element) -> Result<()>;

    /// Element currently holding keyboard focus.
    async fn active_element(&self) -> Result<Self::Element>;

    async fn window_handles(&self) -> Result<Vec<WindowHandle>>;

    async fn current_window(&self) -> Result<WindowHandle>;

    async fn switch_to_window(&self, handle: &WindowHandle) -> Result<()>;

    /// Shut the browser down. Called once per session.
    async fn quit(&self) -> Result<()>;
}

/// Acquires browser sessions with fixed capabilities.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Driver: BrowserDriver + 'static;

    async fn open(&self) -> Result<Self::Driver>;
}
