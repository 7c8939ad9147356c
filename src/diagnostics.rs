//! Page control inventory
//!
//! When a workflow aborts, the buttons and inputs visible on the page are
//! listed so the failing selectors can be compared against what the UI
//! actually rendered.

use crate::driver::{BrowserDriver, By};
use serde::{Deserialize, Serialize};

/// Tags collected, in report order.
const CONTROL_TAGS: [&str; 2] = ["button", "input"];

/// Limit per tag
const MAX_PER_TAG: usize = 50;

const MAX_TEXT_CHARS: usize = 100;

/// A visible interactive element on the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageControl {
    pub tag: String,
    pub text: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// Collect visible buttons and inputs. Never fails; unreadable elements are skipped.
pub async fn collect_controls<D: BrowserDriver>(driver: &D) -> Vec<PageControl> {
    let mut controls = Vec::new();

    for tag in CONTROL_TAGS {
        let elements = match driver.find_elements(&By::TagName(tag.to_string()), None).await {
            Ok(elements) => elements,
            Err(e) => {
                log::debug!("Could not list <{}> elements: {}", tag, e);
                continue;
            }
        };

        let mut seen = 0;
        for element in elements {
            if seen >= MAX_PER_TAG {
                break;
            }
            if !driver.is_clickable(&element).await.unwrap_or(false) {
                continue;
            }
            seen += 1;

            controls.push(PageControl {
                tag: tag.to_string(),
                text: truncate(driver.text(&element).await.unwrap_or_default().trim()),
                input_type: non_empty_attribute(driver, &element, "type").await,
                class: non_empty_attribute(driver, &element, "class").await,
                test_id: non_empty_attribute(driver, &element, "data-test-id").await,
                title: non_empty_attribute(driver, &element, "title").await,
                placeholder: non_empty_attribute(driver, &element, "placeholder").await,
            });
        }
    }

    log::info!("Collected {} visible controls", controls.len());
    controls
}

async fn non_empty_attribute<D: BrowserDriver>(
    driver: &D,
    element: &D::Element,
    name: &str,
) -> Option<String> {
    driver
        .attribute(element, name)
        .await
        .ok()
        .flatten()
        .filter(|value| !value.is_empty())
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}
