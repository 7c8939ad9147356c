//! Selector strategy chains
//!
//! The target UI ships hashed, versioned class names and rearranges markup
//! between releases, so every element is described by an ordered list of
//! [`SelectorStrategy`] values. A chain is evaluated left to right, one strategy
//! at a time, and the first strategy producing a match wins. Errors raised by a
//! single strategy (bad selector syntax, stale node) count as a non-match.

use crate::driver::{BrowserDriver, By};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a strategy finds its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    XPath(String),
    /// Elements of `tag` whose normalized text contains any keyword (case-insensitive)
    Text { tag: String, keywords: Vec<String> },
    /// Elements of `tag` where any listed attribute contains any keyword (case-insensitive)
    Attribute {
        tag: String,
        attributes: Vec<String>,
        keywords: Vec<String>,
    },
    /// The `index`-th match of a CSS selector, optionally required to be an input of `input_type`
    Ordinal {
        css: String,
        index: usize,
        input_type: Option<String>,
    },
}

/// A named, immutable way of locating one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorStrategy {
    pub name: String,
    pub locator: Locator,
}

impl SelectorStrategy {
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
        }
    }

    /// Strategy named after its own CSS selector.
    pub fn css(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        Self::new(format!("css:{selector}"), Locator::Css(selector))
    }

    pub fn xpath(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(format!("xpath:{path}"), Locator::XPath(path))
    }

    pub fn text(tag: impl Into<String>, keywords: &[&str]) -> Self {
        let tag = tag.into();
        Self::new(
            format!("text:{tag}~{}", keywords.join("|")),
            Locator::Text {
                tag,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            },
        )
    }

    pub fn attribute(tag: impl Into<String>, attributes: &[&str], keywords: &[&str]) -> Self {
        let tag = tag.into();
        Self::new(
            format!("attr:{tag}[{}]~{}", attributes.join(","), keywords.join("|")),
            Locator::Attribute {
                tag,
                attributes: attributes.iter().map(|a| a.to_string()).collect(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            },
        )
    }

    pub fn ordinal(css: impl Into<String>, index: usize, input_type: Option<&str>) -> Self {
        let css = css.into();
        let suffix = input_type.map(|t| format!("[type={t}]")).unwrap_or_default();
        Self::new(
            format!("nth:{css}#{index}{suffix}"),
            Locator::Ordinal {
                css,
                index,
                input_type: input_type.map(str::to_string),
            },
        )
    }

    /// Every element this strategy matches, in document order.
    pub async fn find_all<D: BrowserDriver>(
        &self,
        driver: &D,
        scope: Option<&D::Element>,
    ) -> crate::error::Result<Vec<D::Element>> {
        match &self.locator {
            Locator::Css(selector) => driver.find_elements(&By::Css(selector.clone()), scope).await,
            Locator::XPath(path) => driver.find_elements(&By::XPath(path.clone()), scope).await,
            Locator::Text { tag, keywords } => {
                let candidates = driver.find_elements(&By::TagName(tag.clone()), scope).await?;
                let mut matched = Vec::new();
                for candidate in candidates {
                    let Ok(text) = driver.text(&candidate).await else {
                        continue;
                    };
                    if contains_any_keyword(&text, keywords) {
                        matched.push(candidate);
                    }
                }
                Ok(matched)
            }
            Locator::Attribute {
                tag,
                attributes,
                keywords,
            } => {
                let candidates = driver.find_elements(&By::TagName(tag.clone()), scope).await?;
                let mut matched = Vec::new();
                'candidates: for candidate in candidates {
                    for attribute in attributes {
                        if let Ok(Some(value)) = driver.attribute(&candidate, attribute).await {
                            if contains_any_keyword(&value, keywords) {
                                matched.push(candidate);
                                continue 'candidates;
                            }
                        }
                    }
                }
                Ok(matched)
            }
            Locator::Ordinal {
                css,
                index,
                input_type,
            } => {
                let candidates = driver.find_elements(&By::Css(css.clone()), scope).await?;
                let Some(candidate) = candidates.into_iter().nth(*index) else {
                    return Ok(Vec::new());
                };
                if let Some(expected) = input_type {
                    let actual = driver.attribute(&candidate, "type").await?;
                    if !actual.is_some_and(|t| t.eq_ignore_ascii_case(expected)) {
                        return Ok(Vec::new());
                    }
                }
                Ok(vec![candidate])
            }
        }
    }
}

impl fmt::Display for SelectorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Lowercases and collapses whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn contains_any_keyword(text: &str, keywords: &[String]) -> bool {
    let normalized = normalize_text(text);
    keywords
        .iter()
        .any(|keyword| normalized.contains(&normalize_text(keyword)))
}

/// The element a chain resolved to and the strategy that found it.
#[derive(Debug, Clone)]
pub struct ChainMatch<E> {
    pub element: E,
    pub strategy: String,
}

/// What a single pass over a chain saw.
#[derive(Debug, Clone, Default)]
pub struct ChainProbe {
    pub attempted: Vec<String>,
    pub last_error: Option<String>,
}

/// An ordered sequence of strategies for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyChain {
    strategies: Vec<SelectorStrategy>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<SelectorStrategy>) -> Self {
        Self { strategies }
    }

    /// Chain of plain CSS selectors.
    pub fn css(selectors: &[&str]) -> Self {
        Self::new(selectors.iter().map(|s| SelectorStrategy::css(*s)).collect())
    }

    /// Append a strategy, consuming the chain.
    pub fn or(mut self, strategy: SelectorStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategies(&self) -> &[SelectorStrategy] {
        &self.strategies
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn describe(&self) -> String {
        self.strategies
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// One left-to-right pass; returns the first element for which `accept` holds.
    ///
    /// `accept` lets callers add readiness checks (e.g. clickability) without
    /// letting a present-but-inert match from an earlier strategy shadow a
    /// usable one from a later strategy.
    pub async fn probe<D, F, Fut>(
        &self,
        driver: &D,
        scope: Option<&D::Element>,
        mut accept: F,
    ) -> (Option<ChainMatch<D::Element>>, ChainProbe)
    where
        D: BrowserDriver,
        F: FnMut(D::Element) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let mut probe = ChainProbe::default();

        for strategy in &self.strategies {
            probe.attempted.push(strategy.name.clone());
            match strategy.find_all(driver, scope).await {
                Ok(elements) => {
                    for element in elements {
                        if accept(element.clone()).await {
                            log::debug!("Strategy {} matched", strategy.name);
                            return (
                                Some(ChainMatch {
                                    element,
                                    strategy: strategy.name.clone(),
                                }),
                                probe,
                            );
                        }
                    }
                    log::debug!("Strategy {} found nothing usable", strategy.name);
                }
                Err(e) => {
                    log::debug!("Strategy {} errored, treated as no match: {}", strategy.name, e);
                    probe.last_error = Some(e.to_string());
                }
            }
        }

        (None, probe)
    }

    /// First element matched by the chain, or `None` once every strategy misses.
    pub async fn first_match<D: BrowserDriver>(
        &self,
        driver: &D,
        scope: Option<&D::Element>,
    ) -> (Option<ChainMatch<D::Element>>, ChainProbe) {
        self.probe(driver, scope, |_| async { true }).await
    }
}

impl From<Vec<SelectorStrategy>> for StrategyChain {
    fn from(strategies: Vec<SelectorStrategy>) -> Self {
        Self::new(strategies)
    }
}
