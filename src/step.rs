//! Interaction steps
//!
//! A step is one find-and-act unit: resolve a target through its strategy
//! chain (bounded by the step's budget), scroll it into view, apply the action,
//! optionally follow a popup window, then confirm the page moved on. Steps are
//! plain data ([`StepDescriptor`]); [`execute`] is the single interpreter.

use crate::driver::{BrowserDriver, Key};
use crate::error::{AutomationError, Result};
use crate::handoff;
use crate::locator::{ChainProbe, StrategyChain};
use crate::wait::{poll_until, wait_for, Budget, WaitSpec};
use crate::workflow::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Named group of steps; the unit a workflow reports when it aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Login,
    Navigate,
    OpenModal,
    RevealDetails,
    SelectCredentialType,
    FillFields,
    TriggerExternalAuth,
    ExtractResult,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Login => "login",
            Phase::Navigate => "navigate",
            Phase::OpenModal => "open-modal",
            Phase::RevealDetails => "reveal-details",
            Phase::SelectCredentialType => "select-credential-type",
            Phase::FillFields => "fill-fields",
            Phase::TriggerExternalAuth => "trigger-external-auth",
            Phase::ExtractResult => "extract-result",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State an element must reach before the step acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Present,
    Clickable,
}

/// What a step acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The page itself, no element
    Page,
    Element {
        chain: StrategyChain,
        readiness: Readiness,
    },
    /// Whatever currently has keyboard focus
    Focused,
}

impl Target {
    pub fn present(chain: StrategyChain) -> Self {
        Target::Element {
            chain,
            readiness: Readiness::Present,
        }
    }

    pub fn clickable(chain: StrategyChain) -> Self {
        Target::Element {
            chain,
            readiness: Readiness::Clickable,
        }
    }
}

/// Accepts strings that look like an identifier or token rather than UI copy.
///
/// This is a heuristic: a long enough alphanumeric label elsewhere on the page
/// passes it too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlausibilityFilter {
    /// Trimmed length must exceed this
    pub min_len: usize,
    /// Trimmed length must stay below this
    pub max_len: Option<usize>,
    /// Allow `_` and `-` besides alphanumerics
    pub allow_separators: bool,
}

impl PlausibilityFilter {
    pub const STRICT: Self = Self {
        min_len: 10,
        max_len: None,
        allow_separators: false,
    };

    /// Used by the last-resort scan.
    pub const LENIENT: Self = Self {
        min_len: 10,
        max_len: Some(50),
        allow_separators: true,
    };

    pub fn accepts(&self, candidate: &str) -> bool {
        let text = candidate.trim();
        let len = text.chars().count();

        len > self.min_len
            && self.max_len.map_or(true, |max| len < max)
            && text.chars().any(char::is_alphanumeric)
            && text.chars().all(|c| {
                c.is_alphanumeric() || (self.allow_separators && (c == '_' || c == '-'))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSpec {
    /// Tag scanned with [`PlausibilityFilter::LENIENT`] when the chain finds nothing plausible
    pub fallback_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    /// The element the step resolved
    Located,
    /// The element focused at the time of the press
    Focused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub on: KeyTarget,
    /// Pause after the press so the widget can react
    pub pause: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomAction {
    Navigate(String),
    PressKeys(Vec<KeyPress>),
    /// No interaction; the step only confirms its post-condition
    Await,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    TypeText { value: String, sensitive: bool },
    ExtractText(ExtractSpec),
    Custom(CustomAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Failure aborts the workflow
    Fatal,
    /// A timeout or miss is logged and the workflow proceeds unconfirmed;
    /// a failed interaction still aborts
    BestEffort,
}

/// Declarative description of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    pub name: String,
    pub phase: Phase,
    pub target: Target,
    pub action: Action,
    /// Container the target (and an extraction's chain) is searched within
    pub within: Option<StrategyChain>,
    /// Locate budget
    pub budget: Budget,
    /// Post-action condition
    pub confirm: Option<WaitSpec>,
    pub scroll_settle: Duration,
    pub settle: Duration,
    pub policy: FailurePolicy,
    /// Follow a window opened by the action, within this budget
    pub opens_window: Option<handoff::HandoffBudget>,
    pub advances_to: Option<Stage>,
}

impl StepDescriptor {
    pub fn new(
        name: impl Into<String>,
        phase: Phase,
        target: Target,
        action: Action,
        budget: Budget,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            target,
            action,
            within: None,
            budget,
            confirm: None,
            scroll_settle: Duration::ZERO,
            settle: Duration::ZERO,
            policy: FailurePolicy::Fatal,
            opens_window: None,
            advances_to: None,
        }
    }

    pub fn best_effort(mut self) -> Self {
        self.policy = FailurePolicy::BestEffort;
        self
    }

    /// Confine element lookups to the first match of `container`.
    pub fn within(mut self, container: StrategyChain) -> Self {
        self.within = Some(container);
        self
    }

    pub fn confirm(mut self, spec: WaitSpec) -> Self {
        self.confirm = Some(spec);
        self
    }

    pub fn scroll_settle(mut self, pause: Duration) -> Self {
        self.scroll_settle = pause;
        self
    }

    pub fn settle(mut self, pause: Duration) -> Self {
        self.settle = pause;
        self
    }

    pub fn opens_window(mut self, budget: handoff::HandoffBudget) -> Self {
        self.opens_window = Some(budget);
        self
    }

    pub fn advances_to(mut self, stage: Stage) -> Self {
        self.advances_to = Some(stage);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    NotFound,
    Timeout,
    InteractionError,
}

impl StepOutcome {
    /// Failures that leave the page state unknown rather than broken.
    pub fn is_inconclusive(self) -> bool {
        matches!(self, StepOutcome::Timeout | StepOutcome::NotFound)
    }
}

impl From<&AutomationError> for StepOutcome {
    fn from(error: &AutomationError) -> Self {
        match error {
            AutomationError::LocatorNotFound { .. } | AutomationError::WindowHandoffFailed(_) => {
                StepOutcome::NotFound
            }
            AutomationError::WaitTimedOut { .. } => StepOutcome::Timeout,
            _ => StepOutcome::InteractionError,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempted: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Diagnostics {
    fn is_empty(&self) -> bool {
        self.attempted.is_empty() && self.matched.is_none() && self.last_error.is_none()
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub phase: Phase,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    /// Failed, but the step is best-effort and the workflow went on
    #[serde(default)]
    pub tolerated: bool,
    pub elapsed_ms: u64,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Success
    }
}

/// Run one step to completion. Never panics on driver errors; every failure
/// becomes a non-success [`StepResult`].
pub async fn execute<D: BrowserDriver>(driver: &D, step: &StepDescriptor) -> StepResult {
    let started = Instant::now();
    log::info!("[{}] {}", step.phase, step.name);

    let mut diagnostics = Diagnostics::default();
    let result = perform(driver, step, &mut diagnostics).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let (outcome, value) = match result {
        Ok(value) => (StepOutcome::Success, value),
        Err(error) => {
            if diagnostics.attempted.is_empty() {
                diagnostics.attempted = error.attempted().to_vec();
            }
            if let AutomationError::LocatorNotFound {
                last_error: Some(inner),
                ..
            } = &error
            {
                diagnostics.last_error = Some(inner.clone());
            } else {
                diagnostics.last_error = Some(error.to_string());
            }
            log::debug!("[{}] {} failed: {}", step.phase, step.name, error);
            (StepOutcome::from(&error), None)
        }
    };

    StepResult {
        step: step.name.clone(),
        phase: step.phase,
        outcome,
        value,
        diagnostics: (!diagnostics.is_empty()).then_some(diagnostics),
        tolerated: false,
        elapsed_ms,
    }
}

async fn perform<D: BrowserDriver>(
    driver: &D,
    step: &StepDescriptor,
    diagnostics: &mut Diagnostics,
) -> Result<Option<String>> {
    if let Action::ExtractText(spec) = &step.action {
        return extract(driver, step, spec, diagnostics).await.map(Some);
    }

    let element = resolve_target(driver, step, diagnostics).await?;

    if let Some(element) = &element {
        if let Err(e) = driver.scroll_into_view(element).await {
            log::warn!("Could not scroll {} into view: {}", step.name, e);
        }
        pause(step.scroll_settle).await;
    }

    // The before-snapshot must precede the triggering action
    let windows = match step.opens_window {
        Some(_) => Some(handoff::capture(driver).await?),
        None => None,
    };

    apply(driver, step, element.as_ref()).await?;

    let mut value = None;
    if let (Some(windows), Some(budget)) = (windows, step.opens_window) {
        value = Some(handoff::resolve(driver, &windows, budget).await?);
    }

    pause(step.settle).await;

    if let Some(confirm) = &step.confirm {
        wait_for(driver, confirm).await?;
    }

    Ok(value)
}

async fn resolve_target<D: BrowserDriver>(
    driver: &D,
    step: &StepDescriptor,
    diagnostics: &mut Diagnostics,
) -> Result<Option<D::Element>> {
    let (chain, readiness) = match &step.target {
        Target::Page => return Ok(None),
        Target::Focused => return driver.active_element().await.map(Some),
        Target::Element { chain, readiness } => (chain, *readiness),
    };

    let last_probe = Mutex::new(ChainProbe::default());
    let what = chain.describe();

    let found = poll_until(step.budget, &what, || async {
        let scope = match scope_of(driver, step).await {
            Ok(scope) => scope,
            Err(probe) => {
                if let Ok(mut last) = last_probe.lock() {
                    *last = probe;
                }
                return None;
            }
        };
        let (found, probe) = match readiness {
            Readiness::Present => chain.first_match(driver, scope.as_ref()).await,
            Readiness::Clickable => {
                chain
                    .probe(driver, scope.as_ref(), |element| async move {
                        driver.is_clickable(&element).await.unwrap_or(false)
                    })
                    .await
            }
        };
        if let Ok(mut last) = last_probe.lock() {
            *last = probe;
        }
        found
    })
    .await;

    let probe = last_probe
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    diagnostics.attempted = probe.attempted;

    match found {
        Ok(found) => {
            log::debug!("{} located via {}", step.name, found.strategy);
            diagnostics.matched = Some(found.strategy);
            Ok(Some(found.element))
        }
        Err(_) => Err(AutomationError::LocatorNotFound {
            attempted: diagnostics.attempted.clone(),
            last_error: probe.last_error,
        }),
    }
}

/// The container a step's lookups are confined to, if it names one. `Err`
/// carries the probe of a container that is not on the page.
async fn scope_of<D: BrowserDriver>(
    driver: &D,
    step: &StepDescriptor,
) -> std::result::Result<Option<D::Element>, ChainProbe> {
    let Some(container) = &step.within else {
        return Ok(None);
    };
    match container.first_match(driver, None).await {
        (Some(found), _) => Ok(Some(found.element)),
        (None, mut probe) => {
            probe
                .last_error
                .get_or_insert_with(|| format!("container not found: {}", container.describe()));
            Err(probe)
        }
    }
}

async fn apply<D: BrowserDriver>(
    driver: &D,
    step: &StepDescriptor,
    element: Option<&D::Element>,
) -> Result<()> {
    let located = || {
        element.ok_or_else(|| {
            AutomationError::InteractionFailed(format!("{} has no element to act on", step.name))
        })
    };

    match &step.action {
        Action::Click => {
            let element = located()?;
            if let Err(native) = driver.click(element).await {
                log::warn!(
                    "Native click on {} failed ({}), dispatching synthetic click",
                    step.name,
                    native
                );
                driver.synthetic_click(element).await.map_err(|synthetic| {
                    AutomationError::InteractionFailed(format!(
                        "native click: {}; synthetic click: {}",
                        native, synthetic
                    ))
                })?;
            }
            Ok(())
        }
        Action::TypeText { value, sensitive } => {
            let element = located()?;
            driver
                .clear(element)
                .await
                .map_err(|e| AutomationError::InteractionFailed(format!("clear: {}", e)))?;
            driver
                .type_text(element, value)
                .await
                .map_err(|e| AutomationError::InteractionFailed(format!("type: {}", e)))?;
            if *sensitive {
                log::info!("Entered {} ({} characters, redacted)", step.name, value.chars().count());
            } else {
                log::info!("Entered {}: {}", step.name, value);
            }
            Ok(())
        }
        Action::Custom(CustomAction::Navigate(url)) => {
            log::info!("Navigating to {}", url);
            driver.navigate(url).await
        }
        Action::Custom(CustomAction::PressKeys(presses)) => {
            for press in presses {
                let target = match press.on {
                    KeyTarget::Located => located()?.clone(),
                    KeyTarget::Focused => driver.active_element().await?,
                };
                driver.press_key(&target, press.key).await.map_err(|e| {
                    AutomationError::InteractionFailed(format!(
                        "pressing {}: {}",
                        press.key.name(),
                        e
                    ))
                })?;
                log::debug!("Pressed {}", press.key.name());
                pause(press.pause).await;
            }
            Ok(())
        }
        Action::Custom(CustomAction::Await) => Ok(()),
        Action::ExtractText(_) => Err(AutomationError::Other(
            "extraction is not an element interaction".to_string(),
        )),
    }
}

/// Scan the chain for a plausible value within the budget, then fall back to a
/// lenient scan over every element of the fallback tag.
async fn extract<D: BrowserDriver>(
    driver: &D,
    step: &StepDescriptor,
    spec: &ExtractSpec,
    diagnostics: &mut Diagnostics,
) -> Result<String> {
    let chain = match &step.target {
        Target::Element { chain, .. } => Some(chain),
        _ => None,
    };

    if let Some(chain) = chain {
        diagnostics.attempted = chain.strategies().iter().map(|s| s.name.clone()).collect();
        let scanned = poll_until(step.budget, &chain.describe(), || async {
            let scope = scope_of(driver, step).await.ok()?;
            for strategy in chain.strategies() {
                let Ok(elements) = strategy.find_all(driver, scope.as_ref()).await else {
                    continue;
                };
                for element in elements {
                    let Ok(text) = driver.text(&element).await else {
                        continue;
                    };
                    if PlausibilityFilter::STRICT.accepts(&text) {
                        return Some((strategy.name.clone(), text.trim().to_string()));
                    }
                }
            }
            None
        })
        .await;

        if let Ok((strategy, value)) = scanned {
            log::info!("Found value via {}", strategy);
            diagnostics.matched = Some(strategy);
            return Ok(value);
        }
    }

    if let Some(tag) = &spec.fallback_tag {
        log::warn!("No plausible value from selectors, scanning every <{}>", tag);
        let name = format!("scan:{tag}");
        diagnostics.attempted.push(name.clone());

        let elements = driver
            .find_elements(&crate::driver::By::TagName(tag.clone()), None)
            .await
            .unwrap_or_default();
        for element in elements {
            let Ok(text) = driver.text(&element).await else {
                continue;
            };
            if PlausibilityFilter::LENIENT.accepts(&text) {
                diagnostics.matched = Some(name);
                return Ok(text.trim().to_string());
            }
        }
    }

    Err(AutomationError::LocatorNotFound {
        attempted: diagnostics.attempted.clone(),
        last_error: Some("no plausible value found".to_string()),
    })
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
