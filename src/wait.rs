//! Bounded polling
//!
//! Every suspension point in a run (element lookup, post-action confirmation,
//! new-window detection) is a predicate re-evaluated at a fixed interval until
//! it holds or the budget runs out. Nothing sleeps for a fixed time hoping the
//! page caught up.

use crate::driver::BrowserDriver;
use crate::error::{AutomationError, Result};
use crate::locator::StrategyChain;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Timeout plus poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Budget {
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }
}

/// Page-state predicates a step can wait on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    ElementPresent(StrategyChain),
    ElementClickable(StrategyChain),
    UrlContains(String),
    /// Satisfied as soon as any one sub-condition holds
    AnyOf(Vec<Condition>),
}

impl Condition {
    /// Evaluate once against the current page. Driver errors count as "not yet".
    pub fn holds<'a, D: BrowserDriver>(
        &'a self,
        driver: &'a D,
    ) -> std::pin::Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match self {
                Condition::ElementPresent(chain) => chain.first_match(driver, None).await.0.is_some(),
                Condition::ElementClickable(chain) => chain
                    .probe(driver, None, |element| async move {
                        driver.is_clickable(&element).await.unwrap_or(false)
                    })
                    .await
                    .0
                    .is_some(),
                Condition::UrlContains(fragment) => driver
                    .current_url()
                    .await
                    .map(|url| url.contains(fragment.as_str()))
                    .unwrap_or(false),
                Condition::AnyOf(conditions) => {
                    for condition in conditions {
                        if condition.holds(driver).await {
                            return true;
                        }
                    }
                    false
                }
            }
        })
    }

    pub fn describe(&self) -> String {
        match self {
            Condition::ElementPresent(chain) => format!("presence of [{}]", chain.describe()),
            Condition::ElementClickable(chain) => format!("clickable [{}]", chain.describe()),
            Condition::UrlContains(fragment) => format!("url containing {fragment:?}"),
            Condition::AnyOf(conditions) => format!(
                "any of ({})",
                conditions
                    .iter()
                    .map(Condition::describe)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// A condition with its budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSpec {
    pub condition: Condition,
    pub budget: Budget,
}

impl WaitSpec {
    pub fn new(condition: Condition, budget: Budget) -> Self {
        Self { condition, budget }
    }
}

/// Re-run `probe` every `budget.poll` until it yields a value or `budget.timeout` elapses.
///
/// The probe always runs at least once, so a zero timeout checks the current
/// state and fails straight away instead of hanging.
pub async fn poll_until<T, F, Fut>(budget: Budget, what: &str, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();

    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }

        let elapsed = start.elapsed();
        if elapsed >= budget.timeout {
            return Err(AutomationError::WaitTimedOut {
                condition: what.to_string(),
                elapsed,
            });
        }

        let remaining = budget.timeout - elapsed;
        tokio::time::sleep(budget.poll.min(remaining)).await;
    }
}

/// Block until `spec.condition` holds.
pub async fn wait_for<D: BrowserDriver>(driver: &D, spec: &WaitSpec) -> Result<()> {
    let what = spec.condition.describe();
    log::debug!("Waiting up to {:?} for {}", spec.budget.timeout, what);

    poll_until(spec.budget, &what, || async {
        spec.condition.holds(driver).await.then_some(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_zero_timeout_fails_immediately() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let result: Result<()> = poll_until(
            Budget::new(Duration::ZERO, Duration::from_secs(60)),
            "never",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { None }
            },
        )
        .await;

        assert!(matches!(result, Err(AutomationError::WaitTimedOut { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_poll_returns_once_predicate_holds() {
        let calls = AtomicUsize::new(0);

        let value = poll_until(
            Budget::new(Duration::from_secs(5), Duration::from_millis(1)),
            "third call",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { (n >= 3).then_some(n) }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_timeout_reports_elapsed() {
        let result: Result<()> = poll_until(
            Budget::new(Duration::from_millis(30), Duration::from_millis(5)),
            "nothing",
            || async { None },
        )
        .await;

        match result {
            Err(AutomationError::WaitTimedOut { condition, elapsed }) => {
                assert_eq!(condition, "nothing");
                assert!(elapsed >= Duration::from_millis(30));
            }
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_any_of_description_lists_branches() {
        let condition = Condition::AnyOf(vec![
            Condition::ElementPresent(StrategyChain::css(&["nav"])),
            Condition::UrlContains("dashboard".to_string()),
        ]);

        assert_eq!(
            condition.describe(),
            "any of (presence of [css:nav], url containing \"dashboard\")"
        );
    }
}
