
use fake_driver::{FakeDriver, FakeElement};
use n8n_automation::error::AutomationError;
use n8n_automation::locator::StrategyChain;
use n8n_automation::wait::{wait_for, Budget, Condition, WaitSpec};
use std::time::{Duration, Instant};

fn short() -> Budget {
    Budget::new(Duration::from_millis(100), Duration::from_millis(5))
}

#[tokio::test]
async fn test_any_of_holds_when_first_branch_holds() {
    let driver = FakeDriver::new(vec![FakeElement::new("nav", &["nav"])]);
    let condition = Condition::AnyOf(vec![
        Condition::ElementPresent(StrategyChain::css(&["nav"])),
        Condition::ElementPresent(StrategyChain::css(&[".never"])),
        Condition::UrlContains("dashboard".to_string()),
    ]);

    let started = Instant::now();
    wait_for(&driver, &WaitSpec::new(condition, short()))
        .await
        .expect("nav is present");
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_any_of_holds_on_url_branch() {
    let driver = FakeDriver::default();
    driver.state().windows[0].1 = "https://n8n.example.com/home/dashboard".to_string();

    let condition = Condition::AnyOf(vec![
        Condition::ElementPresent(StrategyChain::css(&["[data-test-id='main-content']"])),
        Condition::UrlContains("dashboard".to_string()),
    ]);

    assert!(wait_for(&driver, &WaitSpec::new(condition, short()))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_clickable_condition_ignores_inert_elements() {
    let driver = FakeDriver::new(vec![FakeElement::new("button", &[".save"]).inert()]);
    let spec = WaitSpec::new(
        Condition::ElementClickable(StrategyChain::css(&[".save"])),
        short(),
    );

    let err = wait_for(&driver, &spec).await.unwrap_err();
    match err {
        AutomationError::WaitTimedOut { condition, elapsed } => {
            assert_eq!(condition, "clickable [css:.save]");
            assert!(elapsed >= Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other}"),
    }

    // Present is enough for the presence condition
    let present = WaitSpec::new(
        Condition::ElementPresent(StrategyChain::css(&[".save"])),
        short(),
    );
    assert!(wait_for(&driver, &present).await.is_ok());
}

#[tokio::test]
async fn test_zero_timeout_with_false_condition_fails_at_once() {
    let driver = FakeDriver::default();
    let spec = WaitSpec::new(
        Condition::UrlContains("dashboard".to_string()),
        Budget::new(Duration::ZERO, Duration::from_secs(30)),
    );

    let started = Instant::now();
    let result = wait_for(&driver, &spec).await;

    assert!(matches!(result, Err(AutomationError::WaitTimedOut { .. })));
    assert!(started.elapsed() < Duration::from_secs(1));
}
