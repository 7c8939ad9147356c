//! End-to-end runs of both workflow tables against the scripted driver


use fake_driver::{
    credential_list_page, login_page, oauth_form_page, ClickEffect, FakeDriver, FakeElement,
    FakeFactory, CREDENTIAL_MODAL, MAIN_WINDOW,
};
use n8n_automation::clipboard::ClipboardSink;
use n8n_automation::config::{OAuthClientConfig, TargetConfig, Timing};
use n8n_automation::error::AutomationError;
use n8n_automation::step::{Phase, StepOutcome};
use n8n_automation::workflow::{definitions, Orchestrator, Payload, Stage, WorkflowStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth?client_id=abc&scope=gmail";

fn target() -> TargetConfig {
    TargetConfig {
        base_url: "http://n8n.test".to_string(),
        credentials_path: "projects/p1/credentials/create".to_string(),
        email: "ops@example.com".to_string(),
        password: "correct horse".to_string(),
        oauth: OAuthClientConfig {
            client_id: "1027-client.apps.googleusercontent.com".to_string(),
            client_secret: "GOCSPX-secret".to_string(),
            credential_type: "Gmail OAuth2 API".to_string(),
        },
    }
}

fn orchestrator(driver: &FakeDriver) -> Orchestrator<FakeFactory> {
    Orchestrator::new(FakeFactory::new(driver.clone()), Duration::ZERO)
}

#[derive(Default)]
struct RecordingClipboard(Mutex<Vec<String>>);

impl ClipboardSink for RecordingClipboard {
    fn write(&self, text: &str) -> Result<(), String> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_login_field_missing_aborts_at_login() {
    let driver = FakeDriver::new(vec![FakeElement::new("body", &["body"])]);
    let workflow = definitions::extract_credential_value(&target(), &Timing::instant());

    let result = orchestrator(&driver).run(&workflow).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::FailedAtStep("login".to_string()));
    assert_eq!(result.stage, Stage::Init);
    assert!(result.payload.is_none());

    let failed = result.failed_step().unwrap();
    assert_eq!(failed.step, "email field");
    assert_eq!(failed.outcome, StepOutcome::NotFound);
    assert_eq!(
        failed.diagnostics.as_ref().map(|d| d.attempted.len()),
        Some(3)
    );

    // Session torn down exactly once, nothing after the failed step ran
    let state = driver.state();
    assert_eq!(state.quits, 1);
    assert!(state.typed.is_empty());
    assert_eq!(state.navigations, vec!["http://n8n.test".to_string()]);
}

#[tokio::test]
async fn test_extract_credential_value_completes() {
    let mut page = login_page();
    page.extend(credential_list_page("AbC123xyz9Q"));
    let driver = FakeDriver::new(page);
    let clipboard = Arc::new(RecordingClipboard::default());
    let workflow = definitions::extract_credential_value(&target(), &Timing::instant());

    let result = orchestrator(&driver)
        .with_clipboard(clipboard.clone())
        .run(&workflow)
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.stage, Stage::Done);
    assert_eq!(
        result.payload,
        Some(Payload::CredentialValue("AbC123xyz9Q".to_string()))
    );
    assert_eq!(result.failed, 0);
    assert_eq!(result.tolerated, 0);
    assert_eq!(result.succeeded, workflow.steps.len());
    assert_eq!(
        result.final_url.as_deref(),
        Some("http://n8n.test/projects/p1/credentials/create")
    );
    assert!(result.controls.is_empty());

    assert_eq!(*clipboard.0.lock().unwrap(), vec!["AbC123xyz9Q".to_string()]);

    let state = driver.state();
    assert_eq!(state.quits, 1);
    assert_eq!(
        state.typed,
        vec!["ops@example.com".to_string(), "correct horse".to_string()]
    );
    // The Details control is behind an overlay
    assert_eq!(state.synthetic_clicks, 1);
}

#[tokio::test]
async fn test_ambiguous_login_signal_is_tolerated() {
    let mut page = vec![
        FakeElement::new("body", &["body"]),
        FakeElement::new("input", &["input[type='email']"]),
        FakeElement::new("input", &["input[type='password']"]),
        // Submitting shows no recognizable post-login marker
        FakeElement::new("button", &["button[type='submit']"]),
    ];
    page.extend(credential_list_page("AbC123xyz9Q"));
    let driver = FakeDriver::new(page);
    let workflow = definitions::extract_credential_value(&target(), &Timing::instant());

    let result = orchestrator(&driver).run(&workflow).await.unwrap();

    assert!(result.is_completed());
    assert_eq!(result.tolerated, 1);
    let marker = result
        .steps
        .iter()
        .find(|s| s.step == "signed-in marker")
        .unwrap();
    assert_eq!(marker.outcome, StepOutcome::Timeout);
    assert!(marker.tolerated);
    assert_eq!(result.payload_value(), Some("AbC123xyz9Q"));
}

#[tokio::test]
async fn test_missing_value_aborts_with_control_inventory() {
    let mut page = login_page();
    page.extend(credential_list_page("short"));
    let driver = FakeDriver::new(page);
    let workflow = definitions::extract_credential_value(&target(), &Timing::instant());

    let result = orchestrator(&driver).run(&workflow).await.unwrap();

    assert_eq!(
        result.status,
        WorkflowStatus::FailedAtStep("extract-result".to_string())
    );
    assert_eq!(result.stage, Stage::DetailsRevealed);
    assert_eq!(
        result.failed_step().map(|s| s.phase),
        Some(Phase::ExtractResult)
    );
    assert!(result
        .controls
        .iter()
        .any(|c| c.tag == "button" && c.text == "Details"));
    assert_eq!(driver.state().quits, 1);
}

#[tokio::test]
async fn test_unclickable_details_control_aborts_despite_best_effort() {
    let mut page = login_page();
    page.extend(credential_list_page("AbC123xyz9Q"));
    // Both the native and the synthetic click on Details fail
    for element in page.iter_mut() {
        for effect in element.on_click.iter_mut() {
            if let ClickEffect::Reveal(revealed) = effect {
                for inner in revealed.iter_mut().filter(|e| e.text == "Details") {
                    *inner = inner.clone().unclickable();
                }
            }
        }
    }
    // The value itself is already on screen
    page.push(
        FakeElement::new("span", &["div.el-col.el-col-16 span.n8n-text"])
            .within(CREDENTIAL_MODAL)
            .text("AbC123xyz9Q"),
    );
    let driver = FakeDriver::new(page);
    let clipboard = Arc::new(RecordingClipboard::default());
    let workflow = definitions::extract_credential_value(&target(), &Timing::instant());

    let result = orchestrator(&driver)
        .with_clipboard(clipboard.clone())
        .run(&workflow)
        .await
        .unwrap();

    assert_eq!(
        result.status,
        WorkflowStatus::FailedAtStep("reveal-details".to_string())
    );
    assert_eq!(result.stage, Stage::ModalOpen);
    assert!(result.payload.is_none());
    let details = result.failed_step().unwrap();
    assert_eq!(details.step, "details control");
    assert_eq!(details.outcome, StepOutcome::InteractionError);
    assert!(!details.tolerated);
    assert_eq!(result.tolerated, 0);
    assert!(clipboard.0.lock().unwrap().is_empty());
    assert_eq!(driver.state().quits, 1);
}

#[tokio::test]
async fn test_create_oauth_credential_captures_popup_url() {
    let mut page = login_page();
    page.extend(oauth_form_page("google-popup", AUTH_URL));
    let driver = FakeDriver::new(page);
    let clipboard = Arc::new(RecordingClipboard::default());
    let workflow = definitions::create_oauth_credential(&target(), &Timing::instant());

    let result = orchestrator(&driver)
        .with_clipboard(clipboard.clone())
        .run(&workflow)
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.payload, Some(Payload::AuthUrl(AUTH_URL.to_string())));
    assert_eq!(*clipboard.0.lock().unwrap(), vec![AUTH_URL.to_string()]);
    assert!(result
        .steps
        .iter()
        .all(|s| s.outcome != StepOutcome::NotFound));

    let state = driver.state();
    // Focus is back on the n8n window, whose address differs from the captured one
    assert_eq!(state.current, MAIN_WINDOW);
    assert_eq!(
        result.final_url.as_deref(),
        state.url_of(MAIN_WINDOW)
    );
    assert_ne!(result.final_url.as_deref(), Some(AUTH_URL));
    assert_eq!(
        state.typed,
        vec![
            "ops@example.com".to_string(),
            "correct horse".to_string(),
            "Gmail OAuth2 API".to_string(),
            "1027-client.apps.googleusercontent.com".to_string(),
            "GOCSPX-secret".to_string(),
        ]
    );
    assert_eq!(state.keys.len(), 3);
    assert_eq!(state.quits, 1);
}

#[tokio::test]
async fn test_auth_trigger_without_popup_fails_at_trigger() {
    let mut page = login_page();
    page.extend(oauth_form_page("google-popup", AUTH_URL));
    for element in page.iter_mut() {
        element
            .on_click
            .retain(|effect| !matches!(effect, ClickEffect::OpenWindow { .. }));
    }
    let driver = FakeDriver::new(page);
    let workflow = definitions::create_oauth_credential(&target(), &Timing::instant());

    let result = orchestrator(&driver).run(&workflow).await.unwrap();

    assert_eq!(
        result.status,
        WorkflowStatus::FailedAtStep("trigger-external-auth".to_string())
    );
    assert!(result.payload.is_none());
    assert_eq!(driver.state().current, MAIN_WINDOW);
}

#[tokio::test]
async fn test_panic_during_run_still_tears_down_once() {
    let driver = FakeDriver::new(login_page());
    driver.state().panic_on_navigate = true;
    let workflow = definitions::extract_credential_value(&target(), &Timing::instant());

    let err = orchestrator(&driver).run(&workflow).await.unwrap_err();

    match err {
        AutomationError::Fault(message) => assert!(message.contains("renderer crashed")),
        other => panic!("expected fault, got {other}"),
    }
    assert_eq!(driver.state().quits, 1);
}

#[tokio::test]
async fn test_session_setup_failure_is_reported() {
    let orchestrator = Orchestrator::new(FakeFactory::failing(), Duration::ZERO);
    let workflow = definitions::extract_credential_value(&target(), &Timing::instant());

    let err = orchestrator.run(&workflow).await.unwrap_err();

    assert!(matches!(err, AutomationError::SessionSetupFailed(_)));
}

#[tokio::test]
async fn test_runs_do_not_share_payloads() {
    let mut page = login_page();
    page.extend(oauth_form_page("google-popup", AUTH_URL));
    let driver = FakeDriver::new(page);
    let orchestrator = orchestrator(&driver);

    let oauth = definitions::create_oauth_credential(&target(), &Timing::instant());
    let first = orchestrator.run(&oauth).await.unwrap();
    assert!(first.payload.is_some());

    // Same browser state, but the extraction table finds no credential card
    let extract = definitions::extract_credential_value(&target(), &Timing::instant());
    let second = orchestrator.run(&extract).await.unwrap();

    assert!(second.payload.is_none());
    assert_eq!(
        second.status,
        WorkflowStatus::FailedAtStep("open-modal".to_string())
    );
    assert_eq!(driver.state().quits, 2);
}
