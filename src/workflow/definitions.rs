//! The two step tables driven against n8n.
//!
//! Selector lists are ordered most-specific first. The class names with hash
//! suffixes come from the production build and break on UI upgrades, which is
//! why every chain ends with something structural or text based.

use super::{PayloadKind, Stage, Workflow};
use crate::config::{TargetConfig, Timing};
use crate::driver::Key;
use crate::handoff::HandoffBudget;
use crate::locator::{SelectorStrategy, StrategyChain};
use crate::step::{
    Action, CustomAction, ExtractSpec, KeyPress, KeyTarget, Phase, StepDescriptor, Target,
};
use crate::wait::{Budget, Condition, WaitSpec};

pub const EXTRACT_CREDENTIAL_VALUE: &str = "extract-credential-value";
pub const CREATE_OAUTH_CREDENTIAL: &str = "create-oauth-credential";

const PICKER_SEARCH: &str = "input[placeholder='Search for app...']";
const PARAMETER_FIELD: &str = "input[data-test-id='parameter-input-field']";

fn element_budget(timing: &Timing) -> Budget {
    Budget::new(timing.element_timeout, timing.poll_interval)
}

fn probe_budget(timing: &Timing) -> Budget {
    Budget::new(timing.probe_timeout, timing.poll_interval)
}

fn email_field() -> StrategyChain {
    StrategyChain::css(&[
        "input[type='email']",
        "input[name='email']",
        "input[id='email']",
    ])
}

fn password_field() -> StrategyChain {
    StrategyChain::css(&[
        "input[type='password']",
        "input[name='password']",
        "input[id='password']",
    ])
}

fn sign_in_button() -> StrategyChain {
    StrategyChain::new(vec![
        SelectorStrategy::css("button[type='submit']"),
        SelectorStrategy::xpath(
            "//button[contains(text(), 'Sign in') or contains(text(), 'Login')]",
        ),
        SelectorStrategy::css("input[type='submit']"),
        SelectorStrategy::css(".btn-primary"),
        SelectorStrategy::css("[data-test-id='sign-in-button']"),
        SelectorStrategy::text("button", &["sign", "login", "submit"]),
    ])
}

/// No single element reliably signals a finished sign-in.
fn signed_in() -> Condition {
    Condition::AnyOf(vec![
        Condition::ElementPresent(StrategyChain::css(&["[data-test-id='main-content']"])),
        Condition::ElementPresent(StrategyChain::css(&[".main-content"])),
        Condition::ElementPresent(StrategyChain::css(&["nav"])),
        Condition::UrlContains("dashboard".to_string()),
    ])
}

fn credential_card() -> StrategyChain {
    StrategyChain::css(&[
        "div[data-test-id='resources-list-item']",
        ".card._card_1vkmg_123._cardLink_14jai_123",
        ".card[data-test-id='resources-list-item']",
        ".recycle-scroller-item .card",
    ])
}

fn modal_container() -> StrategyChain {
    StrategyChain::css(&[
        ".el-dialog",
        ".modal",
        ".dialog",
        "[role='dialog']",
        ".el-dialog__wrapper",
    ])
}

fn details_control() -> StrategyChain {
    StrategyChain::new(vec![
        SelectorStrategy::xpath("//button[contains(text(), 'Details')]"),
        SelectorStrategy::xpath("//a[contains(text(), 'Details')]"),
        SelectorStrategy::xpath("//span[contains(text(), 'Details')]"),
        SelectorStrategy::xpath("//div[contains(text(), 'Details')]"),
        SelectorStrategy::css("[data-test-id*='details']"),
        SelectorStrategy::css(".details-button"),
        SelectorStrategy::css(".details-link"),
    ])
}

fn credential_value() -> StrategyChain {
    StrategyChain::css(&[
        "div.el-col.el-col-16 span.n8n-text",
        ".valueLabel span.n8n-text",
        "div[class*='valueLabel'] span",
        ".el-col-16 span.n8n-text",
        "span.n8n-text.compact.size-medium.regular",
    ])
}

fn credential_type_picker() -> StrategyChain {
    StrategyChain::css(&[
        "[data-test-id='new-credential-type-select']",
        ".n8n-select",
        ".el-select",
        ".select-trigger",
        PICKER_SEARCH,
    ])
}

fn credential_form() -> Condition {
    Condition::AnyOf(vec![
        Condition::ElementPresent(StrategyChain::css(&[
            PARAMETER_FIELD,
            "button[data-test-id='None']",
        ])),
        Condition::ElementPresent(StrategyChain::new(vec![SelectorStrategy::xpath(
            "//button[contains(text(), 'Save')]",
        )])),
    ])
}

fn client_id_field() -> StrategyChain {
    StrategyChain::css(&["input[type='text'][data-test-id='parameter-input-field']"])
        .or(SelectorStrategy::ordinal(PARAMETER_FIELD, 0, Some("text")))
        .or(SelectorStrategy::ordinal(PARAMETER_FIELD, 0, None))
}

fn client_secret_field() -> StrategyChain {
    StrategyChain::css(&["input[type='password'][data-test-id='parameter-input-field']"])
        .or(SelectorStrategy::ordinal(PARAMETER_FIELD, 1, Some("password")))
        .or(SelectorStrategy::ordinal(PARAMETER_FIELD, 1, None))
}

fn google_sign_in_button() -> StrategyChain {
    StrategyChain::new(vec![
        SelectorStrategy::css("._googleAuthBtn_1tor9_123"),
        SelectorStrategy::css("button[class*='_googleAuthBtn_']"),
        SelectorStrategy::css("button[title='Sign in with Google']"),
        SelectorStrategy::css("button[class*='googleAuthBtn']"),
        SelectorStrategy::css("button[style*='google-auth']"),
        SelectorStrategy::xpath("//button[@title='Sign in with Google']"),
        SelectorStrategy::xpath("//button[contains(@class, 'googleAuthBtn')]"),
        SelectorStrategy::attribute("button", &["title"], &["google", "sign in"]),
        SelectorStrategy::attribute("button", &["class"], &["google", "auth"]),
        SelectorStrategy::attribute("button", &["style"], &["google-auth"]),
    ])
}

/// Open the instance and sign in. The post-submit check is best-effort.
fn login_steps(target: &TargetConfig, timing: &Timing) -> Vec<StepDescriptor> {
    let budget = element_budget(timing);

    vec![
        StepDescriptor::new(
            "open sign-in page",
            Phase::Login,
            Target::Page,
            Action::Custom(CustomAction::Navigate(target.base_url.clone())),
            budget,
        ),
        StepDescriptor::new(
            "email field",
            Phase::Login,
            Target::present(email_field()),
            Action::TypeText {
                value: target.email.clone(),
                sensitive: false,
            },
            budget,
        ),
        StepDescriptor::new(
            "password field",
            Phase::Login,
            Target::present(password_field()),
            Action::TypeText {
                value: target.password.clone(),
                sensitive: true,
            },
            budget,
        ),
        StepDescriptor::new(
            "sign-in button",
            Phase::Login,
            Target::present(sign_in_button()),
            Action::Click,
            budget,
        )
        .settle(timing.action_settle),
        StepDescriptor::new(
            "signed-in marker",
            Phase::Login,
            Target::Page,
            Action::Custom(CustomAction::Await),
            budget,
        )
        .confirm(WaitSpec::new(signed_in(), budget))
        .best_effort()
        .advances_to(Stage::LoggedIn),
    ]
}

fn navigate_step(target: &TargetConfig, timing: &Timing) -> StepDescriptor {
    let budget = element_budget(timing);

    StepDescriptor::new(
        "credentials page",
        Phase::Navigate,
        Target::Page,
        Action::Custom(CustomAction::Navigate(target.credentials_url())),
        budget,
    )
    .confirm(WaitSpec::new(
        Condition::ElementPresent(StrategyChain::css(&["body"])),
        budget,
    ))
    .advances_to(Stage::OnTargetPage)
}

/// Sign in, open the first credential and read its masked value.
pub fn extract_credential_value(target: &TargetConfig, timing: &Timing) -> Workflow {
    let budget = element_budget(timing);

    let mut steps = login_steps(target, timing);
    steps.push(navigate_step(target, timing));
    steps.extend([
        StepDescriptor::new(
            "first credential card",
            Phase::OpenModal,
            Target::present(credential_card()),
            Action::Click,
            budget,
        )
        .scroll_settle(timing.scroll_settle)
        .settle(timing.action_settle),
        StepDescriptor::new(
            "credential modal",
            Phase::OpenModal,
            Target::Page,
            Action::Custom(CustomAction::Await),
            budget,
        )
        .confirm(WaitSpec::new(
            Condition::ElementPresent(modal_container()),
            probe_budget(timing),
        ))
        .best_effort()
        .advances_to(Stage::ModalOpen),
        StepDescriptor::new(
            "details control",
            Phase::RevealDetails,
            Target::present(details_control()),
            Action::Click,
            budget,
        )
        .within(modal_container())
        .scroll_settle(timing.scroll_settle)
        .settle(timing.action_settle)
        .best_effort()
        .advances_to(Stage::DetailsRevealed),
        StepDescriptor::new(
            "credential value",
            Phase::ExtractResult,
            Target::present(credential_value()),
            Action::ExtractText(ExtractSpec {
                fallback_tag: Some("span".to_string()),
            }),
            budget,
        )
        .within(modal_container())
        .advances_to(Stage::ValueExtracted),
    ]);

    Workflow {
        name: EXTRACT_CREDENTIAL_VALUE.to_string(),
        steps,
        payload: PayloadKind::CredentialValue,
    }
}

/// Sign in, create a new OAuth credential and capture the provider's sign-in URL.
pub fn create_oauth_credential(target: &TargetConfig, timing: &Timing) -> Workflow {
    let budget = element_budget(timing);
    let press = |key, on| KeyPress {
        key,
        on,
        pause: timing.key_pause,
    };

    let mut steps = login_steps(target, timing);
    steps.push(navigate_step(target, timing));
    steps.extend([
        // The picker is a custom dropdown; its options have no stable click target
        StepDescriptor::new(
            "credential type picker",
            Phase::SelectCredentialType,
            Target::clickable(credential_type_picker()),
            Action::Click,
            budget,
        )
        .settle(timing.action_settle)
        .advances_to(Stage::ModalOpen),
        StepDescriptor::new(
            "picker search",
            Phase::SelectCredentialType,
            Target::clickable(StrategyChain::css(&[PICKER_SEARCH])),
            Action::TypeText {
                value: target.oauth.credential_type.clone(),
                sensitive: false,
            },
            budget,
        ),
        StepDescriptor::new(
            "confirm credential type",
            Phase::SelectCredentialType,
            Target::clickable(StrategyChain::css(&[PICKER_SEARCH])),
            Action::Custom(CustomAction::PressKeys(vec![
                press(Key::Enter, KeyTarget::Located),
                press(Key::Tab, KeyTarget::Located),
                press(Key::Enter, KeyTarget::Focused),
            ])),
            budget,
        ),
        StepDescriptor::new(
            "credential form",
            Phase::FillFields,
            Target::Page,
            Action::Custom(CustomAction::Await),
            budget,
        )
        .confirm(WaitSpec::new(credential_form(), probe_budget(timing))),
        StepDescriptor::new(
            "client id field",
            Phase::FillFields,
            Target::clickable(client_id_field()),
            Action::TypeText {
                value: target.oauth.client_id.clone(),
                sensitive: true,
            },
            budget,
        )
        .scroll_settle(timing.scroll_settle),
        StepDescriptor::new(
            "client secret field",
            Phase::FillFields,
            Target::clickable(client_secret_field()),
            Action::TypeText {
                value: target.oauth.client_secret.clone(),
                sensitive: true,
            },
            budget,
        )
        .scroll_settle(timing.scroll_settle)
        .advances_to(Stage::DetailsRevealed),
        StepDescriptor::new(
            "sign in with Google",
            Phase::TriggerExternalAuth,
            Target::clickable(google_sign_in_button()),
            Action::Click,
            budget,
        )
        .scroll_settle(timing.scroll_settle)
        .opens_window(HandoffBudget {
            appear: Budget::new(timing.new_window_timeout, timing.poll_interval),
            settle: timing.window_settle,
        })
        .advances_to(Stage::ValueExtracted),
    ]);

    Workflow {
        name: CREATE_OAUTH_CREDENTIAL.to_string(),
        steps,
        payload: PayloadKind::AuthUrl,
    }
}

/// Look a workflow up by its name.
pub fn by_name(name: &str, target: &TargetConfig, timing: &Timing) -> Option<Workflow> {
    match name {
        EXTRACT_CREDENTIAL_VALUE => Some(extract_credential_value(target, timing)),
        CREATE_OAUTH_CREDENTIAL => Some(create_oauth_credential(target, timing)),
        _ => None,
    }
}
