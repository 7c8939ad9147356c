//! HTTP surface
//!
//! Thin warp layer over the orchestrator. Runs are serialized through a
//! single-permit semaphore because the browser is a single physical resource.
//! Each run is spawned onto its own task, so a client that disconnects or
//! times out does not cancel a run that already holds the browser.

use crate::config::AutomationConfig;
use crate::driver::SessionFactory;
use crate::error::{AutomationError, Result};
use crate::workflow::{definitions, Orchestrator, Workflow, WorkflowResult, WorkflowStatus};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use warp::http::StatusCode;
use warp::Filter;

pub const SERVICE_NAME: &str = "n8n-automation";

/// Shared state behind every route.
pub struct AppState<F: SessionFactory> {
    pub orchestrator: Orchestrator<F>,
    pub config: AutomationConfig,
    worker: Semaphore,
}

impl<F: SessionFactory> AppState<F> {
    pub fn new(orchestrator: Orchestrator<F>, config: AutomationConfig) -> Self {
        Self {
            orchestrator,
            config,
            worker: Semaphore::new(1),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AutomationRequest {
    /// Informational only; the route always runs the extraction workflow
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AutomationResponse {
    pub success: bool,
    pub message: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OAuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run `workflow` once the single worker slot is free.
pub async fn run_exclusive<F>(state: Arc<AppState<F>>, workflow: Workflow) -> Result<WorkflowResult>
where
    F: SessionFactory + 'static,
{
    let task = tokio::spawn(async move {
        let _permit = state
            .worker
            .acquire()
            .await
            .map_err(|e| AutomationError::Other(format!("worker slot closed: {}", e)))?;
        state.orchestrator.run(&workflow).await
    });

    task.await
        .map_err(|e| AutomationError::Fault(format!("run task failed: {}", e)))?
}

pub fn routes<F>(
    state: Arc<AppState<F>>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone
where
    F: SessionFactory + 'static,
{
    let root = warp::path::end().and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({ "message": "N8N Automation API is running" }))
    });

    let health = warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({ "status": "healthy", "service": SERVICE_NAME }))
    });

    let state_filter = warp::any().map(move || state.clone());

    let run_automation = warp::path("run-automation")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_run_automation);

    let oauth_url = warp::path("oauth-url")
        .and(warp::post())
        .and(state_filter)
        .and_then(handle_oauth_url);

    root.or(health).or(run_automation).or(oauth_url)
}

async fn handle_run_automation<F>(
    req: AutomationRequest,
    state: Arc<AppState<F>>,
) -> std::result::Result<warp::reply::WithStatus<warp::reply::Json>, Infallible>
where
    F: SessionFactory + 'static,
{
    log::info!("Received run-automation request (action: {:?})", req.action);

    let workflow =
        definitions::extract_credential_value(&state.config.target, &state.config.timing);

    let reply = match run_exclusive(state, workflow).await {
        Ok(result) => {
            let message = extraction_message(&result).to_string();
            let details = serde_json::json!({
                "success": result.is_completed(),
                "message": message,
                "current_url": result.final_url,
                "extracted_value": result.payload_value(),
                "workflow": result,
            });
            AutomationResponse {
                success: result.is_completed(),
                message,
                details,
            }
        }
        Err(AutomationError::SessionSetupFailed(e)) => {
            log::error!("Could not start browser: {}", e);
            AutomationResponse {
                success: false,
                message: format!("Failed to setup Chrome driver: {}", e),
                details: serde_json::json!({ "success": false }),
            }
        }
        Err(e) => {
            log::error!("API error: {}", e);
            return Ok(warp::reply::with_status(
                warp::reply::json(&serde_json::json!({ "detail": e.to_string() })),
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&reply),
        StatusCode::OK,
    ))
}

async fn handle_oauth_url<F>(
    state: Arc<AppState<F>>,
) -> std::result::Result<warp::reply::Json, Infallible>
where
    F: SessionFactory + 'static,
{
    log::info!("Received oauth-url request");

    let workflow =
        definitions::create_oauth_credential(&state.config.target, &state.config.timing);

    let reply = match run_exclusive(state, workflow).await {
        // A completed run always carries the URL: the handoff step fails otherwise
        Ok(result) => match &result.status {
            WorkflowStatus::Completed => OAuthResponse {
                success: true,
                auth_url: result.payload_value().map(str::to_string),
                message: "OAuth URL retrieved successfully".to_string(),
                error: None,
            },
            WorkflowStatus::FailedAtStep(phase) => OAuthResponse {
                success: false,
                message: oauth_failure_message(phase).to_string(),
                error: result
                    .failed_step()
                    .and_then(|step| step.diagnostics.as_ref())
                    .and_then(|d| d.last_error.clone()),
                ..OAuthResponse::default()
            },
        },
        Err(e) => {
            log::error!("OAuth run failed: {}", e);
            OAuthResponse {
                success: false,
                message: "Unexpected error".to_string(),
                error: Some(e.to_string()),
                ..OAuthResponse::default()
            }
        }
    };

    Ok(warp::reply::json(&reply))
}

fn extraction_message(result: &WorkflowResult) -> &'static str {
    match &result.status {
        WorkflowStatus::Completed => {
            "Successfully logged in, clicked first credential card, and extracted value"
        }
        WorkflowStatus::FailedAtStep(phase) => match phase.as_str() {
            "login" => "Failed to login to N8N",
            "navigate" | "open-modal" => {
                "Failed to navigate to credentials page or click first card"
            }
            _ => "Failed to extract value from modal",
        },
    }
}

fn oauth_failure_message(phase: &str) -> &'static str {
    match phase {
        "login" => "Login to N8N failed",
        "navigate" => "Navigation failed",
        _ => "Credential creation failed",
    }
}

/// Bind `addr` and serve until the process exits.
pub async fn serve<F>(state: Arc<AppState<F>>, addr: SocketAddr) -> anyhow::Result<()>
where
    F: SessionFactory + 'static,
{
    // Bind manually so a port already in use is reported instead of panicking
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Port {} is already in use or unavailable: {}", addr.port(), e))?;

    log::info!("Listening on http://{}", addr);
    warp::serve(routes(state))
        .run_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
        .await;
    Ok(())
}
