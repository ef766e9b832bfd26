//! Governance Routes
//!
//! Revision listing, drift checks, governance runs and the reports rendered
//! from the most recent run.

use crate::drift::{DriftDetector, DriftReport};
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::{
    DriftQuery, RevisionListResponse, RevisionSummary, RunRequest, RunResponse, ScoreResponse,
    SuccessResponse,
};
use crate::pipeline::{record_decisions, GovernancePipeline, GovernanceRun};
use crate::report::{render_dashboard, render_summary, StabilityScorer};
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};

// =============================================================================
// CHAIN & DRIFT
// =============================================================================

/// Ordered revision chain, root first
pub async fn list_revisions(
    State(state): State<SharedState>,
) -> GovernanceResult<Json<SuccessResponse<RevisionListResponse>>> {
    let history = state.snapshot().await;
    let revisions = history.linearize()?.into_iter().map(RevisionSummary::from).collect();

    Ok(Json(SuccessResponse::with_data(
        "Revision chain loaded",
        RevisionListResponse {
            tip: history.tip().map(str::to_string),
            revisions,
        },
    )))
}

/// Re-read the revision store; in-flight runs keep their snapshot
pub async fn reload_revisions(
    State(state): State<SharedState>,
) -> GovernanceResult<Json<SuccessResponse<RevisionListResponse>>> {
    let count = state.reload_history().await?;
    info!("📚 Revision chain reloaded: {} revision(s)", count);
    list_revisions(State(state)).await
}

/// Compare the declared model with the chain up to `current` (default head)
pub async fn check_drift(
    State(state): State<SharedState>,
    Query(query): Query<DriftQuery>,
) -> GovernanceResult<Json<SuccessResponse<DriftReport>>> {
    let declared = state
        .declared
        .as_ref()
        .ok_or_else(|| GovernanceError::NotFound("no declared model configured".to_string()))?;

    let history = state.snapshot().await;
    let chain = match &query.current {
        Some(reference) => history.chain_until(&history.resolve(reference)?)?,
        None => history.linearize()?,
    };

    let report = DriftDetector::report(declared, &chain)?;
    if report.has_drift() {
        warn!("🔀 Schema drift detected: {} difference(s)", report.diffs.len());
    }

    let message = if report.has_drift() {
        "Schema drift detected"
    } else {
        "No schema drift"
    };
    Ok(Json(SuccessResponse::with_data(message, report)))
}

// =============================================================================
// GOVERNANCE RUNS
// =============================================================================

/// Run the pipeline over a snapshot of the chain and keep it as the latest run
pub async fn create_run(
    State(state): State<SharedState>,
    Json(req): Json<RunRequest>,
) -> GovernanceResult<(StatusCode, Json<SuccessResponse<RunResponse>>)> {
    let context = req.context();
    let snapshot = state.snapshot().await;
    let run = GovernancePipeline::new(&state.policy).run(&snapshot, &context)?;

    let recorded = match &req.record_as {
        Some(actor) => record_decisions(state.audit.as_ref(), &run, actor).await?.len(),
        None => 0,
    };

    *state.latest_run.write().await = Some(run.clone());
    info!("📊 Latest governance run updated for {}", run.branch);

    let message = if run.fails() {
        "Governance run blocked one or more revisions"
    } else {
        "Governance run passed"
    };
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            message,
            RunResponse {
                blocked: run.blocked_count(),
                review_required: run.review_count(),
                fails: run.fails(),
                recorded,
                run,
            },
        )),
    ))
}

async fn require_latest(state: &SharedState) -> GovernanceResult<GovernanceRun> {
    state
        .latest_run
        .read()
        .await
        .clone()
        .ok_or_else(|| GovernanceError::NotFound("no governance run has completed yet".to_string()))
}

pub async fn latest_run(
    State(state): State<SharedState>,
) -> GovernanceResult<Json<SuccessResponse<GovernanceRun>>> {
    let run = require_latest(&state).await?;
    Ok(Json(SuccessResponse::with_data("Latest governance run", run)))
}

// =============================================================================
// REPORTS
// =============================================================================

pub async fn dashboard(State(state): State<SharedState>) -> GovernanceResult<impl IntoResponse> {
    let run = require_latest(&state).await?;
    let body = render_dashboard(&run)?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], body))
}

pub async fn score(
    State(state): State<SharedState>,
) -> GovernanceResult<Json<SuccessResponse<ScoreResponse>>> {
    let run = require_latest(&state).await?;
    let score = StabilityScorer::new(&state.policy).score(&run)?;
    Ok(Json(SuccessResponse::with_data(
        "Stability score",
        ScoreResponse {
            score,
            decisions: run.decisions.len(),
        },
    )))
}

pub async fn summary(State(state): State<SharedState>) -> GovernanceResult<impl IntoResponse> {
    let run = require_latest(&state).await?;
    let body = render_summary(&run)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}
