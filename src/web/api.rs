//! Defines the Axum API routes and handlers.

use crate::heaters::PrinterProfile;
use crate::plot::PlotView;
use crate::session::{BackupFile, PanelAction};
use crate::telemetry::TelemetryTick;
use crate::web::models::{PanelStatusResponse, RestoreRequest};
use crate::web::panel_channel::PanelRequest;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tokio::sync::mpsc::Sender;

pub type AppState = Sender<PanelRequest>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(panel_tx: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/telemetry", post(push_telemetry))
        .route("/api/v1/action", post(post_action))
        .route("/api/v1/profile", post(update_profile))
        .route("/api/v1/plot", get(get_plot))
        .route("/api/v1/backup", get(get_backup))
        .route("/api/v1/restore", post(restore))
        .with_state(panel_tx)
}

/// Handler to get the current status of the panel.
async fn get_status(
    State(panel_tx): State<AppState>,
) -> Result<Json<PanelStatusResponse>, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if panel_tx
        .send(PanelRequest::GetStatus { respond_to: resp_tx })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(status) => Ok(Json(status)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler for one pushed telemetry tick.
async fn push_telemetry(
    State(panel_tx): State<AppState>,
    Json(tick): Json<TelemetryTick>,
) -> Result<StatusCode, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if panel_tx
        .send(PanelRequest::PushTelemetry {
            tick,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(()) => Ok(StatusCode::OK),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler for a single operator action.
async fn post_action(
    State(panel_tx): State<AppState>,
    Json(action): Json<PanelAction>,
) -> Result<StatusCode, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if panel_tx
        .send(PanelRequest::Action {
            action,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(()) => Ok(StatusCode::OK),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler for printer profile changes.
async fn update_profile(
    State(panel_tx): State<AppState>,
    Json(profile): Json<PrinterProfile>,
) -> Result<StatusCode, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if panel_tx
        .send(PanelRequest::UpdateProfile {
            profile,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(()) => Ok(StatusCode::OK),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler for the plot projection.
async fn get_plot(State(panel_tx): State<AppState>) -> Result<Json<PlotView>, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if panel_tx
        .send(PanelRequest::GetPlot { respond_to: resp_tx })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(view) => Ok(Json(view)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler to export the gain backup record.
async fn get_backup(State(panel_tx): State<AppState>) -> Result<Json<BackupFile>, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if panel_tx
        .send(PanelRequest::GetBackup { respond_to: resp_tx })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(Ok(file)) => Ok(Json(file)),
        // Gains are undefined; there is nothing meaningful to export.
        Ok(Err(_)) => Err(StatusCode::UNPROCESSABLE_ENTITY),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler to restore gains from an uploaded backup record.
async fn restore(
    State(panel_tx): State<AppState>,
    Json(payload): Json<RestoreRequest>,
) -> Result<StatusCode, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if panel_tx
        .send(PanelRequest::Restore {
            record: payload.record,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(Ok(())) => Ok(StatusCode::OK),
        Ok(Err(_)) => Err(StatusCode::UNPROCESSABLE_ENTITY),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
