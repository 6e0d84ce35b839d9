//! Defines the communication channel messages between the web server and
//! the panel task, and the task loop that serializes every trigger.

use super::models::PanelStatusResponse;
use crate::heaters::PrinterProfile;
use crate::plot::PlotView;
use crate::session::{BackupFile, PanelAction, PanelSession};
use crate::telemetry::TelemetryTick;
use tokio::sync::{mpsc, oneshot};

/// Represents a request sent from a web handler to the panel task.
#[derive(Debug)]
pub enum PanelRequest {
    /// A request to get the current panel status.
    GetStatus {
        /// The channel to send the response back on.
        respond_to: oneshot::Sender<PanelStatusResponse>,
    },
    /// Push one telemetry tick from the feed.
    PushTelemetry {
        tick: TelemetryTick,
        respond_to: oneshot::Sender<()>,
    },
    /// Apply one operator action.
    Action {
        action: PanelAction,
        respond_to: oneshot::Sender<()>,
    },
    /// The printer profile changed; rebuild the channel set.
    UpdateProfile {
        profile: PrinterProfile,
        respond_to: oneshot::Sender<()>,
    },
    /// Project the sample buffers for the plot renderer.
    GetPlot {
        respond_to: oneshot::Sender<PlotView>,
    },
    /// Export the gain backup record.
    GetBackup {
        respond_to: oneshot::Sender<Result<BackupFile, String>>,
    },
    /// Restore gains from a backup record.
    Restore {
        record: String,
        respond_to: oneshot::Sender<Result<(), String>>,
    },
}

/// Drive a panel session from a request stream until the channel closes.
///
/// This is the single place session state is touched; every trigger runs to
/// completion before the next request is taken.
pub async fn run_panel_task(mut session: PanelSession, mut requests: mpsc::Receiver<PanelRequest>) {
    while let Some(request) = requests.recv().await {
        match request {
            PanelRequest::GetStatus { respond_to } => {
                let _ = respond_to.send(PanelStatusResponse::from_session(&session));
            }
            PanelRequest::PushTelemetry { tick, respond_to } => {
                session.handle_telemetry(&tick);
                let _ = respond_to.send(());
            }
            PanelRequest::Action { action, respond_to } => {
                session.handle_action(action).await;
                let _ = respond_to.send(());
            }
            PanelRequest::UpdateProfile { profile, respond_to } => {
                session.update_profile(profile);
                let _ = respond_to.send(());
            }
            PanelRequest::GetPlot { respond_to } => {
                let _ = respond_to.send(session.plot_view());
            }
            PanelRequest::GetBackup { respond_to } => {
                let _ = respond_to.send(session.export_backup().map_err(|e| e.to_string()));
            }
            PanelRequest::Restore { record, respond_to } => {
                let _ = respond_to.send(session.import_backup(&record).map_err(|e| e.to_string()));
            }
        }
    }
    tracing::debug!("panel request channel closed");
}
