//! Contains the data models for API requests and responses.

use crate::session::{PanelSession, TuneState};
use crate::telemetry::StateFlags;
use crate::tuning::{self, PidProfile, TuneModel};
use serde::{Deserialize, Serialize};

/// PID working state as displayed: derived views and autotune report
/// fields render as "-" while undefined.
#[derive(Debug, Serialize)]
pub struct PidView {
    pub model: TuneModel,
    pub ku: f64,
    pub tu: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub ti: String,
    pub td: String,
    pub bias: String,
    pub min: String,
    pub max: String,
}

impl From<&PidProfile> for PidView {
    fn from(pid: &PidProfile) -> Self {
        Self {
            model: pid.model,
            ku: pid.ku,
            tu: pid.tu,
            kp: pid.kp,
            ki: pid.ki,
            kd: pid.kd,
            ti: tuning::display_or_dash(pid.ti()),
            td: tuning::display_or_dash(pid.td()),
            bias: tuning::display_or_dash(pid.bias),
            min: tuning::display_or_dash(pid.min),
            max: tuning::display_or_dash(pid.max),
        }
    }
}

/// Represents the current status of the tuning panel.
#[derive(Debug, Serialize)]
pub struct PanelStatusResponse {
    pub controller: String,
    pub controllers: Vec<String>,
    pub tune_state: TuneState,
    pub apply_ready: bool,
    pub target: f64,
    pub fan_percent: Option<u8>,
    pub flags: StateFlags,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub pid: PidView,
}

impl PanelStatusResponse {
    pub fn from_session(session: &PanelSession) -> Self {
        let (temp_min, temp_max) = match session.extrema() {
            Some((min, max)) => (Some(min), Some(max)),
            None => (None, None),
        };
        Self {
            controller: session.selected().to_string(),
            controllers: session
                .channels()
                .iter()
                .map(|heater| heater.to_string())
                .collect(),
            tune_state: session.tune_state(),
            apply_ready: session.apply_ready(),
            target: session.target_view(),
            fan_percent: session.fan_percent(),
            flags: session.flags(),
            temp_min,
            temp_max,
            pid: PidView::from(session.pid()),
        }
    }
}

/// Represents a request to restore gains from a backup record.
#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub record: String,
}
