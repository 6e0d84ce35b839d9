// src/session.rs - The owned tuning session
//
// All mutable panel state lives here, advanced by exactly three triggers:
// a telemetry tick, a batch of firmware log lines, or an operator action.
// Each handler runs to completion before the next; the web layer only ever
// talks to this object through the panel task's request channel.
use crate::backup::{self, BackupError};
use crate::commands;
use crate::config::Config;
use crate::heaters::{ControllerSelection, Heater, PrinterProfile};
use crate::log_parser::{self, LogEvent, pwm_to_percent};
use crate::plot::{self, PlotView};
use crate::telemetry::{Millis, StateFlags, TelemetryAggregator, TelemetryTick};
use crate::tuning::{PidProfile, TuneModel};
use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),
    #[error("gains are undefined and cannot be exported")]
    UndefinedGains,
}

/// Outbound command channel. Fire-and-forget: no acknowledgement is awaited;
/// any response arrives later as a telemetry or log event.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: String);
}

/// Sink backed by an unbounded channel; the host wires the receiving end to
/// its transport.
pub struct ChannelCommandSink(pub tokio::sync::mpsc::UnboundedSender<String>);

#[async_trait]
impl CommandSink for ChannelCommandSink {
    async fn send(&self, command: String) {
        if self.0.send(command).is_err() {
            tracing::warn!("command channel closed, dropping command");
        }
    }
}

/// Lifecycle of one autotune cycle. There is no timeout: a lost terminal
/// log line leaves the state at Running until the operator intervenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TuneState {
    Ready,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDirection {
    Up,
    Down,
}

/// Operator intents accepted by the panel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PanelAction {
    StartAutotune {
        target: Option<f64>,
        cycles: Option<u32>,
    },
    SetTarget {
        target: f64,
    },
    StepTarget {
        direction: StepDirection,
    },
    TurnOff,
    ApplyGains,
    PersistGains,
    QueryGains,
    SetFan {
        pwm: u8,
    },
    FanOff,
    SelectController {
        controller: String,
    },
    SetModel {
        model: TuneModel,
    },
    SetUltimate {
        ku: Option<f64>,
        tu: Option<f64>,
    },
    SetGains {
        kp: Option<f64>,
        ki: Option<f64>,
        kd: Option<f64>,
    },
    SetTimeConstants {
        ti: Option<f64>,
        td: Option<f64>,
    },
    ResetExtrema,
}

/// Backup payload handed to the operator for download.
#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
    pub file_name: String,
    pub record: String,
}

pub struct PanelSession {
    config: Config,
    profile: PrinterProfile,
    selection: ControllerSelection,
    pid: PidProfile,
    tune_state: TuneState,
    tune_id: Option<Uuid>,
    tune_heater: Option<Heater>,
    apply_ready: bool,
    target_view: f64,
    fan_percent: Option<u8>,
    flags: StateFlags,
    aggregator: TelemetryAggregator,
    sink: Box<dyn CommandSink>,
}

fn default_target(config: &Config, heater: Heater) -> f64 {
    if heater.is_bed() {
        config.tuning.bed_target
    } else {
        config.tuning.tool_target
    }
}

impl PanelSession {
    pub fn new(config: Config, profile: PrinterProfile, sink: Box<dyn CommandSink>) -> Self {
        let selection = ControllerSelection::from_profile(&profile);
        let mut aggregator = TelemetryAggregator::new(
            config.tuning.temperature_cutoff,
            config.tuning.track_extrema,
        );
        aggregator.rebuild(selection.channels());
        let target_view = default_target(&config, selection.selected());
        Self {
            config,
            profile,
            selection,
            pid: PidProfile::default(),
            tune_state: TuneState::Ready,
            tune_id: None,
            tune_heater: None,
            apply_ready: false,
            target_view,
            fan_percent: None,
            flags: StateFlags::default(),
            aggregator,
            sink,
        }
    }

    // ------------------------------------------------------------------
    // Trigger: telemetry tick

    pub fn handle_telemetry(&mut self, tick: &TelemetryTick) {
        self.handle_telemetry_at(tick, Utc::now().timestamp_millis());
    }

    /// Tick processing with an explicit client clock. Sub-handlers are
    /// isolated: a missing or malformed section skips that section only.
    pub fn handle_telemetry_at(&mut self, tick: &TelemetryTick, now: Millis) {
        if let Some(state) = &tick.state {
            self.flags = state.flags;
        }
        match tick.server_time {
            Some(server_time) => {
                let fan = if self.config.tuning.fan_series {
                    self.fan_percent
                } else {
                    None
                };
                self.aggregator.ingest(
                    server_time,
                    &tick.temps,
                    self.selection.channels(),
                    self.selection.primary(),
                    fan,
                    now,
                );
            }
            None if !tick.temps.is_empty() => {
                tracing::warn!(
                    entries = tick.temps.len(),
                    "telemetry tick without serverTime, temp entries skipped"
                );
            }
            None => {}
        }
        if !tick.logs.is_empty() {
            self.handle_logs(&tick.logs);
        }
    }

    // ------------------------------------------------------------------
    // Trigger: firmware log batch

    pub fn handle_logs(&mut self, lines: &[String]) {
        let events = log_parser::extract_batch(
            lines.iter().map(String::as_str),
            self.selection.selected(),
        );
        for event in events {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: LogEvent) {
        match event {
            LogEvent::AutotuneStatus { bias, min, max, .. } => {
                self.pid.bias = Some(bias);
                self.pid.min = Some(min);
                self.pid.max = Some(max);
            }
            LogEvent::AutotuneParams { ku, tu } => {
                self.pid.ku = ku;
                self.pid.tu = tu;
                if let Err(error) = self.pid.apply_rule() {
                    tracing::warn!(%error, "autotune parameters yield undefined gains");
                }
            }
            LogEvent::AutotuneFinished => {
                self.tune_state = TuneState::Completed;
                self.apply_ready = true;
                if let Some(id) = self.tune_id {
                    tracing::info!(tune = %id, "autotune finished");
                }
            }
            LogEvent::AutotuneFailed => {
                self.tune_state = TuneState::Failed;
                if let Some(id) = self.tune_id {
                    tracing::warn!(tune = %id, "autotune failed");
                }
            }
            LogEvent::AutotuneRequest { heater_index } => {
                match Heater::from_marlin_index(heater_index) {
                    Some(heater) if self.selection.contains(heater) => self.begin_tune(heater),
                    _ => tracing::warn!(heater_index, "autotune request for unknown heater"),
                }
            }
            LogEvent::PidReport { kp, ki, kd } => {
                self.pid.kp = kp;
                self.pid.ki = ki;
                self.pid.kd = kd;
                self.apply_ready = true;
            }
            LogEvent::FanSpeedReport { percent, .. } => {
                self.fan_percent = Some(percent);
            }
        }
    }

    fn begin_tune(&mut self, heater: Heater) {
        if self.tune_state != TuneState::Running {
            self.tune_id = Some(Uuid::new_v4());
        }
        self.tune_heater = Some(heater);
        self.tune_state = TuneState::Running;
        self.apply_ready = false;
        if let Some(id) = self.tune_id {
            tracing::info!(tune = %id, heater = %heater, "autotune running");
        }
    }

    // ------------------------------------------------------------------
    // Trigger: operator action

    pub async fn handle_action(&mut self, action: PanelAction) {
        match action {
            PanelAction::StartAutotune { target, cycles } => {
                if !self.flags.operational || self.flags.printing || self.flags.paused {
                    tracing::warn!("refusing autotune: printer is not idle");
                    return;
                }
                let heater = self.selection.selected();
                let target = target.unwrap_or(self.target_view);
                let cycles = cycles.unwrap_or(self.config.tuning.autotune_cycles);
                self.send(commands::autotune(heater, target, cycles)).await;
                self.begin_tune(heater);
            }
            PanelAction::SetTarget { target } => {
                self.target_view = target;
                self.send(commands::set_target(self.selection.selected(), target))
                    .await;
            }
            PanelAction::StepTarget { direction } => {
                let step = match direction {
                    StepDirection::Up => self.config.tuning.step_size,
                    StepDirection::Down => -self.config.tuning.step_size,
                };
                let command =
                    commands::step_target(self.selection.selected(), self.target_view, step);
                self.target_view += step;
                self.send(command).await;
            }
            PanelAction::TurnOff => {
                self.target_view = 0.0;
                self.send(commands::turn_off(self.selection.selected())).await;
            }
            PanelAction::ApplyGains => match self.pid.gains() {
                Some(gains) => {
                    self.send(commands::apply_gains(self.selection.selected(), &gains))
                        .await;
                    self.apply_ready = false;
                }
                None => tracing::warn!("refusing to apply undefined gains"),
            },
            PanelAction::PersistGains => {
                self.send(commands::persist()).await;
            }
            PanelAction::QueryGains => {
                self.send(commands::query_gains(self.selection.selected())).await;
            }
            PanelAction::SetFan { pwm } => {
                self.fan_percent = Some(pwm_to_percent(pwm));
                self.send(commands::set_fan(pwm)).await;
            }
            PanelAction::FanOff => {
                self.fan_percent = Some(0);
                self.send(commands::fan_off()).await;
            }
            PanelAction::SelectController { controller } => {
                match Heater::parse(&controller) {
                    Some(heater) => {
                        if self.selection.select(heater) {
                            self.on_select(heater);
                        } else {
                            tracing::warn!(%controller, "controller not in channel set");
                        }
                    }
                    None => tracing::warn!(%controller, "select for unknown controller"),
                }
            }
            PanelAction::SetModel { model } => {
                if let Err(error) = self.pid.set_model(model) {
                    tracing::warn!(%error, "model change left gains unchanged");
                }
            }
            PanelAction::SetUltimate { ku, tu } => {
                if let Err(error) = self.pid.set_ultimate(ku, tu) {
                    tracing::warn!(%error, "ultimate pair edit left gains unchanged");
                }
            }
            PanelAction::SetGains { kp, ki, kd } => {
                if let Some(kp) = kp {
                    self.pid.kp = kp;
                }
                if let Some(ki) = ki {
                    self.pid.ki = ki;
                }
                if let Some(kd) = kd {
                    self.pid.kd = kd;
                }
                self.apply_ready = true;
            }
            PanelAction::SetTimeConstants { ti, td } => {
                if let Some(ti) = ti {
                    if let Err(error) = self.pid.set_ti(ti) {
                        tracing::warn!(%error, "Ti edit left Ki unchanged");
                    }
                }
                if let Some(td) = td {
                    self.pid.set_td(td);
                }
            }
            PanelAction::ResetExtrema => {
                self.aggregator.reset_extrema();
            }
        }
    }

    async fn send(&self, command: String) {
        tracing::debug!(command = %command, "composing printer command");
        self.sink.send(command).await;
    }

    // ------------------------------------------------------------------
    // Profile / selection lifecycle

    /// Rebuild the channel set for a changed printer profile. Selection
    /// falls back to the first channel and every buffer is reset.
    pub fn update_profile(&mut self, profile: PrinterProfile) {
        self.profile = profile;
        self.selection = ControllerSelection::from_profile(&profile);
        self.aggregator.rebuild(self.selection.channels());
        let selected = self.selection.selected();
        self.on_select(selected);
        tracing::info!(channels = self.selection.channels().len(), "printer profile updated");
    }

    fn on_select(&mut self, heater: Heater) {
        self.target_view = default_target(&self.config, heater);
        self.pid = PidProfile::default();
        self.tune_state = TuneState::Ready;
        self.tune_id = None;
        self.tune_heater = None;
        self.apply_ready = false;
    }

    // ------------------------------------------------------------------
    // Views

    pub fn plot_view(&mut self) -> PlotView {
        plot::project(&mut self.aggregator, self.selection.channels())
    }

    pub fn export_backup(&self) -> Result<BackupFile, PanelError> {
        let gains = self.pid.gains().ok_or(PanelError::UndefinedGains)?;
        Ok(BackupFile {
            file_name: backup::backup_file_name(
                &self.selection.selected().to_string(),
                Local::now(),
            ),
            record: backup::export_record(&gains),
        })
    }

    pub fn import_backup(&mut self, record: &str) -> Result<(), PanelError> {
        let gains = backup::import_record(record)?;
        self.pid.kp = gains.kp;
        self.pid.ki = gains.ki;
        self.pid.kd = gains.kd;
        self.apply_ready = true;
        Ok(())
    }

    pub fn pid(&self) -> &PidProfile {
        &self.pid
    }

    pub fn tune_state(&self) -> TuneState {
        self.tune_state
    }

    pub fn tune_heater(&self) -> Option<Heater> {
        self.tune_heater
    }

    pub fn apply_ready(&self) -> bool {
        self.apply_ready
    }

    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    pub fn channels(&self) -> &[Heater] {
        self.selection.channels()
    }

    pub fn selected(&self) -> Heater {
        self.selection.selected()
    }

    pub fn target_view(&self) -> f64 {
        self.target_view
    }

    pub fn fan_percent(&self) -> Option<u8> {
        self.fan_percent
    }

    pub fn extrema(&self) -> Option<(f64, f64)> {
        self.aggregator.extrema().map(|e| (e.min, e.max))
    }

    pub fn profile(&self) -> PrinterProfile {
        self.profile
    }

    pub fn aggregator(&self) -> &TelemetryAggregator {
        &self.aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(&self, command: String) {
            self.0.lock().unwrap().push(command);
        }
    }

    fn test_session() -> (PanelSession, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let session = PanelSession::new(
            Config::default(),
            PrinterProfile {
                extruder_count: 2,
                heated_bed: true,
            },
            Box::new(RecordingSink(sent.clone())),
        );
        (session, sent)
    }

    fn operational_tick() -> TelemetryTick {
        serde_json::from_str(
            r#"{
                "state": {"flags": {"operational": true, "ready": true}},
                "serverTime": 100.0,
                "temps": [{"time": 100.0, "tool0": {"actual": 24.9, "target": 0.0}}],
                "logs": []
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_autotune_lifecycle() {
        let (mut session, sent) = test_session();
        session.handle_telemetry_at(&operational_tick(), 1_000);

        session
            .handle_action(PanelAction::StartAutotune {
                target: None,
                cycles: None,
            })
            .await;
        assert_eq!(sent.lock().unwrap().as_slice(), ["M303 E0 S284 C8"]);
        assert_eq!(session.tune_state(), TuneState::Running);
        assert_eq!(session.tune_heater(), Some(Heater::Tool(0)));

        session.handle_logs(&[
            "Recv: bias: 100 d: 5 min: 20 max: 210".to_string(),
            "Recv:  Ku: 40.0 Tu: 20.0".to_string(),
            "Recv: PID Autotune finished".to_string(),
        ]);
        assert_eq!(session.tune_state(), TuneState::Completed);
        assert!(session.apply_ready());
        assert_eq!(session.pid().bias, Some(100.0));
        assert!((session.pid().kp - 24.0).abs() < 1e-9);
        assert!((session.pid().ki - 2.4).abs() < 1e-9);
        assert!((session.pid().kd - 60.0).abs() < 1e-9);

        session.handle_action(PanelAction::ApplyGains).await;
        let commands = sent.lock().unwrap();
        assert_eq!(commands[1], "M301 E0 P24 I2.4 D60");
        assert!(!session.apply_ready());
    }

    #[tokio::test]
    async fn test_autotune_refused_when_not_idle() {
        let (mut session, sent) = test_session();
        // Flags default to not operational.
        session
            .handle_action(PanelAction::StartAutotune {
                target: Some(200.0),
                cycles: Some(8),
            })
            .await;
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(session.tune_state(), TuneState::Ready);
    }

    #[tokio::test]
    async fn test_autotune_failure_marks_failed() {
        let (mut session, _sent) = test_session();
        session.handle_logs(&["Send: M303 E0 S210 C8".to_string()]);
        assert_eq!(session.tune_state(), TuneState::Running);
        session.handle_logs(&["Recv: PID Autotune failed! timeout".to_string()]);
        assert_eq!(session.tune_state(), TuneState::Failed);
    }

    #[tokio::test]
    async fn test_bed_selection_switches_targets_and_patterns() {
        let (mut session, sent) = test_session();
        session
            .handle_action(PanelAction::SelectController {
                controller: "Bed".to_string(),
            })
            .await;
        assert_eq!(session.selected(), Heater::Bed);
        assert_eq!(session.target_view(), 110.0);

        // Tool report must not stick while the bed is selected.
        session.handle_logs(&["Recv: echo: M301 P22.2 I1.08 D114".to_string()]);
        assert!((session.pid().kp - 24.0).abs() < 1e-9);

        session.handle_logs(&["Recv: echo: M304 P10 I0.5 D305".to_string()]);
        assert!((session.pid().kp - 10.0).abs() < 1e-9);

        session.handle_action(PanelAction::QueryGains).await;
        assert_eq!(sent.lock().unwrap().last().unwrap(), "M304");
    }

    #[tokio::test]
    async fn test_step_target_moves_view() {
        let (mut session, sent) = test_session();
        session
            .handle_action(PanelAction::SetTarget { target: 200.0 })
            .await;
        session
            .handle_action(PanelAction::StepTarget {
                direction: StepDirection::Up,
            })
            .await;
        session
            .handle_action(PanelAction::StepTarget {
                direction: StepDirection::Down,
            })
            .await;
        let commands = sent.lock().unwrap();
        assert_eq!(
            commands.as_slice(),
            ["M104 T0 S200", "M104 T0 S210", "M104 T0 S200"]
        );
        assert_eq!(session.target_view(), 200.0);
    }

    #[tokio::test]
    async fn test_profile_change_resets_selection_and_buffers() {
        let (mut session, _sent) = test_session();
        let tick: TelemetryTick = serde_json::from_str(
            r#"{
                "serverTime": 100.0,
                "temps": [{"time": 100.0,
                           "tool1": {"actual": 55.0, "target": 60.0},
                           "bed": {"actual": 40.0, "target": 0.0}}]
            }"#,
        )
        .unwrap();
        session.handle_telemetry_at(&tick, 100_000);
        session
            .handle_action(PanelAction::SelectController {
                controller: "Tool1".to_string(),
            })
            .await;
        assert_eq!(
            session
                .aggregator()
                .actual(Heater::Tool(1))
                .unwrap()
                .len(),
            1
        );

        session.update_profile(PrinterProfile {
            extruder_count: 1,
            heated_bed: true,
        });
        assert_eq!(session.selected(), Heater::Tool(0));
        assert_eq!(session.channels(), &[Heater::Tool(0), Heater::Bed]);
        assert!(session.aggregator().actual(Heater::Tool(1)).is_none());
        assert!(session.aggregator().actual(Heater::Bed).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_tick_retains_prior_state() {
        let (mut session, _sent) = test_session();
        session.handle_telemetry_at(&operational_tick(), 1_000);
        let before = session.aggregator().actual(Heater::Tool(0)).unwrap().len();

        // serverTime missing: temp entries must be skipped wholesale.
        let tick: TelemetryTick = serde_json::from_str(
            r#"{"temps": [{"time": 100.0, "tool0": {"actual": 999.0, "target": 0.0}}]}"#,
        )
        .unwrap();
        session.handle_telemetry_at(&tick, 2_000);
        assert_eq!(
            session.aggregator().actual(Heater::Tool(0)).unwrap().len(),
            before
        );
        assert!(session.flags().operational);
    }

    #[tokio::test]
    async fn test_fan_report_feeds_fan_series() {
        let (mut session, _sent) = test_session();
        session.handle_logs(&["Recv: Fan(s) Speed: Fan0= 255".to_string()]);
        assert_eq!(session.fan_percent(), Some(100));
        session.handle_telemetry_at(&operational_tick(), 1_000);
        assert_eq!(session.aggregator().fan().latest().unwrap().value, 100.0);
    }

    #[tokio::test]
    async fn test_backup_round_trip_through_session() {
        let (mut session, _sent) = test_session();
        session.handle_logs(&["Recv: echo: M301 P22.2 I1.08 D114".to_string()]);
        let export = session.export_backup().unwrap();
        assert_eq!(export.record, "1.08;114;22.2;");
        assert!(export.file_name.starts_with("pid_marlin_Tool0_"));
        assert!(export.file_name.ends_with(".cfg"));

        // Wipe and restore.
        session
            .handle_action(PanelAction::SetGains {
                kp: Some(0.0),
                ki: Some(0.0),
                kd: Some(0.0),
            })
            .await;
        session.import_backup(&export.record).unwrap();
        assert!((session.pid().kp - 22.2).abs() < 1e-9);
        assert!((session.pid().ki - 1.08).abs() < 1e-9);
        assert!((session.pid().kd - 114.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_undefined_gains_never_reach_the_sink() {
        let (mut session, sent) = test_session();
        session
            .handle_action(PanelAction::SetGains {
                kp: Some(f64::NAN),
                ki: None,
                kd: None,
            })
            .await;
        session.handle_action(PanelAction::ApplyGains).await;
        assert!(sent.lock().unwrap().is_empty());
        assert!(session.export_backup().is_err());
    }
}
