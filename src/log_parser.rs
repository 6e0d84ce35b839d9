// src/log_parser.rs - Firmware log-line extraction
//
// Recognizes the Marlin autotune/PID/fan report lines inside the firmware
// echo stream and turns them into tagged events. Extraction is a pure
// function of (line, active heater); applying the events to session state
// happens in `session`.
use crate::heaters::Heater;
use regex::Regex;
use std::sync::OnceLock;

/// One recognized firmware report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogEvent {
    /// Per-cycle autotune progress: `bias: <f> d: <f> min: <f> max: <f>`.
    AutotuneStatus {
        bias: f64,
        d: f64,
        min: f64,
        max: f64,
    },
    /// Measured oscillation parameters: `Ku: <f> Tu: <f>`.
    AutotuneParams { ku: f64, tu: f64 },
    AutotuneFinished,
    AutotuneFailed,
    /// An echoed `M303 E<i> ...` request; names the heater being tuned.
    AutotuneRequest { heater_index: i32 },
    /// Reported gains for the active heater (`M301`/`M304`/`p: i: d:` forms).
    PidReport { kp: f64, ki: f64, kd: f64 },
    /// Fan PWM report, already converted to percent.
    FanSpeedReport { index: u8, percent: u8 },
}

fn tune_status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(Recv:)?\s*bias:\s*(?P<bias>\d+\.?\d*)\s+d:\s*(?P<d>\d+\.?\d*)\s+min:\s*(?P<min>\d+\.?\d*)\s+max:\s*(?P<max>\d+\.?\d*)",
        )
        .expect("invalid regex pattern")
    })
}

fn tune_params_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(Recv:)?.*Ku:\s*(?P<ku>\d+\.?\d*)\s+Tu:\s*(?P<tu>\d+\.?\d*)")
            .expect("invalid regex pattern")
    })
}

fn tune_finished_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(Recv:)?\s*PID Autotune finished").expect("invalid regex pattern")
    })
}

fn tune_failed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(Recv:)?\s*PID Autotune failed").expect("invalid regex pattern"))
}

fn tune_request_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(Send:|Recv:)?(\s*echo:)?\s*M303\s+E(?P<index>-?\d+)")
            .expect("invalid regex pattern")
    })
}

fn tool_pid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(Recv:)?(\s*echo:)?\s*M301\s+P(?P<p>\d+\.?\d*)\s+I(?P<i>\d+\.?\d*)\s+D(?P<d>\d+\.?\d*)",
        )
        .expect("invalid regex pattern")
    })
}

fn bed_pid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(Recv:)?(\s*echo:)?\s*M304\s+P(?P<p>\d+\.?\d*)\s+I(?P<i>\d+\.?\d*)\s+D(?P<d>\d+\.?\d*)",
        )
        .expect("invalid regex pattern")
    })
}

fn generic_pid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(Recv:)?(\s*echo:)?\s*e:(?P<e>\d+)?\s+p:\s*(?P<p>\d+\.?\d*)\s+i:\s*(?P<i>\d+\.?\d*)\s+d:\s*(?P<d>\d+\.?\d*)",
        )
        .expect("invalid regex pattern")
    })
}

fn fan_speed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(Recv:)?\s*Fan\(s\)\s+Speed:\s+Fan(?P<index>\d+)=\s*(?P<value>\d+)")
            .expect("invalid regex pattern")
    })
}

/// Convert a 0-255 PWM value to a rounded percentage.
pub fn pwm_to_percent(pwm: u8) -> u8 {
    ((100.0 * pwm as f64) / 255.0).round() as u8
}

fn capture_f64(caps: &regex::Captures<'_>, name: &str) -> Option<f64> {
    caps.name(name)?.as_str().parse().ok()
}

/// Run every recognized pattern against one line, in fixed precedence
/// order, and return all matches. Unrecognized lines yield nothing.
///
/// The PID-report form is selection-dependent: `M304` only matches while
/// the bed is active, `M301` and the `p: i: d:` echo form only while a
/// tool is.
pub fn extract_line(line: &str, active: Heater) -> Vec<LogEvent> {
    let mut events = Vec::new();

    if let Some(caps) = tune_status_re().captures(line) {
        if let (Some(bias), Some(d), Some(min), Some(max)) = (
            capture_f64(&caps, "bias"),
            capture_f64(&caps, "d"),
            capture_f64(&caps, "min"),
            capture_f64(&caps, "max"),
        ) {
            events.push(LogEvent::AutotuneStatus { bias, d, min, max });
        }
    }

    if let Some(caps) = tune_params_re().captures(line) {
        if let (Some(ku), Some(tu)) = (capture_f64(&caps, "ku"), capture_f64(&caps, "tu")) {
            events.push(LogEvent::AutotuneParams { ku, tu });
        }
    }

    if tune_finished_re().is_match(line) {
        events.push(LogEvent::AutotuneFinished);
    }

    if tune_failed_re().is_match(line) {
        events.push(LogEvent::AutotuneFailed);
    }

    if let Some(caps) = tune_request_re().captures(line) {
        if let Some(index) = caps.name("index").and_then(|m| m.as_str().parse().ok()) {
            events.push(LogEvent::AutotuneRequest {
                heater_index: index,
            });
        }
    }

    let pid_caps = if active.is_bed() {
        bed_pid_re().captures(line)
    } else {
        tool_pid_re()
            .captures(line)
            .or_else(|| generic_pid_re().captures(line))
    };
    if let Some(caps) = pid_caps {
        if let (Some(kp), Some(ki), Some(kd)) = (
            capture_f64(&caps, "p"),
            capture_f64(&caps, "i"),
            capture_f64(&caps, "d"),
        ) {
            events.push(LogEvent::PidReport { kp, ki, kd });
        }
    }

    if let Some(caps) = fan_speed_re().captures(line) {
        let index = caps.name("index").and_then(|m| m.as_str().parse::<u8>().ok());
        let value = caps.name("value").and_then(|m| m.as_str().parse::<u32>().ok());
        if let (Some(index), Some(value)) = (index, value) {
            events.push(LogEvent::FanSpeedReport {
                index,
                percent: pwm_to_percent(value.min(255) as u8),
            });
        }
    }

    events
}

/// Extract over an ordered batch of lines, preserving line order.
pub fn extract_batch<'a, I>(lines: I, active: Heater) -> Vec<LogEvent>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .flat_map(|line| extract_line(line, active))
        .collect()
}
