// src/commands.rs - Operator intents mapped onto Marlin command strings
//
// Pure string composition only; sending is the command sink's job.
use crate::heaters::Heater;
use crate::tuning::Gains;

/// `M303` autotune request. The bed uses the -1 index sentinel.
pub fn autotune(heater: Heater, target: f64, cycles: u32) -> String {
    format!("M303 E{} S{} C{}", heater.marlin_index(), target, cycles)
}

/// `M104`/`M140` target change.
pub fn set_target(heater: Heater, target: f64) -> String {
    match heater {
        Heater::Tool(index) => format!("M104 T{index} S{target}"),
        Heater::Bed => format!("M140 S{target}"),
    }
}

/// Target change stepped from the current view; negative steps decrement.
pub fn step_target(heater: Heater, current: f64, step: f64) -> String {
    set_target(heater, current + step)
}

pub fn turn_off(heater: Heater) -> String {
    set_target(heater, 0.0)
}

/// `M301`/`M304` gain application. Only finite gains reach this point, see
/// [`crate::tuning::PidProfile::gains`].
pub fn apply_gains(heater: Heater, gains: &Gains) -> String {
    match heater {
        Heater::Tool(index) => format!(
            "M301 E{index} P{} I{} D{}",
            gains.kp, gains.ki, gains.kd
        ),
        Heater::Bed => format!("M304 P{} I{} D{}", gains.kp, gains.ki, gains.kd),
    }
}

/// `M500`: persist active gains to device memory.
pub fn persist() -> String {
    "M500".to_string()
}

/// Bare `M301 E<i>` / `M304` query for the currently stored gains.
pub fn query_gains(heater: Heater) -> String {
    match heater {
        Heater::Tool(index) => format!("M301 E{index}"),
        Heater::Bed => "M304".to_string(),
    }
}

/// `M106` fan PWM set.
pub fn set_fan(pwm: u8) -> String {
    format!("M106 S{pwm}")
}

/// `M107` fan off.
pub fn fan_off() -> String {
    "M107".to_string()
}
