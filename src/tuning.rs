// src/tuning.rs - Tuning-rule table and the PID profile it feeds
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("undefined tuning value: division by zero via {0}")]
    Undefined(&'static str),
}

/// Classical tuning rules selectable by the operator.
///
/// All rules map the ultimate gain/period pair measured by an autotune
/// cycle onto PID gains. Coefficients follow the Ziegler-Nichols family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuneModel {
    ClassicPid,
    PessenIntegral,
    SomeOvershoot,
    NoOvershoot,
}

impl TuneModel {
    /// Kp as a multiple of Ku.
    fn kp_factor(self) -> f64 {
        match self {
            TuneModel::ClassicPid => 0.6,
            TuneModel::PessenIntegral => 0.7,
            TuneModel::SomeOvershoot => 0.33,
            TuneModel::NoOvershoot => 0.2,
        }
    }

    /// Ki as a multiple of Kp/Tu.
    fn ki_factor(self) -> f64 {
        match self {
            TuneModel::PessenIntegral => 2.5,
            _ => 2.0,
        }
    }

    /// Kd as a multiple of Kp*Tu.
    fn kd_factor(self) -> f64 {
        match self {
            TuneModel::ClassicPid => 1.0 / 8.0,
            TuneModel::PessenIntegral => 3.0 / 20.0,
            TuneModel::SomeOvershoot | TuneModel::NoOvershoot => 1.0 / 3.0,
        }
    }
}

/// A finite, command-safe gain triple.
///
/// Construction goes through [`PidProfile::gains`], so a `Gains` value never
/// carries NaN or infinity into a composed command string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Working PID state for the selected heater.
///
/// Kp/Ki/Kd are the canonical values; the time constants Ti = Kp/Ki and
/// Td = Kd/Kp are derived views recomputed on read. Edits propagate
/// one-directionally: changing the model or the ultimate pair reapplies the
/// rule table, changing a gain leaves the others alone, and changing a time
/// constant rewrites only the gain it is defined by (Kp held fixed).
#[derive(Debug, Clone, Serialize)]
pub struct PidProfile {
    pub model: TuneModel,
    pub ku: f64,
    pub tu: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Latest autotune cycle report, if any.
    pub bias: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Default for PidProfile {
    fn default() -> Self {
        let mut profile = Self {
            model: TuneModel::ClassicPid,
            ku: 40.0,
            tu: 20.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            bias: None,
            min: None,
            max: None,
        };
        // Tu = 20 is non-zero, so the default table application cannot fail.
        let _ = profile.apply_rule();
        profile
    }
}

impl PidProfile {
    /// Recompute Kp/Ki/Kd from the rule table for the current model and
    /// ultimate pair. Leaves the gains untouched on error.
    pub fn apply_rule(&mut self) -> Result<(), TuningError> {
        if self.tu == 0.0 {
            return Err(TuningError::Undefined("Tu"));
        }
        self.kp = self.model.kp_factor() * self.ku;
        self.ki = self.model.ki_factor() * self.kp / self.tu;
        self.kd = self.model.kd_factor() * self.kp * self.tu;
        Ok(())
    }

    pub fn set_model(&mut self, model: TuneModel) -> Result<(), TuningError> {
        self.model = model;
        self.apply_rule()
    }

    pub fn set_ultimate(&mut self, ku: Option<f64>, tu: Option<f64>) -> Result<(), TuningError> {
        if let Some(ku) = ku {
            self.ku = ku;
        }
        if let Some(tu) = tu {
            self.tu = tu;
        }
        self.apply_rule()
    }

    /// Integral time constant view, `None` when Ki is zero.
    pub fn ti(&self) -> Option<f64> {
        finite_ratio(self.kp, self.ki)
    }

    /// Derivative time constant view, `None` when Kp is zero.
    pub fn td(&self) -> Option<f64> {
        finite_ratio(self.kd, self.kp)
    }

    /// Edit the integral time constant: Ki = Kp/Ti, Kp held fixed.
    pub fn set_ti(&mut self, ti: f64) -> Result<(), TuningError> {
        match finite_ratio(self.kp, ti) {
            Some(ki) => {
                self.ki = ki;
                Ok(())
            }
            None => Err(TuningError::Undefined("Ti")),
        }
    }

    /// Edit the derivative time constant: Kd = Kp*Td, Kp held fixed.
    pub fn set_td(&mut self, td: f64) {
        self.kd = self.kp * td;
    }

    /// The gain triple, if every gain is finite.
    pub fn gains(&self) -> Option<Gains> {
        let finite = self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite();
        finite.then_some(Gains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        })
    }
}

fn finite_ratio(num: f64, den: f64) -> Option<f64> {
    let ratio = num / den;
    ratio.is_finite().then_some(ratio)
}

/// Render an optional value for display, `"-"` when undefined.
pub fn display_or_dash(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v}"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_classic_pid_table() {
        let mut profile = PidProfile::default();
        profile.ku = 40.0;
        profile.tu = 20.0;
        profile.set_model(TuneModel::ClassicPid).unwrap();
        assert!(close(profile.kp, 24.0));
        assert!(close(profile.ki, 2.4));
        assert!(close(profile.kd, 60.0));
    }

    #[test]
    fn test_rule_table_per_model() {
        let mut profile = PidProfile::default();
        profile.ku = 10.0;
        profile.tu = 4.0;

        profile.set_model(TuneModel::PessenIntegral).unwrap();
        assert!(close(profile.kp, 7.0));
        assert!(close(profile.ki, 2.5 * 7.0 / 4.0));
        assert!(close(profile.kd, 3.0 * 7.0 * 4.0 / 20.0));

        profile.set_model(TuneModel::SomeOvershoot).unwrap();
        assert!(close(profile.kp, 3.3));
        assert!(close(profile.ki, 2.0 * 3.3 / 4.0));
        assert!(close(profile.kd, 3.3 * 4.0 / 3.0));

        profile.set_model(TuneModel::NoOvershoot).unwrap();
        assert!(close(profile.kp, 2.0));
        assert!(close(profile.ki, 2.0 * 2.0 / 4.0));
        assert!(close(profile.kd, 2.0 * 4.0 / 3.0));
    }

    #[test]
    fn test_time_constant_round_trip() {
        // Deriving Ti/Td and re-deriving Ki/Kd from them (Kp fixed) must
        // reproduce the originals for every model in the table.
        for model in [
            TuneModel::ClassicPid,
            TuneModel::PessenIntegral,
            TuneModel::SomeOvershoot,
            TuneModel::NoOvershoot,
        ] {
            let mut profile = PidProfile::default();
            profile.ku = 40.0;
            profile.tu = 20.0;
            profile.set_model(model).unwrap();

            let (ki, kd) = (profile.ki, profile.kd);
            let ti = profile.ti().unwrap();
            let td = profile.td().unwrap();
            profile.set_ti(ti).unwrap();
            profile.set_td(td);
            assert!(close(profile.ki, ki), "ki drifted for {model:?}");
            assert!(close(profile.kd, kd), "kd drifted for {model:?}");
        }
    }

    #[test]
    fn test_zero_tu_is_rejected() {
        let mut profile = PidProfile::default();
        let before = (profile.kp, profile.ki, profile.kd);
        profile.tu = 0.0;
        assert!(profile.apply_rule().is_err());
        assert_eq!(before, (profile.kp, profile.ki, profile.kd));
    }

    #[test]
    fn test_undefined_views_are_none() {
        let mut profile = PidProfile::default();
        profile.ki = 0.0;
        assert_eq!(profile.ti(), None);
        profile.kp = 0.0;
        assert_eq!(profile.td(), None);
        assert_eq!(display_or_dash(profile.ti()), "-");
    }

    #[test]
    fn test_zero_ti_edit_is_rejected() {
        let mut profile = PidProfile::default();
        let ki = profile.ki;
        assert!(profile.set_ti(0.0).is_err());
        assert_eq!(profile.ki, ki);
    }

    #[test]
    fn test_gains_refuse_non_finite() {
        let mut profile = PidProfile::default();
        assert!(profile.gains().is_some());
        profile.ki = f64::NAN;
        assert!(profile.gains().is_none());
    }
}
