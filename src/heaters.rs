// src/heaters.rs - Heater identity and the operator's controller selection
use serde::{Deserialize, Serialize};
use std::fmt;

/// One controllable heat source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heater {
    Tool(u8),
    Bed,
}

impl Heater {
    /// Key used by the telemetry feed ("tool0", "bed").
    pub fn telemetry_key(&self) -> String {
        match self {
            Heater::Tool(index) => format!("tool{index}"),
            Heater::Bed => "bed".to_string(),
        }
    }

    /// Heater index in Marlin commands; the bed uses the -1 sentinel.
    pub fn marlin_index(&self) -> i32 {
        match self {
            Heater::Tool(index) => *index as i32,
            Heater::Bed => -1,
        }
    }

    pub fn is_bed(&self) -> bool {
        matches!(self, Heater::Bed)
    }

    /// Parse the display form ("Tool0", "Bed").
    pub fn parse(name: &str) -> Option<Heater> {
        if name.eq_ignore_ascii_case("bed") {
            return Some(Heater::Bed);
        }
        let index = name.strip_prefix("Tool")?.parse().ok()?;
        Some(Heater::Tool(index))
    }

    /// Map a Marlin heater index back to an identity.
    pub fn from_marlin_index(index: i32) -> Option<Heater> {
        match index {
            -1 => Some(Heater::Bed),
            i if (0..=255).contains(&i) => Some(Heater::Tool(i as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for Heater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Heater::Tool(index) => write!(f, "Tool{index}"),
            Heater::Bed => write!(f, "Bed"),
        }
    }
}

/// Printer profile facts the channel set is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterProfile {
    pub extruder_count: u8,
    pub heated_bed: bool,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self {
            extruder_count: 1,
            heated_bed: true,
        }
    }
}

/// The set of available heaters and which one the operator is targeting.
///
/// Rebuilt whenever the printer profile changes; selection falls back to the
/// first channel on every rebuild.
#[derive(Debug, Clone)]
pub struct ControllerSelection {
    channels: Vec<Heater>,
    selected: usize,
}

impl ControllerSelection {
    pub fn from_profile(profile: &PrinterProfile) -> Self {
        let mut channels: Vec<Heater> = (0..profile.extruder_count).map(Heater::Tool).collect();
        if profile.heated_bed {
            channels.push(Heater::Bed);
        }
        if channels.is_empty() {
            // A profile always carries at least one hotend; guard anyway so
            // selected() stays total.
            channels.push(Heater::Tool(0));
        }
        Self {
            channels,
            selected: 0,
        }
    }

    pub fn channels(&self) -> &[Heater] {
        &self.channels
    }

    pub fn selected(&self) -> Heater {
        self.channels[self.selected]
    }

    /// Primary channel, the one extrema tracking follows.
    pub fn primary(&self) -> Heater {
        self.channels[0]
    }

    pub fn contains(&self, heater: Heater) -> bool {
        self.channels.contains(&heater)
    }

    /// Returns false when the heater is not in the current channel set.
    pub fn select(&mut self, heater: Heater) -> bool {
        match self.channels.iter().position(|h| *h == heater) {
            Some(index) => {
                self.selected = index;
                true
            }
            None => false,
        }
    }
}
