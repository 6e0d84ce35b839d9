// src/telemetry.rs - Telemetry feed models, sample buffers, and the tick aggregator
use crate::heaters::Heater;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Milliseconds since the Unix epoch, client clock.
pub type Millis = i64;

/// One (timestamp, value) observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: Millis,
    pub value: f64,
}

/// Time-bounded sample history for one channel-and-metric.
///
/// Samples are kept time-ascending and evicted from the front by age only;
/// there is no count cap.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesBuffer {
    samples: VecDeque<Sample>,
}

impl TimeSeriesBuffer {
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
    }

    /// Drop samples older than the horizon from the front.
    pub fn evict_before(&mut self, horizon: Millis) {
        while let Some(front) = self.samples.front() {
            if front.timestamp < horizon {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Defensive re-sort; stable, so a no-op on already-ordered history.
    pub fn sort(&mut self) {
        self.samples
            .make_contiguous()
            .sort_by_key(|sample| sample.timestamp);
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Printer state flags mirrored from the telemetry feed.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StateFlags {
    #[serde(rename = "closedOrError")]
    pub closed_or_error: bool,
    pub operational: bool,
    pub paused: bool,
    pub printing: bool,
    pub error: bool,
    pub ready: bool,
    pub loading: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrinterState {
    pub flags: StateFlags,
    pub text: Option<String>,
}

/// One heater's reading inside a temps entry.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct HeaterReading {
    pub actual: Option<f64>,
    pub target: Option<f64>,
}

/// One temps entry: a server-side sample time plus per-heater readings
/// keyed by telemetry key ("tool0", "bed", ...).
#[derive(Debug, Clone, Deserialize)]
pub struct TempEntry {
    pub time: f64,
    #[serde(flatten)]
    pub readings: HashMap<String, HeaterReading>,
}

/// One push from the telemetry feed. Absent fields are tolerated; the
/// affected sub-handler is skipped and prior state retained.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryTick {
    pub state: Option<PrinterState>,
    #[serde(rename = "serverTime")]
    pub server_time: Option<f64>,
    pub temps: Vec<TempEntry>,
    pub logs: Vec<String>,
}

fn update_max(new: f64, old: f64) -> f64 {
    0f64.max(new.max(old))
}

fn update_min(new: f64, old: f64) -> f64 {
    if old <= 0.0 { new } else { 0f64.max(new.min(old)) }
}

/// Running min/max of the primary channel's actual temperature.
#[derive(Debug, Clone, Copy)]
pub struct Extrema {
    pub min: f64,
    pub max: f64,
    reseed: bool,
}

impl Default for Extrema {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            reseed: false,
        }
    }
}

impl Extrema {
    fn observe(&mut self, value: f64) {
        if self.reseed {
            self.min = value;
            self.max = value;
            self.reseed = false;
            return;
        }
        self.max = update_max(value, self.max);
        self.min = update_min(value, self.min);
    }

    /// Re-seed both bounds from the next observed sample instead of
    /// comparing against stale extrema.
    pub fn reset(&mut self) {
        self.reseed = true;
    }
}

/// Merges telemetry ticks into per-channel sample buffers.
pub struct TelemetryAggregator {
    cutoff_minutes: u32,
    actual: HashMap<Heater, TimeSeriesBuffer>,
    target: HashMap<Heater, TimeSeriesBuffer>,
    fan: TimeSeriesBuffer,
    extrema: Option<Extrema>,
}

impl TelemetryAggregator {
    pub fn new(cutoff_minutes: u32, track_extrema: bool) -> Self {
        Self {
            cutoff_minutes,
            actual: HashMap::new(),
            target: HashMap::new(),
            fan: TimeSeriesBuffer::default(),
            extrema: track_extrema.then(Extrema::default),
        }
    }

    fn cutoff_ms(&self) -> Millis {
        self.cutoff_minutes as Millis * 60 * 1000
    }

    /// Reset every buffer for a new channel set (profile change).
    pub fn rebuild(&mut self, channels: &[Heater]) {
        self.actual.clear();
        self.target.clear();
        self.fan.clear();
        for heater in channels {
            self.actual.insert(*heater, TimeSeriesBuffer::default());
            self.target.insert(*heater, TimeSeriesBuffer::default());
        }
        if let Some(extrema) = self.extrema.as_mut() {
            extrema.reset();
        }
    }

    /// Merge one tick. `now` is the client clock; each entry's timestamp is
    /// corrected by the server/client offset before it is appended. `fan`
    /// carries the separately-tracked current fan percent, appended once per
    /// entry when present.
    pub fn ingest(
        &mut self,
        server_time: f64,
        temps: &[TempEntry],
        channels: &[Heater],
        primary: Heater,
        fan_percent: Option<u8>,
        now: Millis,
    ) {
        let horizon = now - self.cutoff_ms();
        for entry in temps {
            let offset_ms = (server_time - entry.time) * 1000.0;
            let timestamp = now - offset_ms.round() as Millis;
            for heater in channels {
                let Some(reading) = entry.readings.get(&heater.telemetry_key()) else {
                    continue;
                };
                if let Some(actual) = reading.actual {
                    let buffer = self.actual.entry(*heater).or_default();
                    buffer.push(Sample {
                        timestamp,
                        value: actual,
                    });
                    buffer.evict_before(horizon);
                    if *heater == primary {
                        if let Some(extrema) = self.extrema.as_mut() {
                            extrema.observe(actual);
                        }
                    }
                }
                if let Some(target) = reading.target {
                    let buffer = self.target.entry(*heater).or_default();
                    buffer.push(Sample {
                        timestamp,
                        value: target,
                    });
                    buffer.evict_before(horizon);
                }
            }
            if let Some(percent) = fan_percent {
                self.fan.push(Sample {
                    timestamp,
                    value: percent as f64,
                });
                self.fan.evict_before(horizon);
            }
        }
    }

    pub fn actual(&self, heater: Heater) -> Option<&TimeSeriesBuffer> {
        self.actual.get(&heater)
    }

    pub fn target(&self, heater: Heater) -> Option<&TimeSeriesBuffer> {
        self.target.get(&heater)
    }

    pub fn actual_mut(&mut self, heater: Heater) -> Option<&mut TimeSeriesBuffer> {
        self.actual.get_mut(&heater)
    }

    pub fn target_mut(&mut self, heater: Heater) -> Option<&mut TimeSeriesBuffer> {
        self.target.get_mut(&heater)
    }

    pub fn fan(&self) -> &TimeSeriesBuffer {
        &self.fan
    }

    pub fn fan_mut(&mut self) -> &mut TimeSeriesBuffer {
        &mut self.fan
    }

    pub fn extrema(&self) -> Option<Extrema> {
        self.extrema
    }

    pub fn reset_extrema(&mut self) {
        if let Some(extrema) = self.extrema.as_mut() {
            extrema.reset();
        }
    }
}
