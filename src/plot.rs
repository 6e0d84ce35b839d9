// src/plot.rs - Projection of sample buffers into the plot renderer's format
use crate::heaters::Heater;
use crate::telemetry::{Millis, TelemetryAggregator, TimeSeriesBuffer};
use serde::Serialize;

/// Headroom added above the hottest observed sample.
pub const Y_AXIS_MARGIN: f64 = 10.0;

/// The y-axis never scales below this, so near-zero data stays readable.
pub const MIN_AXIS_MAX: f64 = 110.0;

/// Line colors for the actual-temperature series, by channel position.
pub const ACTUAL_COLORS: [&str; 8] = [
    "red",
    "orange",
    "lightgreen",
    "brown",
    "pink",
    "purple",
    "yellow",
    "blue",
];

/// Muted duals of [`ACTUAL_COLORS`] for the target series.
pub const TARGET_COLORS: [&str; 8] = [
    "#ff8080", "#ffd080", "#c0edc0", "#a36767", "#ffe0e6", "#804080", "#ffff80", "#8080ff",
];

pub const FAN_COLORS: [&str; 8] = [
    "green", "violet", "lightblue", "yellow", "purple", "blue", "darkblue", "darkgreen",
];

#[derive(Debug, Clone, Serialize)]
pub struct PlotSeries {
    pub label: String,
    pub color: String,
    pub points: Vec<(Millis, f64)>,
}

/// Everything the external plot renderer consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotView {
    pub series: Vec<PlotSeries>,
    pub y_axis_max: f64,
}

fn format_temp(value: f64) -> String {
    format!("{value:.1}°C")
}

fn points_of(buffer: &TimeSeriesBuffer) -> Vec<(Millis, f64)> {
    buffer.iter().map(|s| (s.timestamp, s.value)).collect()
}

/// Project every channel's buffers into labeled series.
///
/// Buffers get a defensive re-sort first. Channels with no actual samples
/// yet are skipped; a missing target history renders its label value as "-".
pub fn project(aggregator: &mut TelemetryAggregator, channels: &[Heater]) -> PlotView {
    let mut series = Vec::new();

    for (position, heater) in channels.iter().enumerate() {
        let color_index = position % ACTUAL_COLORS.len();

        let Some(actual) = aggregator.actual_mut(*heater) else {
            continue;
        };
        actual.sort();
        let Some(latest_actual) = actual.latest() else {
            continue;
        };
        series.push(PlotSeries {
            label: format!("{heater} Actual: {}", format_temp(latest_actual.value)),
            color: ACTUAL_COLORS[color_index].to_string(),
            points: points_of(actual),
        });

        if let Some(target) = aggregator.target_mut(*heater) {
            target.sort();
            let latest = target
                .latest()
                .map(|s| format_temp(s.value))
                .unwrap_or_else(|| "-".to_string());
            series.push(PlotSeries {
                label: format!("{heater} Target: {latest}"),
                color: TARGET_COLORS[color_index].to_string(),
                points: points_of(target),
            });
        }
    }

    let fan = aggregator.fan_mut();
    if !fan.is_empty() {
        fan.sort();
        let latest = fan.latest().map(|s| s.value).unwrap_or(0.0);
        series.push(PlotSeries {
            label: format!("Fan0 : {latest}%"),
            color: FAN_COLORS[0].to_string(),
            points: points_of(fan),
        });
    }

    let observed_max = series
        .iter()
        .flat_map(|s| s.points.iter().map(|(_, v)| *v))
        .fold(0.0_f64, f64::max);

    PlotView {
        series,
        y_axis_max: (observed_max + Y_AXIS_MARGIN).max(MIN_AXIS_MAX),
    }
}

/// Relative time-axis tick label: "just now", "- 3 min", "- 3 min 12s".
pub fn format_time_tick(now: Millis, tick: Millis) -> String {
    let diff_minutes = (now - tick) as f64 / 60_000.0;
    let minutes = diff_minutes.round() as i64;
    if minutes == 0 {
        return "just now".to_string();
    }
    let seconds = (diff_minutes.fract() * 60.0).round() as i64;
    if seconds == 0 {
        format!("- {minutes} min")
    } else {
        format!("- {minutes} min {seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{HeaterReading, TempEntry};
    use std::collections::HashMap;

    fn aggregator_with_samples() -> TelemetryAggregator {
        let mut agg = TelemetryAggregator::new(30, false);
        let channels = [Heater::Tool(0), Heater::Bed];
        agg.rebuild(&channels);
        for (time, tool, bed) in [(1.0, 190.5, 60.0), (2.0, 215.3, 61.2)] {
            let temps = vec![TempEntry {
                time,
                readings: HashMap::from([
                    (
                        "tool0".to_string(),
                        HeaterReading {
                            actual: Some(tool),
                            target: Some(220.0),
                        },
                    ),
                    (
                        "bed".to_string(),
                        HeaterReading {
                            actual: Some(bed),
                            target: Some(65.0),
                        },
                    ),
                ]),
            }];
            agg.ingest(
                time,
                &temps,
                &channels,
                Heater::Tool(0),
                Some(45),
                time as Millis * 1000,
            );
        }
        agg
    }

    #[test]
    fn test_series_per_channel_plus_fan() {
        let mut agg = aggregator_with_samples();
        let view = project(&mut agg, &[Heater::Tool(0), Heater::Bed]);
        // actual+target per channel, one fan series.
        assert_eq!(view.series.len(), 5);
        assert_eq!(view.series[0].label, "Tool0 Actual: 215.3°C");
        assert_eq!(view.series[0].color, "red");
        assert_eq!(view.series[1].label, "Tool0 Target: 220.0°C");
        assert_eq!(view.series[1].color, "#ff8080");
        assert_eq!(view.series[2].label, "Bed Actual: 61.2°C");
        assert_eq!(view.series[2].color, "orange");
        assert_eq!(view.series[4].label, "Fan0 : 45%");
        assert_eq!(view.series[4].points.len(), 2);
    }

    #[test]
    fn test_y_axis_margin_and_floor() {
        let mut agg = aggregator_with_samples();
        let view = project(&mut agg, &[Heater::Tool(0), Heater::Bed]);
        assert_eq!(view.y_axis_max, 230.0);

        // Near-zero data still spans a readable axis.
        let mut cold = TelemetryAggregator::new(30, false);
        cold.rebuild(&[Heater::Tool(0)]);
        let view = project(&mut cold, &[Heater::Tool(0)]);
        assert_eq!(view.y_axis_max, MIN_AXIS_MAX);
    }

    #[test]
    fn test_empty_channels_are_skipped() {
        let mut agg = TelemetryAggregator::new(30, false);
        agg.rebuild(&[Heater::Tool(0), Heater::Bed]);
        let view = project(&mut agg, &[Heater::Tool(0), Heater::Bed]);
        assert!(view.series.is_empty());
    }

    #[test]
    fn test_time_tick_labels() {
        let now = 10 * 60_000;
        assert_eq!(format_time_tick(now, now - 5_000), "just now");
        assert_eq!(format_time_tick(now, now - 3 * 60_000), "- 3 min");
        assert_eq!(format_time_tick(now, now - (3 * 60_000 + 12_000)), "- 3 min 12s");
    }
}
