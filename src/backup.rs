// src/backup.rs - Delimited gain backup records
//
// The record layout is `Ki;Kd;Kp;` — that field order is load-bearing for
// round-trip compatibility with existing backup files, do not reorder.
use crate::tuning::Gains;
use chrono::{DateTime, Local};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("malformed backup record, expected Ki;Kd;Kp; fields")]
    Malformed,
    #[error("invalid gain value in backup record: {0:?}")]
    InvalidValue(String),
}

/// Serialize gains into the `Ki;Kd;Kp;` record.
pub fn export_record(gains: &Gains) -> String {
    format!("{};{};{};", gains.ki, gains.kd, gains.kp)
}

/// Parse a `Ki;Kd;Kp;` record back into gains.
pub fn import_record(record: &str) -> Result<Gains, BackupError> {
    let fields: Vec<&str> = record.split(';').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(BackupError::Malformed);
    }
    let parse = |field: &str| -> Result<f64, BackupError> {
        field
            .parse()
            .map_err(|_| BackupError::InvalidValue(field.to_string()))
    };
    Ok(Gains {
        ki: parse(fields[0])?,
        kd: parse(fields[1])?,
        kp: parse(fields[2])?,
    })
}

/// Suggested download name: `pid_marlin_<Controller>_<date>.cfg`.
pub fn backup_file_name(controller: &str, at: DateTime<Local>) -> String {
    format!(
        "pid_marlin_{}_{}.cfg",
        controller,
        at.format("%Y-%m-%d_%H%M%S")
    )
}
