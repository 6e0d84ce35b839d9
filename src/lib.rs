//! Core of a PID heater-tuning control panel for Marlin-firmware printers.
//!
//! The panel derives PID gain estimates from classical tuning rules, parses
//! autotune results out of the firmware log stream, buffers live
//! temperature/fan telemetry for plotting, and composes the G-code commands
//! that apply or persist the resulting gains. Transport, charting, and UI
//! are external collaborators; see the `web` module for the thin host API.

pub mod backup;
pub mod commands;
pub mod config;
pub mod heaters;
pub mod log_parser;
pub mod plot;
pub mod session;
pub mod telemetry;
pub mod tuning;
pub mod web;
