//! Runtime bootstrap: telemetry and its errors.

pub mod error;
pub mod telemetry;
