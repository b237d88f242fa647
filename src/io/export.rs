//! CSV export for simulation step results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::StepResult;

/// Column header for CSV telemetry export.
const HEADER: &str = "timestep,time_hr,setpoint_kw,ev_power_kw,tracking_error_kw,\
                       transformer_kw,transformer_overload,connected_evs,departures,\
                       clamped_actions,energy_charged_kwh,energy_discharged_kwh,\
                       charge_price,discharge_price";

/// Exports simulation results to a CSV file at the given path.
///
/// Writes a header row followed by one data row per step. Produces
/// deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(results: &[StepResult], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(results, buf)
}

/// Writes simulation results as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(results: &[StepResult], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in results {
        wtr.write_record(&[
            r.timestep.to_string(),
            format!("{:.2}", r.time_hr),
            format!("{:.4}", r.setpoint_kw),
            format!("{:.4}", r.ev_power_kw),
            format!("{:.4}", r.tracking_error_kw),
            format!("{:.4}", r.transformer_power_kw()),
            format!("{:.4}", r.total_overload()),
            r.connected_evs.to_string(),
            r.departures.len().to_string(),
            r.clamped_actions.to_string(),
            format!("{:.4}", r.energy_charged_kwh),
            format!("{:.4}", r.energy_discharged_kwh),
            format!("{:.4}", r.charge_price),
            format!("{:.4}", r.discharge_price),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
