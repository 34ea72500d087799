//! CSV export of recorded measurements

use chrono::{DateTime, Local};
use std::io::{self, Write};

use crate::measurement::{timestamp_format, Measurement};

/// Column headers, in output order
pub const CSV_HEADER: [&str; 9] = [
    "Timestamp",
    "Mode",
    "Frequency (Hz)",
    "Value",
    "Unit",
    "|Z| (Ω)",
    "Phase (°)",
    "Speed",
    "Range",
];

/// Quote a field if it contains a delimiter, quote or line break
fn field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_row<W: Write>(writer: &mut W, fields: &[String]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|f| field(f))
        .collect::<Vec<_>>()
        .join(",");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")
}

/// Write measurements as CSV with a header row
pub fn write_csv<W: Write>(mut writer: W, measurements: &[Measurement]) -> io::Result<()> {
    let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
    write_row(&mut writer, &header)?;

    for m in measurements {
        write_row(
            &mut writer,
            &[
                m.timestamp.format(timestamp_format::FORMAT).to_string(),
                m.mode.to_string(),
                m.frequency.to_string(),
                m.value.map(|v| v.to_string()).unwrap_or_default(),
                m.unit.map(|u| u.to_string()).unwrap_or_default(),
                m.z_mag.to_string(),
                m.phase_deg.to_string(),
                m.speed.to_string(),
                m.range.to_string(),
            ],
        )?;
    }

    writer.flush()
}

/// Render measurements to CSV bytes. `None` when there is nothing to export.
pub fn export_csv(measurements: &[Measurement]) -> Option<Vec<u8>> {
    if measurements.is_empty() {
        return None;
    }
    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    write_csv(&mut out, measurements).ok()?;
    Some(out)
}

/// Download file name, e.g. `lcr_measurements_20240131_235959.csv`
pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("lcr_measurements_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
