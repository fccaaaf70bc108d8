use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::average::SweepPoint;
use crate::error::Result;

const RESULT_HEADER: [&str; 3] = [
    "# Total structure factor for atom types: ",
    "# { 1(5) }in system. ",
    "# Q-values       P(Q)  ",
];

/// Scientific notation with 15 digits after the point and a signed exponent
/// of at least two digits, e.g. `6.283185307179586e+00`
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let formatted = format!("{:.15e}", value);
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    match exponent.parse::<i32>() {
        Ok(exponent) => {
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        Err(_) => formatted,
    }
}

/// Name of the result table for a trajectory file, `md100.atom` gives `md100.dat`
pub fn result_file_name(trajectory_path: &Path) -> String {
    trajectory_path
        .file_name()
        .map(|name| name.to_string_lossy().replace("atom", "dat"))
        .unwrap_or_else(|| "result.dat".to_string())
}

/// Write the P(Q) table: a three line comment header, then `Q      P(Q)` per line
pub fn save_result(output_path: &Path, points: &[SweepPoint]) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(output_path)?);

    for line in RESULT_HEADER {
        writeln!(writer, "{}", line)?;
    }

    let rows = points
        .iter()
        .map(|point| format!("{}      {}", format_scientific(point.q), format_scientific(point.p)))
        .collect::<Vec<_>>()
        .join("\n");
    write!(writer, "{}", rows)?;

    writer.flush()?;
    Ok(())
}

/// Export the sweep as a two column `q,p` CSV file
pub fn save_csv(output_path: &Path, points: &[SweepPoint]) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output_path)?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}
