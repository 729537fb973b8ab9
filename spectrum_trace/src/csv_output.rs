use crate::aggregator::SampleRow;
use crate::error::{AnalysisError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const CSV_HEADER: &str =
    "Timestamp (s),Center Frequency,Minimum Amplitude,Maximum Amplitude,Center Amplitude";

/// Writes the header and one line per row. The header is written even when
/// `rows` is empty.
pub fn write_csv<W: Write>(mut writer: W, rows: &[SampleRow]) -> std::io::Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{}",
            row.timestamp_seconds,
            row.center_frequency,
            row.minimum_amplitude,
            row.maximum_amplitude,
            row.center_amplitude
        )?;
    }
    writer.flush()
}

pub fn write_csv_file(path: &Path, rows: &[SampleRow]) -> Result<()> {
    let unavailable = |source| AnalysisError::OutputUnavailable {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(unavailable)?;
    write_csv(BufWriter::new(file), rows).map_err(unavailable)
}
