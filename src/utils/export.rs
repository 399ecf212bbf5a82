use std::error::Error;
use std::fs::File;
use std::path::Path;

use chrono::Local;

use crate::processing::engine::ExportedSnapshot;

// DIAGNOSTIC EXPORT -----------------------------------------------------------

/// Writes one snapshot as `index,code` rows, with the analysis outcome in a
/// comment-style header record.
pub fn write_snapshot_csv<P: AsRef<Path>>(
    path: P,
    snapshot: &ExportedSnapshot,
) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(File::create(path)?);

    let header = [
        "# trigger_offset".to_string(),
        snapshot.trigger_offset.to_string(),
        "peak_index".to_string(),
        snapshot.peak_index.to_string(),
        "peak_value".to_string(),
        snapshot.peak_value.to_string(),
        "baseline".to_string(),
        snapshot.baseline.to_string(),
        "accepted".to_string(),
        snapshot.accepted.to_string(),
    ];
    writer.write_record(&header)?;

    for (index, &code) in snapshot.samples.iter().enumerate() {
        writer.write_record([index.to_string(), code.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Export file name stamped with local time, e.g. `snapshot_20240117_153012.csv`.
pub fn timestamped_name(prefix: &str) -> String {
    format!("{}_{}.csv", prefix, Local::now().format("%Y%m%d_%H%M%S"))
}

/// Reads converter codes from the first column of a CSV trace. Values may be
/// written as floats; they are clamped into the unsigned code range.
pub fn read_samples_csv<P: AsRef<Path>>(path: P) -> Result<Vec<u16>, Box<dyn Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(File::open(path)?);

    let mut samples = Vec::new();
    for result in reader.records() {
        let record = result?;
        let Some(field) = record.get(0) else {
            continue;
        };
        let field = field.trim();
        if field.is_empty() || field.starts_with('#') {
            continue;
        }
        let value: f64 = field.parse()?;
        samples.push(value.clamp(0.0, f64::from(u16::MAX)) as u16);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_export_writes_header_and_all_rows() {
        let dir = std::env::temp_dir();
        let path = dir.join("rain_impulse_engine_export_test.csv");

        let snapshot = ExportedSnapshot {
            samples: vec![500, 650, 2000, 650, 500],
            trigger_offset: 1,
            peak_index: 2,
            peak_value: 2000,
            baseline: 500,
            accepted: true,
            sequence: 1,
        };
        write_snapshot_csv(&path, &snapshot).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("# trigger_offset,1"));
        assert!(header.contains("accepted,true"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[2], "2,2000");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn float_codes_are_clamped_into_range() {
        let dir = std::env::temp_dir();
        let path = dir.join("rain_impulse_engine_float_test.csv");
        std::fs::write(&path, "512.7\n-3.0\n70000\n").unwrap();

        let codes = read_samples_csv(&path).unwrap();
        assert_eq!(codes, vec![512, 0, 65535]);

        std::fs::remove_file(&path).ok();
    }
}
