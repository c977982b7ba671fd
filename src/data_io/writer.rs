//! Training-table CSV output and re-reading for the cleaning pass.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::sample::TableRow;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Write the training table, one row per surviving observation
pub fn write_table(path: &Path, rows: &[TableRow]) -> Result<(), WriterError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(rows = rows.len(), path = %path.display(), "wrote training table");
    Ok(())
}

/// Read a previously written training table
pub fn read_table(path: &Path) -> Result<Vec<TableRow>, WriterError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize::<TableRow>() {
        rows.push(record?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SstSource;

    fn row(id: &str) -> TableRow {
        TableRow {
            storm_id: id.to_string(),
            basin: "EP".to_string(),
            time: "2010-09-12 18:00:00".to_string(),
            lat: 14.2,
            lon: 245.0,
            max_wind_ms: 33.0,
            min_pressure_hpa: Some(975.0),
            sst_k: Some(301.4),
            sst_source: Some(SstSource::AtmosphericReanalysis),
            surface_pressure_pa: 100_800.0,
            temperature_850: 289.0,
            temperature_600: 274.0,
            temperature_250: 231.0,
            temperature_200: 221.0,
            u_850: -3.0,
            v_850: 1.0,
            u_250: 4.0,
            v_250: -2.0,
            u_200: 6.0,
            v_200: -2.5,
            specific_humidity_850: 0.012,
            specific_humidity_600: 0.005,
            specific_humidity_200: 2.0e-5,
            relative_humidity_600: None,
            wind_shear_ms: 9.6,
            mixed_layer_depth_m: None,
            thermal_stratification: None,
            ocean_heat_content: None,
            pi_vmax_ms: Some(58.0),
            pi_min_pressure_hpa: Some(944.0),
            pi_out_of_range: false,
            translation_speed_ms: Some(4.8),
            bathymetry_m: None,
        }
    }

    #[test]
    fn test_write_then_read_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let rows = vec![row("EP012010"), row("EP022010")];

        write_table(&path, &rows).unwrap();
        let read_back = read_table(&path).unwrap();
        assert_eq!(read_back, rows);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/table.csv");
        write_table(&path, &[row("X")]).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_read_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table(&dir.path().join("absent.csv"));
        assert!(err.is_err());
    }
}
