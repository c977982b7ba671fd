//! Post-hoc cleaning of an assembled training table.
//!
//! Rows without a translation speed (first fix of each storm) or without
//! an SST (reanalysis gaps) cannot feed the intensity models, and a row
//! whose SST survived but whose PI did not indicates an inconsistency
//! worth removing too. The filter is deterministic and order-preserving,
//! and reports what it removed by reason.

use serde::Serialize;

use crate::sample::TableRow;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_missing_translation: usize,
    pub dropped_missing_sst: usize,
    pub dropped_missing_pi: usize,
}

impl std::fmt::Display for CleanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cleaning report:")?;
        writeln!(f, "  Input rows: {}", self.input_rows)?;
        writeln!(
            f,
            "  Dropped (missing translation speed): {}",
            self.dropped_missing_translation
        )?;
        writeln!(f, "  Dropped (missing SST): {}", self.dropped_missing_sst)?;
        writeln!(f, "  Dropped (missing PI): {}", self.dropped_missing_pi)?;
        writeln!(f, "  Output rows: {}", self.output_rows)?;
        Ok(())
    }
}

/// Drop rows with missing essential fields, preserving the order of the
/// surviving rows. Each dropped row is counted under the first rule it
/// violates, checked in the order translation speed, SST, PI.
pub fn clean(rows: Vec<TableRow>) -> (Vec<TableRow>, CleanReport) {
    let mut report = CleanReport {
        input_rows: rows.len(),
        ..CleanReport::default()
    };

    let kept: Vec<TableRow> = rows
        .into_iter()
        .filter(|row| {
            if row.translation_speed_ms.is_none() {
                report.dropped_missing_translation += 1;
                return false;
            }
            if row.sst_k.is_none() {
                report.dropped_missing_sst += 1;
                return false;
            }
            if row.pi_vmax_ms.is_none() {
                report.dropped_missing_pi += 1;
                return false;
            }
            true
        })
        .collect();

    report.output_rows = kept.len();
    (kept, report)
}
