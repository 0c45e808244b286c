//! CSV-based calibration table loader
//!
//! Age-varying schedules (survival, income growth, frictions) can be
//! overridden from two-column CSV files of `age,value` rows, letting a
//! calibration be swapped without recompiling.

use crate::error::ModelError;
use std::fs::File;
use std::path::Path;

/// Load a two-column `age,value` CSV into a dense per-period vector.
///
/// Rows may appear in any order; `first_age` anchors the table and every age
/// in `first_age..first_age + expected_len` must be present exactly once.
pub fn load_age_table(
    path: &Path,
    first_age: u32,
    expected_len: usize,
) -> Result<Vec<f64>, ModelError> {
    let file = File::open(path)
        .map_err(|e| ModelError::TableLoad(format!("{}: {e}", path.display())))?;
    let mut reader = csv::Reader::from_reader(file);

    let mut values = vec![None; expected_len];
    for result in reader.records() {
        let record =
            result.map_err(|e| ModelError::TableLoad(format!("{}: {e}", path.display())))?;
        let age: u32 = record
            .get(0)
            .ok_or_else(|| ModelError::TableLoad("missing age column".into()))?
            .trim()
            .parse()
            .map_err(|e| ModelError::TableLoad(format!("bad age: {e}")))?;
        let value: f64 = record
            .get(1)
            .ok_or_else(|| ModelError::TableLoad("missing value column".into()))?
            .trim()
            .parse()
            .map_err(|e| ModelError::TableLoad(format!("bad value for age {age}: {e}")))?;

        if age < first_age {
            continue;
        }
        let idx = (age - first_age) as usize;
        if idx < expected_len {
            if values[idx].is_some() {
                return Err(ModelError::TableLoad(format!("duplicate entry for age {age}")));
            }
            values[idx] = Some(value);
        }
    }

    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| {
                ModelError::TableLoad(format!("missing entry for age {}", first_age + i as u32))
            })
        })
        .collect()
}
