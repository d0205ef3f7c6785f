//! tara-common/src/models/calibration.rs
//!
//! Per-motor calibration, persisted as a JSON object keyed by motor name.

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorCalibration {
    pub id: u8,
    pub drive_mode: u8,
    pub homing_offset: i32,
    pub range_min: i32,
    pub range_max: i32,
}

pub type CalibrationMap = BTreeMap<String, MotorCalibration>;

/// Loads a calibration file. A missing file is not an error.
pub fn load_calibration(path: &Path) -> Result<Option<CalibrationMap>, Error> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let map: CalibrationMap = serde_json::from_str(&raw)?;
    Ok(Some(map))
}

pub fn save_calibration(path: &Path, calibration: &CalibrationMap) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(calibration)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Keeps only the motors whose name starts with `{prefix}_`.
pub fn filter_by_prefix(calibration: &CalibrationMap, prefix: &str) -> CalibrationMap {
    let wanted = format!("{prefix}_");
    calibration
        .iter()
        .filter(|(name, _)| name.starts_with(&wanted))
        .map(|(name, cal)| (name.clone(), *cal))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: u8) -> MotorCalibration {
        MotorCalibration { id, drive_mode: 0, homing_offset: -12, range_min: 800, range_max: 3200 }
    }

    #[test]
    fn save_then_load_preserves_every_motor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("blue.json");

        let mut map = CalibrationMap::new();
        map.insert("left_gripper".into(), sample(6));
        map.insert("right_gripper".into(), sample(6));
        save_calibration(&path, &map).unwrap();

        let loaded = load_calibration(&path).unwrap().expect("file should exist");
        assert_eq!(loaded, map);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_calibration(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn prefix_filter_splits_arms() {
        let mut map = CalibrationMap::new();
        map.insert("left_elbow_flex".into(), sample(3));
        map.insert("right_elbow_flex".into(), sample(3));
        let left = filter_by_prefix(&map, "left");
        assert_eq!(left.keys().collect::<Vec<_>>(), vec!["left_elbow_flex"]);
    }
}
