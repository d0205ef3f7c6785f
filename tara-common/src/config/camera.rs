//! tara-common/src/config/camera.rs
//!
//! Camera specs as given on the command line, e.g.
//! `{ front: {type: opencv, index_or_path: 0, width: 1920, height: 1080, fps: 30}}`.
//! The literal is a YAML flow mapping.

use std::collections::BTreeMap;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    Opencv,
    Realsense,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexOrPath {
    Index(u32),
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(rename = "type")]
    pub kind: CameraKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_or_path: Option<IndexOrPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number_or_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

impl CameraConfig {
    pub fn validate(&self, name: &str) -> Result<(), Error> {
        match self.kind {
            CameraKind::Opencv if self.index_or_path.is_none() => Err(Error::Config(format!(
                "camera '{name}': opencv cameras need `index_or_path`"
            ))),
            CameraKind::Realsense if self.serial_number_or_name.is_none() => Err(Error::Config(format!(
                "camera '{name}': realsense cameras need `serial_number_or_name`"
            ))),
            _ => {
                if self.width.is_some() != self.height.is_some() {
                    return Err(Error::Config(format!(
                        "camera '{name}': width and height must be given together"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Parses the `--robot.cameras` literal. An empty string means no cameras.
pub fn parse_cameras(literal: &str) -> Result<BTreeMap<String, CameraConfig>, Error> {
    if literal.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let cameras: BTreeMap<String, CameraConfig> = serde_yaml::from_str(literal)?;
    for (name, cam) in &cameras {
        cam.validate(name)?;
    }
    Ok(cameras)
}
