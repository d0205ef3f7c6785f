// tara-common/src/config/dataset.rs

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::config::{default_dataset_root, MAX_FPS};
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// `<user>/<name>`; also the directory name under `root`.
    pub repo_id: String,
    pub single_task: String,
    pub root: Option<PathBuf>,
    pub fps: u32,
    pub episode_time_s: f64,
    pub reset_time_s: f64,
    pub num_episodes: u32,
    /// Accepted for compatibility; uploads are not performed.
    pub push_to_hub: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            repo_id: String::new(),
            single_task: String::new(),
            root: None,
            fps: 30,
            episode_time_s: 60.0,
            reset_time_s: 60.0,
            num_episodes: 50,
            push_to_hub: false,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let mut parts = self.repo_id.split('/');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(user), Some(name), None) if !user.is_empty() && !name.is_empty()
        );
        if !well_formed {
            return Err(Error::Config(format!(
                "dataset.repo_id must look like `<user>/<name>`, got `{}`",
                self.repo_id
            )));
        }
        if !(1..=MAX_FPS).contains(&self.fps) {
            return Err(Error::Config(format!("dataset.fps must be in 1..={MAX_FPS}, got {}", self.fps)));
        }
        if !(self.episode_time_s > 0.0 && self.reset_time_s >= 0.0) {
            return Err(Error::Config("episode_time_s must be positive and reset_time_s non-negative".into()));
        }
        Ok(())
    }

    /// Directory holding this dataset.
    pub fn dataset_dir(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(default_dataset_root)
            .join(&self.repo_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_needs_user_and_name() {
        let mut cfg = DatasetConfig { repo_id: "alice/record-test".into(), ..Default::default() };
        assert!(cfg.validate().is_ok());

        cfg.repo_id = "record-test".into();
        assert!(cfg.validate().is_err());
        cfg.repo_id = "a/b/c".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loop_rate_and_times_are_bounded() {
        let ok = DatasetConfig { repo_id: "alice/demo".into(), ..Default::default() };
        assert!(DatasetConfig { fps: 0, ..ok.clone() }.validate().is_err());
        assert!(DatasetConfig { fps: MAX_FPS + 1, ..ok.clone() }.validate().is_err());
        assert!(DatasetConfig { episode_time_s: f64::NAN, ..ok.clone() }.validate().is_err());
        assert!(DatasetConfig { fps: MAX_FPS, ..ok }.validate().is_ok());
    }

    #[test]
    fn dataset_dir_uses_root_override() {
        let cfg = DatasetConfig {
            repo_id: "alice/demo".into(),
            root: Some(PathBuf::from("/tmp/ds")),
            ..Default::default()
        };
        assert_eq!(cfg.dataset_dir(), PathBuf::from("/tmp/ds/alice/demo"));
    }
}
