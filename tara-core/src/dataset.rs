//! tara-core/src/dataset.rs
//!
//! On-disk episode dataset:
//!
//! ```text
//! <root>/<user>/<name>/
//!   meta/info.json        totals, fps, feature schema
//!   meta/tasks.jsonl      {"task_index", "task"} per line
//!   meta/episodes.jsonl   {"episode_index", "tasks", "length"} per line
//!   data/episode_000000.jsonl  one frame per line
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use tara_common::models::{Action, Features, Observation};
use crate::Error;

pub const CODEBASE_VERSION: &str = "tara-v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub codebase_version: String,
    pub repo_id: String,
    pub robot_type: String,
    pub fps: u32,
    pub total_episodes: u64,
    pub total_frames: u64,
    pub total_tasks: u64,
    /// `observation` and `action` feature schemas.
    pub features: BTreeMap<String, Features>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub episode_index: u64,
    pub frame_index: u64,
    /// Seconds since the start of the episode.
    pub timestamp: f64,
    pub task_index: u64,
    pub observation: Observation,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode_index: u64,
    pub tasks: Vec<String>,
    pub length: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskRecord {
    task_index: u64,
    task: String,
}

pub struct DatasetWriter {
    dir: PathBuf,
    info: DatasetInfo,
    tasks: Vec<String>,
    buffer: Vec<Frame>,
}

impl DatasetWriter {
    /// Starts a new dataset in `dir`. Fails if one already exists there.
    pub fn create(
        dir: &Path,
        repo_id: &str,
        robot_type: &str,
        fps: u32,
        observation_features: Features,
        action_features: Features,
    ) -> Result<Self, Error> {
        let info_path = dir.join("meta").join("info.json");
        if info_path.exists() {
            return Err(Error::Config(format!(
                "dataset already exists at {} (use --resume to append)",
                dir.display()
            )));
        }
        fs::create_dir_all(dir.join("meta"))?;
        fs::create_dir_all(dir.join("data"))?;

        let now = Utc::now();
        let mut features = BTreeMap::new();
        features.insert("observation".to_string(), observation_features);
        features.insert("action".to_string(), action_features);

        let writer = Self {
            dir: dir.to_path_buf(),
            info: DatasetInfo {
                codebase_version: CODEBASE_VERSION.to_string(),
                repo_id: repo_id.to_string(),
                robot_type: robot_type.to_string(),
                fps,
                total_episodes: 0,
                total_frames: 0,
                total_tasks: 0,
                features,
                created_at: now,
                updated_at: now,
            },
            tasks: Vec::new(),
            buffer: Vec::new(),
        };
        writer.write_info()?;
        info!("Created dataset {} at {}", repo_id, dir.display());
        Ok(writer)
    }

    /// Reopens an existing dataset; new episodes continue its numbering.
    pub fn resume(dir: &Path) -> Result<Self, Error> {
        let info_path = dir.join("meta").join("info.json");
        if !info_path.exists() {
            return Err(Error::Config(format!("no dataset to resume at {}", dir.display())));
        }
        let info: DatasetInfo = serde_json::from_str(&fs::read_to_string(&info_path)?)?;

        let tasks_path = dir.join("meta").join("tasks.jsonl");
        let mut tasks = Vec::new();
        if tasks_path.exists() {
            for line in fs::read_to_string(&tasks_path)?.lines().filter(|l| !l.trim().is_empty()) {
                let record: TaskRecord = serde_json::from_str(line)?;
                tasks.push(record.task);
            }
        }
        info!(
            "Resuming dataset {} at episode {} ({} frames so far)",
            info.repo_id, info.total_episodes, info.total_frames
        );
        Ok(Self { dir: dir.to_path_buf(), info, tasks, buffer: Vec::new() })
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fps(&self) -> u32 {
        self.info.fps
    }

    /// Index the next saved episode will get.
    pub fn next_episode_index(&self) -> u64 {
        self.info.total_episodes
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    pub fn episode_path(&self, episode_index: u64) -> PathBuf {
        self.dir.join("data").join(format!("episode_{episode_index:06}.jsonl"))
    }

    pub fn add_frame(&mut self, task: &str, observation: Observation, action: Action) {
        let position = self.tasks.iter().position(|t| t == task);
        let task_index = match position {
            Some(i) => i as u64,
            None => {
                self.tasks.push(task.to_string());
                (self.tasks.len() - 1) as u64
            }
        };
        let frame_index = self.buffer.len() as u64;
        self.buffer.push(Frame {
            episode_index: self.info.total_episodes,
            frame_index,
            timestamp: frame_index as f64 / self.info.fps as f64,
            task_index,
            observation,
            action,
        });
    }

    /// Flushes the buffered frames as one episode and updates the metadata.
    pub fn save_episode(&mut self) -> Result<EpisodeRecord, Error> {
        if self.buffer.is_empty() {
            return Err(Error::Config("cannot save an episode without frames".into()));
        }
        let episode_index = self.info.total_episodes;

        let mut data = String::new();
        for frame in &self.buffer {
            data.push_str(&serde_json::to_string(frame)?);
            data.push('\n');
        }
        fs::write(self.episode_path(episode_index), data)?;

        let mut task_indices: Vec<u64> = self.buffer.iter().map(|f| f.task_index).collect();
        task_indices.dedup();
        let record = EpisodeRecord {
            episode_index,
            tasks: task_indices
                .iter()
                .filter_map(|i| self.tasks.get(*i as usize).cloned())
                .collect(),
            length: self.buffer.len() as u64,
        };
        append_line(&self.dir.join("meta").join("episodes.jsonl"), &serde_json::to_string(&record)?)?;
        self.write_tasks()?;

        self.info.total_episodes += 1;
        self.info.total_frames += record.length;
        self.info.total_tasks = self.tasks.len() as u64;
        self.info.updated_at = Utc::now();
        self.write_info()?;
        self.buffer.clear();

        info!("Saved episode {} ({} frames)", episode_index, record.length);
        Ok(record)
    }

    fn write_info(&self) -> Result<(), Error> {
        let path = self.dir.join("meta").join("info.json");
        fs::write(path, serde_json::to_string_pretty(&self.info)?)?;
        Ok(())
    }

    fn write_tasks(&self) -> Result<(), Error> {
        let mut out = String::new();
        for (i, task) in self.tasks.iter().enumerate() {
            out.push_str(&serde_json::to_string(&TaskRecord { task_index: i as u64, task: task.clone() })?);
            out.push('\n');
        }
        fs::write(self.dir.join("meta").join("tasks.jsonl"), out)?;
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), Error> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Reads back every frame of one episode file.
pub fn read_episode(path: &Path) -> Result<Vec<Frame>, Error> {
    fs::read_to_string(path)?
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tara_common::models::features::float_features;

    fn obs(v: f64) -> Observation {
        Observation::from([("current_left".to_string(), v)])
    }

    fn act(v: f64) -> Action {
        Action::from([("left_wheel".to_string(), v)])
    }

    #[test]
    fn frames_get_timestamps_from_fps() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = DatasetWriter::create(
            dir.path(),
            "alice/demo",
            "tarabase",
            10,
            float_features(["current_left"]),
            float_features(["left_wheel"]),
        )
        .unwrap();

        for i in 0..3 {
            w.add_frame("drive", obs(i as f64), act(0.5));
        }
        let record = w.save_episode().unwrap();
        assert_eq!(record.length, 3);
        assert_eq!(record.tasks, vec!["drive".to_string()]);

        let frames = read_episode(&w.episode_path(0)).unwrap();
        assert_eq!(frames[2].frame_index, 2);
        assert!((frames[2].timestamp - 0.2).abs() < 1e-9);
        assert_eq!(frames[1].observation["current_left"], 1.0);
    }

    #[test]
    fn empty_episode_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = DatasetWriter::create(dir.path(), "a/b", "tara", 30, Features::new(), Features::new()).unwrap();
        assert!(w.save_episode().is_err());
    }
}
