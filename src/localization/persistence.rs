//! History files: background saving and the read-only replay loader
//!
//! A history file is a JSON document tagged with a format name and version
//! so that older recordings can be recognised when the layout evolves.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::common::{LocalizationError, LocalizationResult};
use crate::localization::world_state::WorldState;

pub const HISTORY_FORMAT: &str = "mcl-history";
pub const HISTORY_VERSION: u32 = 1;

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    format: &'a str,
    version: u32,
    map_key: &'a str,
    recorded_at: String,
    states: &'a [Arc<WorldState>],
}

/// Contents of a persisted run
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryFile {
    pub format: String,
    pub version: u32,
    pub map_key: String,
    pub recorded_at: String,
    pub states: Vec<WorldState>,
}

/// File name for a run started at `time`
pub fn history_file_name(time: &DateTime<Local>) -> String {
    format!("{}-{}.json", HISTORY_FORMAT, time.format("%Y%m%d-%H%M%S-%3f"))
}

/// Write `states` to `path`, creating parent directories as needed
pub fn write_history(
    path: &Path,
    map_key: &str,
    recorded_at: &DateTime<Local>,
    states: &[Arc<WorldState>],
) -> LocalizationResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = HistoryFileRef {
        format: HISTORY_FORMAT,
        version: HISTORY_VERSION,
        map_key,
        recorded_at: recorded_at.to_rfc3339(),
        states,
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &file)?;
    writer.flush()?;
    Ok(())
}

/// Save a history on a separate thread.
///
/// Failures are logged and never reach the filter; the handle yields the
/// written path on success and may simply be dropped.
pub fn persist_in_background(
    dir: PathBuf,
    map_key: String,
    started_at: DateTime<Local>,
    states: Vec<Arc<WorldState>>,
) -> JoinHandle<Option<PathBuf>> {
    thread::spawn(move || {
        let path = dir.join(history_file_name(&started_at));
        match write_history(&path, &map_key, &started_at, &states) {
            Ok(()) => {
                info!("saved {} world states to {}", states.len(), path.display());
                Some(path)
            }
            Err(e) => {
                warn!("failed to save history to {}: {}", path.display(), e);
                None
            }
        }
    })
}

/// Random access to a persisted run, independent of any engine
#[derive(Debug, Clone)]
pub struct HistoryReplay {
    file: HistoryFile,
}

impl HistoryReplay {
    pub fn load<P: AsRef<Path>>(path: P) -> LocalizationResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let file: HistoryFile = serde_json::from_reader(reader)?;
        Self::from_file(file)
    }

    pub fn from_file(file: HistoryFile) -> LocalizationResult<Self> {
        if file.format != HISTORY_FORMAT {
            return Err(LocalizationError::UnsupportedFormat(format!(
                "expected '{}', found '{}'",
                HISTORY_FORMAT, file.format
            )));
        }
        if file.version > HISTORY_VERSION {
            return Err(LocalizationError::UnsupportedFormat(format!(
                "version {} is newer than supported version {}",
                file.version, HISTORY_VERSION
            )));
        }
        Ok(HistoryReplay { file })
    }

    pub fn len(&self) -> usize {
        self.file.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.states.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WorldState> {
        self.file.states.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldState> {
        self.file.states.iter()
    }

    pub fn map_key(&self) -> &str {
        &self.file.map_key
    }

    pub fn recorded_at(&self) -> &str {
        &self.file.recorded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Pose;
    use crate::localization::convergence::ConvergenceState;
    use crate::localization::particle::Particle;
    use crate::localization::sensor::SensorReading;

    fn states(n: usize) -> Vec<Arc<WorldState>> {
        (0..n)
            .map(|i| {
                Arc::new(WorldState {
                    particles: vec![Particle::new(Pose::new(i as f64, 2.0, 90.0)); 3],
                    estimated_pose: Pose::new(i as f64, 2.0, 90.0),
                    estimated_spreading: 0.0,
                    causative_instruction: format!("move {}", i),
                    sensor_reading: Some(SensorReading::center_only(40.0)),
                    map_key: "arena".to_string(),
                    convergence: ConvergenceState::Searching,
                })
            })
            .collect()
    }

    #[test]
    fn test_file_name_carries_timestamp() {
        let time = Local::now();
        let name = history_file_name(&time);
        assert!(name.starts_with("mcl-history-"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_write_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.json");
        let recorded = states(4);
        write_history(&path, "arena", &Local::now(), &recorded).unwrap();

        let replay = HistoryReplay::load(&path).unwrap();
        assert_eq!(replay.len(), 4);
        assert_eq!(replay.map_key(), "arena");
        assert_eq!(replay.get(2).unwrap(), recorded[2].as_ref());
        assert!(replay.get(4).is_none());
        assert_eq!(
            replay.iter().map(|s| s.causative_instruction.as_str()).last(),
            Some("move 3")
        );
    }

    #[test]
    fn test_background_persist_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = persist_in_background(
            dir.path().to_path_buf(),
            "arena".to_string(),
            Local::now(),
            states(2),
        );
        let path = handle.join().unwrap().expect("history saved");
        assert!(path.starts_with(dir.path()));
        assert_eq!(HistoryReplay::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_background_persist_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let handle = persist_in_background(blocker, "arena".to_string(), Local::now(), states(1));
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let file = HistoryFile {
            format: "something-else".to_string(),
            version: 1,
            map_key: "arena".to_string(),
            recorded_at: String::new(),
            states: Vec::new(),
        };
        assert!(matches!(
            HistoryReplay::from_file(file),
            Err(LocalizationError::UnsupportedFormat(_))
        ));

        let file = HistoryFile {
            format: HISTORY_FORMAT.to_string(),
            version: HISTORY_VERSION + 1,
            map_key: "arena".to_string(),
            recorded_at: String::new(),
            states: Vec::new(),
        };
        assert!(HistoryReplay::from_file(file).is_err());
    }
}
