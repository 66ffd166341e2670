//! Save and restore complete training state.
//!
//! A checkpoint holds everything needed to continue training exactly where
//! it stopped: the config, the network, the representative initial states,
//! the optimizer's momentum buffers and adaptive rate, and the number of
//! completed epochs. Files are bincode encoded.

use crate::config::TrainingConfig;
use crate::error::{CtrnnError, Result};
use crate::rnn::Ctrnn;
use crate::training::OptimizerState;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of completed epochs.
    pub epoch: usize,
    /// Stored as JSON text: the config uses internally tagged enums, which
    /// bincode cannot decode.
    #[serde(with = "config_as_json")]
    pub config: TrainingConfig,
    pub network: Ctrnn,
    pub representative_points: Array2<f64>,
    pub optimizer: OptimizerState,
}

mod config_as_json {
    use crate::config::TrainingConfig;
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        config: &TrainingConfig,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let json = serde_json::to_string(config).map_err(ser::Error::custom)?;
        serializer.serialize_str(&json)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<TrainingConfig, D::Error> {
        let json = String::deserialize(deserializer)?;
        serde_json::from_str(&json).map_err(de::Error::custom)
    }
}

fn encode(checkpoint: &Checkpoint, path: &Path) -> Result<Vec<u8>> {
    bincode::serialize(checkpoint).map_err(|e| CtrnnError::Serialization {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_bytes(bytes: &[u8], path: &Path) -> Result<()> {
    std::fs::write(path, bytes).map_err(|source| CtrnnError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `checkpoint` to `path`.
pub fn save(checkpoint: &Checkpoint, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(checkpoint, path)?;
    write_bytes(&bytes, path)
}

/// Reads a checkpoint written by [`save`].
pub fn load(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| CtrnnError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    bincode::deserialize(&data).map_err(|e| CtrnnError::Serialization {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Encodes checkpoints on the calling thread and writes them on a
/// background thread.
///
/// At most one write is in flight: a new write first waits for the
/// previous one, and [`finish`](Self::finish) waits for the last.
#[derive(Debug, Default)]
pub struct DeferredCheckpointWriter {
    pending: Option<(PathBuf, JoinHandle<Result<()>>)>,
}

impl DeferredCheckpointWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, checkpoint: &Checkpoint, path: impl Into<PathBuf>) -> Result<()> {
        self.finish()?;
        let path = path.into();
        let bytes = encode(checkpoint, &path)?;
        let target = path.clone();
        let handle = thread::spawn(move || write_bytes(&bytes, &target));
        debug!(path = %path.display(), "checkpoint write started");
        self.pending = Some((path, handle));
        Ok(())
    }

    /// Waits for the write in flight, if any, and returns its outcome.
    pub fn finish(&mut self) -> Result<()> {
        match self.pending.take() {
            None => Ok(()),
            Some((path, handle)) => handle.join().unwrap_or_else(|_| {
                Err(CtrnnError::Io {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "checkpoint writer thread panicked",
                    ),
                })
            }),
        }
    }
}

impl Drop for DeferredCheckpointWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::error!(error = %e, "pending checkpoint write failed");
        }
    }
}
