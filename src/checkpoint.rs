//! JSON snapshots of training progress.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brain::{BrainKind, WeightArena};
use crate::error::CheckpointError;
use crate::training::LeaderboardSnapshot;

/// Leaderboard, and for arena-backed models the arena, at a given epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Wall-clock time of creation.
    pub created_at: DateTime<Utc>,
    /// Architecture of the stored genomes.
    pub model: BrainKind,
    /// Epoch the checkpoint was taken after.
    pub epoch: usize,
    /// Best genomes and their records.
    pub leaders: LeaderboardSnapshot,
    /// Weights referenced by index genomes.
    pub arena: Option<WeightArena>,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time.
    pub fn new(
        model: BrainKind,
        epoch: usize,
        leaders: LeaderboardSnapshot,
        arena: Option<WeightArena>,
    ) -> Self {
        Self {
            created_at: Utc::now(),
            model,
            epoch,
            leaders,
            arena,
        }
    }

    /// File name used for `model` inside a checkpoint directory.
    pub fn file_name(model: BrainKind) -> String {
        format!("pathfinder_m{}.json", model.index())
    }

    /// Full path of the checkpoint for `model` inside `dir`.
    pub fn path_in(dir: &Path, model: BrainKind) -> PathBuf {
        dir.join(Self::file_name(model))
    }

    /// Writes the checkpoint as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Saved checkpoint of epoch {} to {}", self.epoch, path.display());
        Ok(())
    }

    /// Reads a checkpoint written by [`Checkpoint::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self, CheckpointError> {
        let json = std::fs::read_to_string(path)?;
        let checkpoint = serde_json::from_str(&json)?;
        Ok(checkpoint)
    }
}
