//! Configuration of [`Trainer`](super::Trainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Aggregate environment steps gathered per optimization batch.
    pub batch_steps: usize,

    /// Aggregate step target of a single rollout call.
    pub steps_per_rollout: usize,

    /// Whether to log per-parameter update magnitudes each batch.
    pub log_param_norms: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_steps: 100_000,
            steps_per_rollout: 10_000,
            log_param_norms: true,
        }
    }
}

impl TrainerConfig {
    /// Sets the aggregate steps gathered per optimization batch.
    pub fn batch_steps(mut self, v: usize) -> Self {
        self.batch_steps = v;
        self
    }

    /// Sets the aggregate step target of a single rollout call.
    pub fn steps_per_rollout(mut self, v: usize) -> Self {
        self.steps_per_rollout = v;
        self
    }

    /// Sets whether per-parameter update magnitudes are logged.
    pub fn log_param_norms(mut self, v: bool) -> Self {
        self.log_param_norms = v;
        self
    }

    /// Constructs [`TrainerConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
