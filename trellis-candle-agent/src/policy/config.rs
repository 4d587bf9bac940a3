//! Configuration of [`PolicyNet`](super::PolicyNet).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`PolicyNet`](super::PolicyNet).
///
/// The convolutional trunk is fixed (two stride-2 4x4 layers with 16 and 32
/// filters); the surrounding dimensions are configurable.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PolicyNetConfig {
    /// Height of the preprocessed input planes.
    pub in_height: usize,

    /// Width of the preprocessed input planes.
    pub in_width: usize,

    /// Number of discrete actions.
    pub n_actions: usize,

    /// Number of past observations stacked along the channel axis.
    pub history: usize,

    /// Multiplier applied to the input planes before the trunk.
    pub input_scale: f64,

    /// Width of the fully-connected layer after the trunk.
    pub fc_dim: usize,

    /// Width of the recurrent cell.
    pub rnn_dim: usize,

    /// Adds one to every vision-layer bias after construction.
    /// Diagnostic only; leave off for training.
    pub boost_biases: bool,
}

impl Default for PolicyNetConfig {
    fn default() -> Self {
        Self {
            in_height: 105,
            in_width: 80,
            n_actions: 6,
            history: 1,
            input_scale: 0.01,
            fc_dim: 128,
            rnn_dim: 128,
            boost_biases: false,
        }
    }
}

impl PolicyNetConfig {
    /// Sets the input plane size.
    pub fn in_shape(mut self, height: usize, width: usize) -> Self {
        self.in_height = height;
        self.in_width = width;
        self
    }

    /// Sets the number of discrete actions.
    pub fn n_actions(mut self, v: usize) -> Self {
        self.n_actions = v;
        self
    }

    /// Sets the number of stacked observations.
    pub fn history(mut self, v: usize) -> Self {
        self.history = v;
        self
    }

    /// Sets the width of the fully-connected layer.
    pub fn fc_dim(mut self, v: usize) -> Self {
        self.fc_dim = v;
        self
    }

    /// Sets the width of the recurrent cell.
    pub fn rnn_dim(mut self, v: usize) -> Self {
        self.rnn_dim = v;
        self
    }

    /// Enables the diagnostic bias boost.
    pub fn boost_biases(mut self, v: bool) -> Self {
        self.boost_biases = v;
        self
    }

    /// Constructs [`PolicyNetConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PolicyNetConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
