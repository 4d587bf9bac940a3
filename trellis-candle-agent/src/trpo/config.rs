//! Configuration of [`Trpo`](super::Trpo).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trpo`](super::Trpo).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrpoConfig {
    /// Discount factor of the action-value judge.
    pub discount: f32,

    /// Maximum KL divergence of one policy step.
    pub max_kl: f64,

    /// Iteration budget of the conjugate-gradient solve.
    pub cg_iters: usize,

    /// Damping added to Fisher-vector products to keep the curvature
    /// estimate positive definite.
    pub cg_damping: f64,

    /// Fraction of trajectories the curvature estimate is computed on.
    pub subsample_frac: f64,

    /// Finite-difference scale of the Fisher-vector products.
    pub fvp_epsilon: f64,
}

impl Default for TrpoConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            max_kl: 0.01,
            cg_iters: 10,
            cg_damping: 1e-3,
            subsample_frac: 0.1,
            fvp_epsilon: 1e-2,
        }
    }
}

impl TrpoConfig {
    /// Sets the discount factor.
    pub fn discount(mut self, v: f32) -> Self {
        self.discount = v;
        self
    }

    /// Sets the trust-region radius.
    pub fn max_kl(mut self, v: f64) -> Self {
        self.max_kl = v;
        self
    }

    /// Sets the conjugate-gradient iteration budget.
    pub fn cg_iters(mut self, v: usize) -> Self {
        self.cg_iters = v;
        self
    }

    /// Sets the curvature damping.
    pub fn cg_damping(mut self, v: f64) -> Self {
        self.cg_damping = v;
        self
    }

    /// Sets the curvature subsample fraction.
    pub fn subsample_frac(mut self, v: f64) -> Self {
        self.subsample_frac = v;
        self
    }

    /// Constructs [`TrpoConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrpoConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
