//! Environment.
use super::{Act, Obs};
use anyhow::Result;

/// The result of one environment step.
pub struct EnvStep<O> {
    /// The next observation. When `done` is set, the environment has already
    /// reset itself and this is the first observation of the next episode.
    pub obs: O,

    /// Reward received for the step.
    pub reward: f32,

    /// Whether the episode ended with this step.
    pub done: bool,
}

/// Represents an environment, typically an MDP.
///
/// Instances are independently stateful: a pool holds one per slot and no
/// state is shared between them. Construction failure is fatal at startup,
/// and a step error mid-rollout is unrecoverable for the process.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Obs;

    /// Action of the environment.
    type Act: Act;

    /// Builds an environment.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Performs an environment step, resetting on episode end.
    fn step(&mut self, act: &Self::Act) -> Result<EnvStep<Self::Obs>>;
}
