#![warn(missing_docs)]
//! Core abstractions for on-policy reinforcement learning from pixels.
//!
//! This crate is backend-agnostic: it knows nothing about tensors or
//! automatic differentiation. It provides the environment and policy seams,
//! the compressed observation tape, trajectory collection and packing, and
//! the training-loop lifecycle. Numerics live in `trellis-candle-agent`;
//! the environment transport lives in `trellis-gym-env`.
pub mod error;
pub mod tape;

mod base;
pub use base::{Act, Decision, Env, EnvStep, Obs, PlanarObs, RolloutPolicy};

mod rollout;
pub use rollout::{pack, RewardStats, RolloutSet, Trajectory, TrajectoryWriter};

mod roller;
pub use roller::Roller;

mod trainer;
pub use trainer::{PolicyLearner, Trainer, TrainerConfig, UpdateDiagnostics};

#[cfg(test)]
mod testing;
