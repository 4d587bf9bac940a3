//! Trajectories and rollout sets.
use crate::error::TrellisError;
use crate::tape::{Tape, TapeWriter};
use crate::Obs;

/// One recorded episode (or truncated segment) for a single environment slot.
///
/// Observations live on a compressed tape; the action, reward and
/// log-probability columns are parallel vectors of the same length.
pub struct Trajectory<O: Obs> {
    obs: Tape<O>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    log_probs: Vec<f32>,
    terminated: bool,
}

impl<O: Obs> Trajectory<O> {
    /// Number of steps recorded.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// True if no steps were recorded.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Sequential decompressing reader over the observations.
    pub fn observations(&self) -> crate::tape::TapeIter<'_, O> {
        self.obs.iter()
    }

    /// Indices of the actions taken, one per step.
    pub fn actions(&self) -> &[usize] {
        &self.actions
    }

    /// Rewards received, one per step.
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    /// Log-probabilities of the taken actions at selection time.
    pub fn log_probs(&self) -> &[f32] {
        &self.log_probs
    }

    /// True if the episode ended with the environment's done flag, false if
    /// the aggregate step cap closed it early.
    pub fn terminated(&self) -> bool {
        self.terminated
    }
}

/// Builder accumulating one trajectory during collection.
pub struct TrajectoryWriter<O: Obs> {
    obs: TapeWriter<O>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    log_probs: Vec<f32>,
}

impl<O: Obs> TrajectoryWriter<O> {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            obs: TapeWriter::new(),
            actions: Vec::new(),
            rewards: Vec::new(),
            log_probs: Vec::new(),
        }
    }

    /// Appends one step.
    pub fn push(
        &mut self,
        obs: &O,
        action: usize,
        reward: f32,
        log_prob: f32,
    ) -> Result<(), TrellisError> {
        self.obs.push(obs)?;
        self.actions.push(action);
        self.rewards.push(reward);
        self.log_probs.push(log_prob);
        Ok(())
    }

    /// Number of steps recorded so far.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// True if no steps were recorded.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Freezes the trajectory. `terminated` records whether the episode
    /// ended with the environment's done flag.
    pub fn finish(self, terminated: bool) -> Result<Trajectory<O>, TrellisError> {
        let obs = self.obs.finish()?;
        debug_assert_eq!(obs.len(), self.rewards.len());
        Ok(Trajectory {
            obs,
            actions: self.actions,
            rewards: self.rewards,
            log_probs: self.log_probs,
            terminated,
        })
    }
}

impl<O: Obs> Default for TrajectoryWriter<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean and variance of rewards over all (trajectory, timestep) samples.
///
/// The variance is the second central moment (divide by `n`), matching the
/// estimator used for the progress statistics in training logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardStats {
    /// Mean reward per step.
    pub mean: f32,

    /// Population variance of the per-step rewards.
    pub variance: f32,

    /// Number of reward samples.
    pub count: usize,
}

impl RewardStats {
    fn from_samples<'a, I: Iterator<Item = &'a f32> + Clone>(samples: I) -> Self {
        let count = samples.clone().count();
        if count == 0 {
            return Self {
                mean: 0.0,
                variance: 0.0,
                count: 0,
            };
        }
        let sum: f32 = samples.clone().sum();
        let mean = sum / count as f32;
        let sq_dev: f32 = samples.map(|r| (r - mean) * (r - mean)).sum();
        Self {
            mean,
            variance: sq_dev / count as f32,
            count,
        }
    }
}

/// A batch of trajectories collected together, annotated with its total step
/// count and reward statistics. Immutable once produced.
pub struct RolloutSet<O: Obs> {
    trajectories: Vec<Trajectory<O>>,
    num_steps: usize,
    reward_stats: RewardStats,
}

impl<O: Obs> RolloutSet<O> {
    /// Builds a set from trajectories, computing step count and statistics.
    pub fn from_trajectories(trajectories: Vec<Trajectory<O>>) -> Self {
        let num_steps = trajectories.iter().map(Trajectory::len).sum();
        let reward_stats =
            RewardStats::from_samples(trajectories.iter().flat_map(|t| t.rewards.iter()));
        Self {
            trajectories,
            num_steps,
            reward_stats,
        }
    }

    /// The trajectories in insertion order.
    pub fn trajectories(&self) -> &[Trajectory<O>] {
        &self.trajectories
    }

    /// Total step count across all trajectories.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Reward statistics over all (trajectory, timestep) samples.
    pub fn reward_stats(&self) -> RewardStats {
        self.reward_stats
    }
}

/// Merges rollout sets into one, preserving insertion order across inputs.
///
/// The total step count is the sum of the inputs' counts and the reward
/// statistics are recomputed over the union of reward samples.
pub fn pack<O: Obs>(sets: Vec<RolloutSet<O>>) -> RolloutSet<O> {
    let trajectories = sets
        .into_iter()
        .flat_map(|s| s.trajectories.into_iter())
        .collect();
    RolloutSet::from_trajectories(trajectories)
}
