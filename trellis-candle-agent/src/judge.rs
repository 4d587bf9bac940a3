//! Discounted action-value estimation.
use trellis_core::{Obs, RolloutSet};

/// Judges state-action pairs by their discounted reward-to-go:
/// `Q(t) = r(t) + discount * Q(t+1)`, with `Q = 0` past the end of the
/// trajectory.
pub struct QJudger {
    discount: f32,
}

impl QJudger {
    /// Creates a judge with the given discount factor.
    pub fn new(discount: f32) -> Self {
        Self { discount }
    }

    /// Discounted suffix sums of one trajectory's rewards.
    pub fn action_values(&self, rewards: &[f32]) -> Vec<f32> {
        let mut values = vec![0.0f32; rewards.len()];
        let mut acc = 0.0f32;
        for (v, r) in values.iter_mut().zip(rewards.iter()).rev() {
            acc = r + self.discount * acc;
            *v = acc;
        }
        values
    }

    /// Per-trajectory advantages: action values minus the batch-mean
    /// baseline. The constant baseline reduces variance without biasing the
    /// gradient.
    pub fn advantages<O: Obs>(&self, batch: &RolloutSet<O>) -> Vec<Vec<f32>> {
        let mut values: Vec<Vec<f32>> = batch
            .trajectories()
            .iter()
            .map(|t| self.action_values(t.rewards()))
            .collect();
        let count: usize = values.iter().map(Vec::len).sum();
        if count == 0 {
            return values;
        }
        let baseline = values.iter().flatten().sum::<f32>() / count as f32;
        for traj in values.iter_mut() {
            for v in traj.iter_mut() {
                *v -= baseline;
            }
        }
        values
    }
}
