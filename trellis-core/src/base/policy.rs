//! Policy seam used during rollout collection.
use super::Env;
use anyhow::Result;

/// One sampled action together with its bookkeeping.
pub struct Decision<A> {
    /// The action to apply to the environment.
    pub act: A,

    /// Index of the action in the discrete action set.
    pub index: usize,

    /// Log-probability of the action under the distribution it was
    /// sampled from.
    pub log_prob: f32,
}

/// A policy with per-slot recurrent state, driven by the roller.
///
/// The forward pass is batched over slots and stays on the calling thread;
/// implementations are not required to be reentrant.
pub trait RolloutPolicy<E: Env> {
    /// Clears the recurrent state of one environment slot.
    fn begin_episode(&mut self, slot: usize);

    /// Runs one forward pass over the given slots and samples one action
    /// per slot from the resulting categorical distributions.
    ///
    /// `slots[i]` identifies the recurrent state to advance for `obs[i]`.
    fn select_actions(
        &mut self,
        slots: &[usize],
        obs: &[&E::Obs],
    ) -> Result<Vec<Decision<E::Act>>>;
}
