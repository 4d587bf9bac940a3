//! Shared test doubles.
use crate::{Act, Decision, Env, EnvStep, Obs, RolloutPolicy};
use anyhow::Result;

impl Obs for u32 {}
impl Act for usize {}

/// Environment that replays a fixed reward sequence per episode, ending the
/// episode on the last reward and resetting itself.
pub struct FixedEpisodeEnv {
    rewards: Vec<f32>,
    t: usize,
    obs_counter: u32,
}

impl Env for FixedEpisodeEnv {
    type Config = Vec<f32>;
    type Obs = u32;
    type Act = usize;

    fn build(config: &Self::Config) -> Result<Self> {
        Ok(Self {
            rewards: config.clone(),
            t: 0,
            obs_counter: 0,
        })
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.t = 0;
        self.obs_counter += 1;
        Ok(self.obs_counter)
    }

    fn step(&mut self, _act: &Self::Act) -> Result<EnvStep<Self::Obs>> {
        let reward = self.rewards[self.t];
        self.t += 1;
        let done = self.t == self.rewards.len();
        if done {
            self.t = 0;
        }
        self.obs_counter += 1;
        Ok(EnvStep {
            obs: self.obs_counter,
            reward,
            done,
        })
    }
}

/// Policy double that always picks the same action with probability 0.5 and
/// counts how often an episode was begun.
pub struct CountingPolicy {
    action: usize,
    pub episodes_begun: usize,
}

impl CountingPolicy {
    pub fn new(action: usize) -> Self {
        Self {
            action,
            episodes_begun: 0,
        }
    }
}

impl<E> RolloutPolicy<E> for CountingPolicy
where
    E: Env<Obs = u32, Act = usize>,
{
    fn begin_episode(&mut self, _slot: usize) {
        self.episodes_begun += 1;
    }

    fn select_actions(
        &mut self,
        slots: &[usize],
        _obs: &[&u32],
    ) -> Result<Vec<Decision<usize>>> {
        Ok(slots
            .iter()
            .map(|_| Decision {
                act: self.action,
                index: self.action,
                log_prob: 0.5f32.ln(),
            })
            .collect())
    }
}
