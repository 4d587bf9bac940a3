//! Rollout collection over a pool of environments.
use crate::error::TrellisError;
use crate::rollout::{RolloutSet, Trajectory, TrajectoryWriter};
use crate::{Env, EnvStep, RolloutPolicy};
use anyhow::Result;
use log::debug;
use std::mem;

/// Drives a policy over a pool of environments to produce a [`RolloutSet`].
///
/// Collection runs all slots in lockstep: one batched forward pass selects
/// an action per live slot, then every live environment is stepped. A slot
/// whose episode ends starts a new one as long as the aggregate step count
/// is below the target; afterwards it drains, finishing its in-flight
/// episode and going idle. The call returns once every slot has drained.
pub struct Roller {
    steps_per_rollout: usize,
}

impl Roller {
    /// Creates a roller with the given aggregate step target per call.
    pub fn new(steps_per_rollout: usize) -> Self {
        Self { steps_per_rollout }
    }

    /// Collects trajectories from the pool until the aggregate step target
    /// is reached and every in-flight episode has finished.
    pub fn rollout<E, P>(&self, envs: &mut [E], policy: &mut P) -> Result<RolloutSet<E::Obs>>
    where
        E: Env + Send,
        P: RolloutPolicy<E>,
    {
        if envs.is_empty() {
            return Err(TrellisError::EmptyPool.into());
        }
        let n = envs.len();
        let mut current: Vec<Option<E::Obs>> = Vec::with_capacity(n);
        for (slot, env) in envs.iter_mut().enumerate() {
            current.push(Some(env.reset()?));
            policy.begin_episode(slot);
        }
        let mut writers: Vec<TrajectoryWriter<E::Obs>> =
            (0..n).map(|_| TrajectoryWriter::new()).collect();
        let mut finished: Vec<Trajectory<E::Obs>> = Vec::new();
        let mut total = 0usize;

        loop {
            let mut slots = Vec::with_capacity(n);
            let mut obs_refs = Vec::with_capacity(n);
            for (slot, obs) in current.iter().enumerate() {
                if let Some(obs) = obs {
                    slots.push(slot);
                    obs_refs.push(obs);
                }
            }
            if slots.is_empty() {
                break;
            }

            let decisions = policy.select_actions(&slots, &obs_refs)?;
            debug_assert_eq!(decisions.len(), slots.len());

            let mut results = Self::step_pool(envs, &slots, |k| decisions[k].act.clone());

            for (k, &slot) in slots.iter().enumerate() {
                let step = results[slot].take().expect("live slot was not stepped")?;
                let obs = current[slot].take().expect("live slot without observation");
                let decision = &decisions[k];
                writers[slot].push(&obs, decision.index, step.reward, decision.log_prob)?;
                total += 1;
                if step.done {
                    let writer = mem::replace(&mut writers[slot], TrajectoryWriter::new());
                    finished.push(writer.finish(true)?);
                    if total < self.steps_per_rollout {
                        policy.begin_episode(slot);
                        current[slot] = Some(step.obs);
                    }
                } else {
                    current[slot] = Some(step.obs);
                }
            }
        }
        debug_assert!(writers.iter().all(TrajectoryWriter::is_empty));

        let set = RolloutSet::from_trajectories(finished);
        debug!(
            "rollout: trajectories={} steps={} mean={}",
            set.trajectories().len(),
            set.num_steps(),
            set.reward_stats().mean
        );
        Ok(set)
    }

    /// Steps the live environments, fanning out across scoped worker
    /// threads. Each slot's environment (and preprocessor) state is private
    /// to its thread for the duration of the step.
    fn step_pool<E, F>(
        envs: &mut [E],
        slots: &[usize],
        act_for: F,
    ) -> Vec<Option<Result<EnvStep<E::Obs>>>>
    where
        E: Env + Send,
        F: Fn(usize) -> E::Act,
    {
        let n = envs.len();
        let mut acts: Vec<Option<E::Act>> = (0..n).map(|_| None).collect();
        for (k, &slot) in slots.iter().enumerate() {
            acts[slot] = Some(act_for(k));
        }
        let mut results: Vec<Option<Result<EnvStep<E::Obs>>>> = (0..n).map(|_| None).collect();
        std::thread::scope(|s| {
            for ((env, act), res) in envs.iter_mut().zip(acts).zip(results.iter_mut()) {
                if let Some(act) = act {
                    s.spawn(move || {
                        *res = Some(env.step(&act));
                    });
                }
            }
        });
        results
    }
}
