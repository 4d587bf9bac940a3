//! Continuous training loop.
mod config;

use crate::rollout::{pack, RolloutSet};
use crate::{Env, Roller, RolloutPolicy};
use anyhow::Result;
use crossbeam_channel::{Receiver, TryRecvError};
use log::info;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use config::TrainerConfig;

/// Diagnostics exposed by a parameter update, for progress logging.
pub trait UpdateDiagnostics {
    /// Per-parameter update magnitudes, in stable parameter order.
    fn magnitudes(&self) -> Vec<(String, f32)>;
}

/// What the training loop needs from an agent beyond rollout collection:
/// computing a trust-region update from a packed batch, applying it exactly
/// once, and persisting a checkpoint.
pub trait PolicyLearner<E: Env>: RolloutPolicy<E> {
    /// The per-parameter update produced by one optimization step.
    type Update: UpdateDiagnostics;

    /// Computes an update from a packed batch of rollouts. Does not mutate
    /// parameter values.
    fn compute_update(&mut self, batch: &RolloutSet<E::Obs>) -> Result<Self::Update>;

    /// Applies an update to the live parameter values, consuming it.
    fn apply_update(&mut self, update: Self::Update) -> Result<()>;

    /// Persists a checkpoint of the policy to durable storage.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Runs the continuous collect/pack/optimize/apply loop.
///
/// Each iteration holds the agent mutex for its entire span: the forward
/// pass is not assumed reentrant, and compute-through-apply must be atomic
/// with respect to the checkpoint-on-exit path, which locks the same mutex.
/// The stop channel is only observed at iteration boundaries, so a save can
/// never see a half-applied update.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// Creates a trainer.
    pub fn build(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Trains until the stop channel fires or disconnects.
    ///
    /// Any environment or numerics error is unrecoverable and propagates
    /// out of the loop.
    pub fn train<E, A>(
        &self,
        mut envs: Vec<E>,
        agent: Arc<Mutex<A>>,
        stop: Receiver<()>,
    ) -> Result<()>
    where
        E: Env + Send,
        A: PolicyLearner<E>,
    {
        let roller = Roller::new(self.config.steps_per_rollout);
        for batch_idx in 0.. {
            match stop.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    info!("stop signal received, leaving training loop");
                    return Ok(());
                }
                Err(TryRecvError::Empty) => {}
            }
            let mut agent = agent.lock().unwrap();

            info!("batch {}: gathering experience", batch_idx);
            let mut sets = Vec::new();
            let mut steps = 0usize;
            while steps < self.config.batch_steps {
                let set = roller.rollout(&mut envs, &mut *agent)?;
                steps += set.num_steps();
                info!(
                    "batch {}: steps={} sub_mean={}",
                    batch_idx,
                    steps,
                    set.reward_stats().mean
                );
                sets.push(set);
            }

            let batch = pack(sets);
            let stats = batch.reward_stats();
            info!(
                "batch {}: mean={} stddev={}",
                batch_idx,
                stats.mean,
                stats.variance.sqrt()
            );

            info!("batch {}: optimizing", batch_idx);
            let update = agent.compute_update(&batch)?;
            if self.config.log_param_norms {
                for (name, mag) in update.magnitudes() {
                    info!("param {} mag {}", name, mag);
                }
            }
            agent.apply_update(update)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingPolicy, FixedEpisodeEnv};
    use crate::{Decision, Env};
    use crossbeam_channel::{bounded, unbounded, Sender};
    use std::thread;

    struct NullUpdate;

    impl UpdateDiagnostics for NullUpdate {
        fn magnitudes(&self) -> Vec<(String, f32)> {
            vec![("head.weight".into(), 0.0)]
        }
    }

    struct MockLearner {
        policy: CountingPolicy,
        computed: usize,
        applied: usize,
        applied_tx: Sender<usize>,
        last_batch_steps: usize,
    }

    impl<E> RolloutPolicy<E> for MockLearner
    where
        E: Env<Obs = u32, Act = usize>,
    {
        fn begin_episode(&mut self, slot: usize) {
            RolloutPolicy::<E>::begin_episode(&mut self.policy, slot);
        }

        fn select_actions(
            &mut self,
            slots: &[usize],
            obs: &[&u32],
        ) -> Result<Vec<Decision<usize>>> {
            RolloutPolicy::<E>::select_actions(&mut self.policy, slots, obs)
        }
    }

    impl<E> PolicyLearner<E> for MockLearner
    where
        E: Env<Obs = u32, Act = usize>,
    {
        type Update = NullUpdate;

        fn compute_update(&mut self, batch: &RolloutSet<u32>) -> Result<NullUpdate> {
            self.computed += 1;
            self.last_batch_steps = batch.num_steps();
            Ok(NullUpdate)
        }

        fn apply_update(&mut self, _update: NullUpdate) -> Result<()> {
            self.applied += 1;
            let _ = self.applied_tx.send(self.applied);
            Ok(())
        }

        fn save(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn applies_one_update_per_iteration_and_stops_at_boundary() {
        let (applied_tx, applied_rx) = unbounded();
        let agent = Arc::new(Mutex::new(MockLearner {
            policy: CountingPolicy::new(0),
            computed: 0,
            applied: 0,
            applied_tx,
            last_batch_steps: 0,
        }));
        let envs: Vec<FixedEpisodeEnv> = (0..2)
            .map(|_| FixedEpisodeEnv::build(&vec![1.0, 0.0]).unwrap())
            .collect();
        let config = TrainerConfig::default()
            .batch_steps(4)
            .steps_per_rollout(2)
            .log_param_norms(false);
        let (stop_tx, stop_rx) = bounded(1);

        let handle = {
            let agent = agent.clone();
            thread::spawn(move || Trainer::build(config).train(envs, agent, stop_rx))
        };

        // Wait for two full iterations, then stop at the boundary.
        assert_eq!(applied_rx.recv().unwrap(), 1);
        assert_eq!(applied_rx.recv().unwrap(), 2);
        stop_tx.send(()).unwrap();
        handle.join().unwrap().unwrap();

        let agent = agent.lock().unwrap();
        assert_eq!(agent.computed, agent.applied);
        assert!(agent.computed >= 2);
        // Each batch packs rollouts until the step target is met.
        assert!(agent.last_batch_steps >= 4);
    }

    #[test]
    fn disconnected_stop_channel_ends_the_loop() {
        let (applied_tx, _applied_rx) = unbounded();
        let agent = Arc::new(Mutex::new(MockLearner {
            policy: CountingPolicy::new(0),
            computed: 0,
            applied: 0,
            applied_tx,
            last_batch_steps: 0,
        }));
        let envs = vec![FixedEpisodeEnv::build(&vec![1.0]).unwrap()];
        let config = TrainerConfig::default().batch_steps(1).steps_per_rollout(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        drop(stop_tx);

        Trainer::build(config)
            .train(envs, agent.clone(), stop_rx)
            .unwrap();
        assert_eq!(agent.lock().unwrap().computed, 0);
    }
}
