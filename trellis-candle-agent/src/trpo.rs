//! Trust-region natural-policy-gradient optimization.
//!
//! One update: judge the batch into advantages, accumulate the vanilla
//! policy gradient, turn it into a natural direction with conjugate
//! gradients over subsampled Fisher-vector products, and scale the step so
//! its predicted KL divergence stays inside the trust region.
mod config;

use crate::cg::conjugate_gradient;
use crate::judge::QJudger;
use crate::policy::PolicyNet;
use crate::util;
use anyhow::{bail, Context, Result};
use candle_core::{Device, Tensor, Var};
use candle_nn::ops::log_softmax;
use rand::rngs::SmallRng;
use std::collections::HashMap;
use trellis_core::{PlanarObs, RolloutSet, Trajectory, UpdateDiagnostics};

pub use config::TrpoConfig;

/// Per-parameter update produced by one optimization step.
///
/// Produced once per training iteration, applied exactly once, then
/// discarded. Applying is the caller's responsibility so the application can
/// happen under the training lock.
pub struct ParamUpdate {
    deltas: Vec<(String, Tensor)>,
    magnitudes: Vec<(String, f32)>,
    predicted_kl: f64,
}

impl ParamUpdate {
    fn new(deltas: Vec<(String, Tensor)>, predicted_kl: f64) -> Result<Self> {
        let mut magnitudes = Vec::with_capacity(deltas.len());
        for (name, t) in &deltas {
            let mag = t.sqr()?.sum_all()?.to_scalar::<f32>()?.sqrt();
            magnitudes.push((name.clone(), mag));
        }
        Ok(Self {
            deltas,
            magnitudes,
            predicted_kl,
        })
    }

    /// KL divergence this step is predicted to move the policy by.
    pub fn predicted_kl(&self) -> f64 {
        self.predicted_kl
    }

    /// Adds every delta to its parameter, consuming the update.
    pub fn apply(self, policy: &PolicyNet) -> Result<()> {
        let params: HashMap<String, Var> = policy.named_parameters().into_iter().collect();
        for (name, delta) in self.deltas {
            let var = params
                .get(&name)
                .with_context(|| format!("update names unknown parameter {}", name))?;
            var.set(&(var.as_tensor() + &delta)?)?;
        }
        Ok(())
    }
}

impl UpdateDiagnostics for ParamUpdate {
    fn magnitudes(&self) -> Vec<(String, f32)> {
        self.magnitudes.clone()
    }
}

/// Trust-region optimizer over a [`PolicyNet`].
pub struct Trpo {
    config: TrpoConfig,
}

impl Trpo {
    /// Creates an optimizer.
    pub fn new(config: TrpoConfig) -> Self {
        Self { config }
    }

    /// The optimizer configuration.
    pub fn config(&self) -> &TrpoConfig {
        &self.config
    }

    /// Computes one trust-region update from a packed batch. Parameter
    /// values are left untouched; Fisher-vector products shift them
    /// temporarily but always restore the snapshot.
    pub fn compute_update<O: PlanarObs>(
        &self,
        policy: &PolicyNet,
        batch: &RolloutSet<O>,
        rng: &mut SmallRng,
    ) -> Result<ParamUpdate> {
        if batch.num_steps() == 0 {
            bail!("cannot optimize over an empty batch");
        }
        let params = policy.named_parameters();
        let dim = util::total_len(&params);
        let device = policy.device().clone();
        let advantages = QJudger::new(self.config.discount).advantages(batch);

        // Vanilla policy gradient, one trajectory's graph at a time.
        let mut g = vec![0.0f32; dim];
        for (traj, adv) in batch.trajectories().iter().zip(&advantages) {
            if traj.is_empty() {
                continue;
            }
            let logits = policy.replay_trajectory(traj)?;
            let logp = log_softmax(&logits, 1)?;
            let taken = gather_taken(&logp, traj.actions(), &device)?;
            let weights = Tensor::from_slice(adv, adv.len(), &device)?;
            let objective = (taken * weights)?.sum_all()?;
            let grads = objective.backward()?;
            util::accumulate_grads(&params, &grads, &mut g)?;
        }
        let inv_steps = 1.0 / batch.num_steps() as f64;
        for gi in g.iter_mut() {
            *gi = (*gi as f64 * inv_steps) as f32;
        }

        // Curvature on a subsample of trajectories.
        let nonempty: Vec<&Trajectory<O>> = batch
            .trajectories()
            .iter()
            .filter(|t| !t.is_empty())
            .collect();
        let k = ((nonempty.len() as f64 * self.config.subsample_frac).ceil() as usize)
            .clamp(1, nonempty.len());
        let chosen = rand::seq::index::sample(rng, nonempty.len(), k).into_vec();
        let sub: Vec<&Trajectory<O>> = chosen.into_iter().map(|i| nonempty[i]).collect();
        let sub_steps: usize = sub.iter().map(|t| t.len()).sum();

        // Pre-step distributions on the subsample, fixed for every product.
        let mut old = Vec::with_capacity(sub.len());
        for traj in &sub {
            let logits = policy.replay_trajectory(*traj)?.detach();
            let logp = log_softmax(&logits, 1)?;
            let probs = logp.exp()?;
            old.push((probs, logp));
        }

        let x = conjugate_gradient(
            |v| self.fisher_vector_product(policy, &params, &sub, &old, sub_steps, v),
            &g,
            self.config.cg_iters,
            1e-10,
        )?;

        // Scale so the predicted divergence stays inside the radius; a step
        // already inside is left alone.
        let fx = self.fisher_vector_product(policy, &params, &sub, &old, sub_steps, &x)?;
        let predicted_kl = 0.5 * util::dot(&x, &fx);
        let scale = if predicted_kl > self.config.max_kl {
            (self.config.max_kl / predicted_kl).sqrt()
        } else {
            1.0
        };

        let deltas = util::chunk_like(&params, &x, scale, &device)?;
        ParamUpdate::new(deltas, predicted_kl * scale * scale)
    }

    /// Damped Fisher-vector product on the subsample.
    ///
    /// The product is the finite-difference gradient of `KL(old || new)` at
    /// parameters shifted by `epsilon` along `v`'s direction: the KL gradient
    /// vanishes at the pre-step parameters, so the shifted gradient is the
    /// curvature applied to the shift. Parameters are restored afterwards.
    fn fisher_vector_product<O: PlanarObs>(
        &self,
        policy: &PolicyNet,
        params: &[(String, Var)],
        sub: &[&Trajectory<O>],
        old: &[(Tensor, Tensor)],
        sub_steps: usize,
        v: &[f32],
    ) -> Result<Vec<f32>> {
        let norm = util::l2(v);
        if norm == 0.0 {
            return Ok(vec![0.0; v.len()]);
        }
        let unit: Vec<f32> = v.iter().map(|x| (*x as f64 / norm) as f32).collect();
        let eps = self.config.fvp_epsilon;
        let damping = self.config.cg_damping;
        let device = policy.device().clone();

        let snap = util::snapshot(params)?;
        util::shift_params(params, &unit, eps, &device)?;
        let mut acc = vec![0.0f32; v.len()];
        let replay = (|| -> Result<()> {
            for (traj, (old_probs, old_logp)) in sub.iter().zip(old) {
                let logits = policy.replay_trajectory(*traj)?;
                let logp = log_softmax(&logits, 1)?;
                let kl = ((old_probs * &(old_logp - &logp)?)?.sum_all()? / sub_steps as f64)?;
                let grads = kl.backward()?;
                util::accumulate_grads(params, &grads, &mut acc)?;
            }
            Ok(())
        })();
        util::restore(params, &snap)?;
        replay?;

        Ok(acc
            .iter()
            .zip(v)
            .map(|(a, vi)| (*a as f64 / eps * norm + damping * *vi as f64) as f32)
            .collect())
    }
}

fn gather_taken(logp: &Tensor, actions: &[usize], device: &Device) -> Result<Tensor> {
    let idx: Vec<u32> = actions.iter().map(|&a| a as u32).collect();
    let len = idx.len();
    let idx = Tensor::from_vec(idx, (len, 1), device)?;
    Ok(logp.gather(&idx, 1)?.squeeze(1)?)
}
