//! Agent facade tying the policy network and the optimizer together.
use crate::checkpoint;
use crate::policy::{PolicyNet, PolicyNetConfig};
use crate::trpo::{ParamUpdate, Trpo, TrpoConfig};
use anyhow::Result;
use candle_core::Device;
use candle_nn::ops::softmax;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::{
    fs::File,
    io::{BufReader, Write},
};
use trellis_core::{Decision, Env, PlanarObs, PolicyLearner, RolloutPolicy, RolloutSet};

/// Configuration of [`TrpoAgent`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrpoAgentConfig {
    /// Policy network configuration.
    pub policy: PolicyNetConfig,

    /// Optimizer configuration.
    pub trpo: TrpoConfig,

    /// Seed of the action-sampling and subsampling RNG.
    pub seed: u64,
}

impl Default for TrpoAgentConfig {
    fn default() -> Self {
        Self {
            policy: PolicyNetConfig::default(),
            trpo: TrpoConfig::default(),
            seed: 42,
        }
    }
}

impl TrpoAgentConfig {
    /// Sets the policy network configuration.
    pub fn policy(mut self, v: PolicyNetConfig) -> Self {
        self.policy = v;
        self
    }

    /// Sets the optimizer configuration.
    pub fn trpo(mut self, v: TrpoConfig) -> Self {
        self.trpo = v;
        self
    }

    /// Sets the RNG seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`TrpoAgentConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrpoAgentConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// On-policy agent: samples rollout actions from the recurrent policy and
/// learns with trust-region natural-gradient updates.
pub struct TrpoAgent {
    policy: PolicyNet,
    trpo: Trpo,
    rng: SmallRng,
}

impl TrpoAgent {
    /// Builds an agent with a freshly constructed policy.
    pub fn build(config: TrpoAgentConfig, device: Device) -> Result<Self> {
        let policy = PolicyNet::build(config.policy, device)?;
        Ok(Self {
            policy,
            trpo: Trpo::new(config.trpo),
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// Builds an agent, restoring the policy from a checkpoint when one is
    /// usable and constructing it fresh otherwise.
    pub fn load_or_build(
        dir: impl AsRef<Path>,
        config: TrpoAgentConfig,
        device: Device,
    ) -> Result<Self> {
        let policy = checkpoint::load_or_build(dir, config.policy, device)?;
        Ok(Self {
            policy,
            trpo: Trpo::new(config.trpo),
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// The policy network.
    pub fn policy(&self) -> &PolicyNet {
        &self.policy
    }
}

impl<E> RolloutPolicy<E> for TrpoAgent
where
    E: Env,
    E::Obs: PlanarObs,
    E::Act: From<usize>,
{
    fn begin_episode(&mut self, slot: usize) {
        self.policy
            .begin_episode(slot)
            .expect("failed to reset recurrent state");
    }

    fn select_actions(
        &mut self,
        slots: &[usize],
        obs: &[&E::Obs],
    ) -> Result<Vec<Decision<E::Act>>> {
        let logits = self.policy.step(slots, obs)?;
        let probs: Vec<Vec<f32>> = softmax(&logits, 1)?.to_vec2()?;
        let mut decisions = Vec::with_capacity(probs.len());
        for row in probs {
            let dist = WeightedIndex::new(&row)?;
            let index = dist.sample(&mut self.rng);
            decisions.push(Decision {
                act: E::Act::from(index),
                index,
                log_prob: row[index].ln(),
            });
        }
        Ok(decisions)
    }
}

impl<E> PolicyLearner<E> for TrpoAgent
where
    E: Env,
    E::Obs: PlanarObs,
    E::Act: From<usize>,
{
    type Update = ParamUpdate;

    fn compute_update(&mut self, batch: &RolloutSet<E::Obs>) -> Result<ParamUpdate> {
        self.trpo.compute_update(&self.policy, batch, &mut self.rng)
    }

    fn apply_update(&mut self, update: ParamUpdate) -> Result<()> {
        update.apply(&self.policy)
    }

    fn save(&self, path: &Path) -> Result<()> {
        checkpoint::save(&self.policy, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing::{small_config, TestObs};
    use anyhow::bail;
    use trellis_core::{Act, EnvStep};

    #[derive(Clone)]
    struct TestAct(usize);

    impl Act for TestAct {}

    impl From<usize> for TestAct {
        fn from(v: usize) -> Self {
            Self(v)
        }
    }

    struct NullEnv;

    impl Env for NullEnv {
        type Config = ();
        type Obs = TestObs;
        type Act = TestAct;

        fn build(_config: &()) -> Result<Self> {
            bail!("not constructible in tests")
        }

        fn reset(&mut self) -> Result<TestObs> {
            unreachable!()
        }

        fn step(&mut self, _act: &TestAct) -> Result<EnvStep<TestObs>> {
            unreachable!()
        }
    }

    fn small_agent() -> TrpoAgent {
        let config = TrpoAgentConfig::default().policy(small_config());
        TrpoAgent::build(config, Device::Cpu).unwrap()
    }

    #[test]
    fn samples_uniformly_from_a_fresh_policy() {
        let mut agent = small_agent();
        let config = agent.policy().config().clone();
        RolloutPolicy::<NullEnv>::begin_episode(&mut agent, 0);
        RolloutPolicy::<NullEnv>::begin_episode(&mut agent, 1);

        let a = TestObs::patterned(1, &config);
        let b = TestObs::patterned(2, &config);
        let decisions =
            RolloutPolicy::<NullEnv>::select_actions(&mut agent, &[0, 1], &[&a, &b]).unwrap();

        assert_eq!(decisions.len(), 2);
        let n = config.n_actions;
        for d in &decisions {
            assert!(d.index < n);
            assert_eq!(d.act.0, d.index);
            // Zero head: every action is equally likely.
            assert!((d.log_prob - (1.0 / n as f32).ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn config_roundtrips_through_yaml() {
        let dir = tempdir::TempDir::new("trellis-agent").unwrap();
        let path = dir.path().join("agent.yaml");
        let config = TrpoAgentConfig::default()
            .policy(small_config())
            .seed(7);
        config.save(&path).unwrap();
        assert_eq!(TrpoAgentConfig::load(&path).unwrap(), config);
    }
}
