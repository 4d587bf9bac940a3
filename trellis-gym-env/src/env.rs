//! Environment wrapper combining the wire client with preprocessing.
use crate::{DiscreteAct, FramePreprocessor, GymClient, GymClientConfig, PreprocObs};
use anyhow::Result;
use trellis_core::{Env, EnvStep};

/// A remote gym session whose frames are preprocessed into two-plane
/// observations. Owns its preprocessor; the retained delta plane never
/// leaks across slots or episodes.
pub struct PreprocessedGymEnv {
    client: GymClient,
    preproc: FramePreprocessor,
}

impl PreprocessedGymEnv {
    /// Size of the discrete action set reported by the server.
    pub fn n_actions(&self) -> usize {
        self.client.n_actions()
    }

    /// Height of the preprocessed observation planes.
    pub fn obs_height(&self) -> usize {
        self.preproc.out_height()
    }

    /// Width of the preprocessed observation planes.
    pub fn obs_width(&self) -> usize {
        self.preproc.out_width()
    }
}

impl Env for PreprocessedGymEnv {
    type Config = GymClientConfig;
    type Obs = PreprocObs;
    type Act = DiscreteAct;

    fn build(config: &Self::Config) -> Result<Self> {
        let client = GymClient::connect(config)?;
        let preproc = FramePreprocessor::new(client.frame_height(), client.frame_width());
        Ok(Self { client, preproc })
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        let frame = self.client.reset()?;
        self.preproc.reset();
        Ok(self.preproc.process(&frame))
    }

    fn step(&mut self, act: &Self::Act) -> Result<EnvStep<Self::Obs>> {
        let (frame, reward, done) = self.client.step(act.0)?;
        if done {
            // The server already reset; the frame is the next episode's
            // first observation and must not get a cross-episode delta.
            self.preproc.reset();
        }
        Ok(EnvStep {
            obs: self.preproc.process(&frame),
            reward,
            done,
        })
    }
}
