//! Environment collaborator: a TCP client for a remote gym stepper plus the
//! delta-encoding frame preprocessor that turns raw frames into the compact
//! two-plane observations the policy consumes.
mod act;
mod client;
mod config;
mod env;
mod obs;
mod preprocess;

pub use act::DiscreteAct;
pub use client::GymClient;
pub use config::GymClientConfig;
pub use env::PreprocessedGymEnv;
pub use obs::RawFrame;
pub use preprocess::{FramePreprocessor, PreprocObs};
