//! Base traits.
mod env;
mod obs;
mod policy;

pub use env::{Env, EnvStep};
pub use obs::{Act, Obs, PlanarObs};
pub use policy::{Decision, RolloutPolicy};
