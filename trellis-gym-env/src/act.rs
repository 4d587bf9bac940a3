//! Discrete actions.
use trellis_core::Act;

/// Index into the environment's fixed discrete action set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscreteAct(pub usize);

impl Act for DiscreteAct {}

impl From<usize> for DiscreteAct {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

impl From<DiscreteAct> for usize {
    fn from(a: DiscreteAct) -> Self {
        a.0
    }
}
