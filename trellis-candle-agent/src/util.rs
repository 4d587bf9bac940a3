//! Flat-vector bookkeeping over named parameters.
//!
//! The conjugate-gradient solver works on one flattened coefficient vector;
//! these helpers move between that representation and the named `Var`s, in
//! the stable parameter order produced by
//! [`PolicyNet::named_parameters`](crate::PolicyNet::named_parameters).
use anyhow::Result;
use candle_core::{backprop::GradStore, Device, Tensor, Var};

/// Total number of scalar coefficients across all parameters.
pub(crate) fn total_len(params: &[(String, Var)]) -> usize {
    params.iter().map(|(_, v)| v.as_tensor().elem_count()).sum()
}

/// Adds the gradients found in `grads` into the flat accumulator.
/// Parameters without a gradient contribute nothing.
pub(crate) fn accumulate_grads(
    params: &[(String, Var)],
    grads: &GradStore,
    acc: &mut [f32],
) -> Result<()> {
    let mut offset = 0;
    for (_, var) in params {
        let n = var.as_tensor().elem_count();
        if let Some(grad) = grads.get(var.as_tensor()) {
            let flat = grad.flatten_all()?.to_vec1::<f32>()?;
            for (a, g) in acc[offset..offset + n].iter_mut().zip(&flat) {
                *a += g;
            }
        }
        offset += n;
    }
    Ok(())
}

/// Splits a flat coefficient vector into per-parameter tensors, scaled.
pub(crate) fn chunk_like(
    params: &[(String, Var)],
    v: &[f32],
    scale: f64,
    device: &Device,
) -> Result<Vec<(String, Tensor)>> {
    let mut offset = 0;
    let mut out = Vec::with_capacity(params.len());
    for (name, var) in params {
        let t = var.as_tensor();
        let n = t.elem_count();
        let chunk: Vec<f32> = v[offset..offset + n]
            .iter()
            .map(|x| (*x as f64 * scale) as f32)
            .collect();
        out.push((name.clone(), Tensor::from_vec(chunk, t.dims(), device)?));
        offset += n;
    }
    Ok(out)
}

/// Adds `scale * v` to the parameter values in place.
pub(crate) fn shift_params(
    params: &[(String, Var)],
    v: &[f32],
    scale: f64,
    device: &Device,
) -> Result<()> {
    let mut offset = 0;
    for (_, var) in params {
        let t = var.as_tensor();
        let n = t.elem_count();
        let chunk: Vec<f32> = v[offset..offset + n]
            .iter()
            .map(|x| (*x as f64 * scale) as f32)
            .collect();
        let delta = Tensor::from_vec(chunk, t.dims(), device)?;
        var.set(&(t + &delta)?)?;
        offset += n;
    }
    Ok(())
}

/// Copies the current parameter values out.
pub(crate) fn snapshot(params: &[(String, Var)]) -> Result<Vec<Tensor>> {
    let mut out = Vec::with_capacity(params.len());
    for (_, var) in params {
        out.push(var.as_tensor().copy()?);
    }
    Ok(out)
}

/// Writes previously snapshotted values back.
pub(crate) fn restore(params: &[(String, Var)], snap: &[Tensor]) -> Result<()> {
    for ((_, var), t) in params.iter().zip(snap) {
        var.set(t)?;
    }
    Ok(())
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum()
}

pub(crate) fn l2(v: &[f32]) -> f64 {
    dot(v, v).sqrt()
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::PolicyNetConfig;
    use serde::{Deserialize, Serialize};
    use trellis_core::{Obs, PlanarObs};

    /// Two-plane observation with directly specified values.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct TestObs {
        pub planes: Vec<f32>,
        pub height: usize,
        pub width: usize,
    }

    impl Obs for TestObs {}

    impl PlanarObs for TestObs {
        fn channels(&self) -> usize {
            2
        }

        fn height(&self) -> usize {
            self.height
        }

        fn width(&self) -> usize {
            self.width
        }

        fn write_planes(&self, out: &mut Vec<f32>) {
            out.extend_from_slice(&self.planes);
        }
    }

    impl TestObs {
        pub fn constant(value: f32, config: &PolicyNetConfig) -> Self {
            Self {
                planes: vec![value; 2 * config.in_height * config.in_width],
                height: config.in_height,
                width: config.in_width,
            }
        }

        /// Deterministic pseudo-random planes derived from `seed`.
        pub fn patterned(seed: u64, config: &PolicyNetConfig) -> Self {
            let n = 2 * config.in_height * config.in_width;
            let mut state = seed.wrapping_mul(2).wrapping_add(1);
            let planes = (0..n)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    ((state >> 33) as u32 as f32) / (u32::MAX as f32) - 0.5
                })
                .collect();
            Self {
                planes,
                height: config.in_height,
                width: config.in_width,
            }
        }
    }

    /// A network small enough for unit tests.
    pub fn small_config() -> PolicyNetConfig {
        PolicyNetConfig::default()
            .in_shape(10, 10)
            .n_actions(4)
            .fc_dim(8)
            .rnn_dim(8)
    }
}
