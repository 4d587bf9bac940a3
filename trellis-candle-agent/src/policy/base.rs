use super::PolicyNetConfig;
use crate::project::{ConvSurgery, LinearSurgery, WeightSurgery};
use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{
    conv2d, conv::Conv2dConfig, init::Init, linear, linear_no_bias, Conv2d, Linear, Module,
    VarBuilder, VarMap,
};
use std::collections::VecDeque;
use trellis_core::{PlanarObs, Trajectory};

// Planes per preprocessed observation: current frame and delta.
const OBS_PLANES: usize = 2;
const CONV1_FILTERS: usize = 16;
const CONV2_FILTERS: usize = 32;
const KERNEL: usize = 4;
const STRIDE: usize = 2;

fn conv_out(size: usize) -> usize {
    (size - KERNEL) / STRIDE + 1
}

/// Recurrent convolutional policy.
///
/// Stack: affine input scaling, frame stacker, two stride-2 convolutions
/// with tanh, a fully-connected layer with tanh, a vanilla recurrent cell,
/// and a zero-initialized linear head over the discrete action set.
/// Parameter shapes are fixed at construction; only values change.
pub struct PolicyNet {
    device: Device,
    varmap: VarMap,
    config: PolicyNetConfig,
    conv1: Conv2d,
    conv2: Conv2d,
    fc: Linear,
    rnn_x: Linear,
    rnn_h: Linear,
    head: Linear,
    slots: Vec<SlotState>,
}

/// Per-environment-slot recurrent state: the frame-stacker ring buffer and
/// the hidden activation. Never shared across slots.
struct SlotState {
    frames: VecDeque<Vec<f32>>,
    hidden: Tensor,
}

impl SlotState {
    fn fresh(rnn_dim: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            frames: VecDeque::new(),
            hidden: Tensor::zeros((1, rnn_dim), DType::F32, device)?,
        })
    }
}

impl PolicyNet {
    fn stride2() -> Conv2dConfig {
        Conv2dConfig {
            stride: STRIDE,
            ..Default::default()
        }
    }

    /// Builds the network without touching the freshly initialized weights.
    /// Used by checkpoint loading, which overwrites them wholesale.
    pub(crate) fn build_raw(config: PolicyNetConfig, device: Device) -> Result<Self> {
        let (h1, w1) = (conv_out(config.in_height), conv_out(config.in_width));
        if h1 < KERNEL || w1 < KERNEL {
            bail!(
                "input planes {}x{} too small for the convolutional trunk",
                config.in_height,
                config.in_width
            );
        }
        let (h2, w2) = (conv_out(h1), conv_out(w1));
        let flat = CONV2_FILTERS * h2 * w2;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let in_ch = OBS_PLANES * config.history;
        let conv1 = conv2d(in_ch, CONV1_FILTERS, KERNEL, Self::stride2(), vb.pp("c1"))?;
        let conv2 = conv2d(
            CONV1_FILTERS,
            CONV2_FILTERS,
            KERNEL,
            Self::stride2(),
            vb.pp("c2"),
        )?;
        let fc = linear(flat, config.fc_dim, vb.pp("fc"))?;
        let rnn_x = linear(config.fc_dim, config.rnn_dim, vb.pp("rnn.x"))?;
        let rnn_h = linear_no_bias(config.rnn_dim, config.rnn_dim, vb.pp("rnn.h"))?;
        // Zero head: the initial policy is uniform over actions.
        let head = {
            let vb = vb.pp("head");
            let weight =
                vb.get_with_hints((config.n_actions, config.rnn_dim), "weight", Init::Const(0.))?;
            let bias = vb.get_with_hints(config.n_actions, "bias", Init::Const(0.))?;
            Linear::new(weight, Some(bias))
        };

        Ok(Self {
            device,
            varmap,
            config,
            conv1,
            conv2,
            fc,
            rnn_x,
            rnn_h,
            head,
            slots: Vec::new(),
        })
    }

    /// Builds a fresh network and neutralizes its uniform-color response.
    pub fn build(config: PolicyNetConfig, device: Device) -> Result<Self> {
        let net = Self::build_raw(config, device)?;
        for layer in net.vision_layers()? {
            layer.project_out_input_mean()?;
            if net.config.boost_biases {
                layer.boost_biases()?;
            }
        }
        Ok(net)
    }

    /// The convolutional and fully-connected layers subject to weight
    /// surgery, by kind.
    pub fn vision_layers(&self) -> Result<Vec<Box<dyn WeightSurgery>>> {
        let get = |name: &str| -> Result<Var> {
            self.varmap
                .data()
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .with_context(|| format!("missing parameter {}", name))
        };
        Ok(vec![
            Box::new(ConvSurgery::new(get("c1.weight")?, get("c1.bias")?)),
            Box::new(ConvSurgery::new(get("c2.weight")?, get("c2.bias")?)),
            Box::new(LinearSurgery::new(
                get("fc.weight")?,
                Some(get("fc.bias")?),
            )),
            Box::new(LinearSurgery::new(
                get("head.weight")?,
                Some(get("head.bias")?),
            )),
        ])
    }

    /// Trainable parameters in stable name order.
    pub fn named_parameters(&self) -> Vec<(String, Var)> {
        let data = self.varmap.data().lock().unwrap();
        let mut params: Vec<(String, Var)> =
            data.iter().map(|(n, v)| (n.clone(), v.clone())).collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));
        params
    }

    /// Network configuration.
    pub fn config(&self) -> &PolicyNetConfig {
        &self.config
    }

    /// Device the parameters live on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub(crate) fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }

    /// Clears the recurrent state of one environment slot.
    pub fn begin_episode(&mut self, slot: usize) -> Result<()> {
        self.ensure_slot(slot)?;
        self.slots[slot].frames.clear();
        self.slots[slot].hidden =
            Tensor::zeros((1, self.config.rnn_dim), DType::F32, &self.device)?;
        Ok(())
    }

    fn ensure_slot(&mut self, slot: usize) -> Result<()> {
        while self.slots.len() <= slot {
            self.slots
                .push(SlotState::fresh(self.config.rnn_dim, &self.device)?);
        }
        Ok(())
    }

    fn plane_len(&self) -> usize {
        OBS_PLANES * self.config.in_height * self.config.in_width
    }

    fn planes_of<O: PlanarObs>(&self, obs: &O) -> Vec<f32> {
        debug_assert_eq!(obs.channels(), OBS_PLANES);
        debug_assert_eq!(obs.height(), self.config.in_height);
        debug_assert_eq!(obs.width(), self.config.in_width);
        let mut planes = Vec::with_capacity(self.plane_len());
        obs.write_planes(&mut planes);
        planes
    }

    // Appends `history` frame blocks, zero-padded at the old end.
    fn stack_into(&self, ring: &VecDeque<Vec<f32>>, out: &mut Vec<f32>) {
        let block = self.plane_len();
        for _ in ring.len()..self.config.history {
            out.extend(std::iter::repeat(0.0f32).take(block));
        }
        for frame in ring.iter() {
            out.extend_from_slice(frame);
        }
    }

    fn push_frame(ring: &mut VecDeque<Vec<f32>>, history: usize, planes: Vec<f32>) {
        ring.push_back(planes);
        while ring.len() > history {
            ring.pop_front();
        }
    }

    fn vision_forward(&self, x: &Tensor) -> Result<Tensor> {
        let xs = x.affine(self.config.input_scale, 0.)?;
        let xs = self.conv1.forward(&xs)?.tanh()?;
        let xs = self.conv2.forward(&xs)?.tanh()?;
        let xs = xs.flatten_from(1)?;
        let xs = self.fc.forward(&xs)?.tanh()?;
        Ok(xs)
    }

    fn rnn_step(&self, feats: &Tensor, hidden: &Tensor) -> Result<Tensor> {
        let h = (self.rnn_x.forward(feats)? + self.rnn_h.forward(hidden)?)?.tanh()?;
        Ok(h)
    }

    /// Advances the given slots by one observation each and returns the
    /// detached action logits, one row per slot.
    pub fn step<O: PlanarObs>(&mut self, slots: &[usize], obs: &[&O]) -> Result<Tensor> {
        debug_assert_eq!(slots.len(), obs.len());
        for &slot in slots {
            self.ensure_slot(slot)?;
        }
        let in_ch = OBS_PLANES * self.config.history;
        let mut inputs = Vec::with_capacity(slots.len() * in_ch * self.config.in_height * self.config.in_width);
        for (&slot, obs) in slots.iter().zip(obs) {
            let planes = self.planes_of(*obs);
            let history = self.config.history;
            Self::push_frame(&mut self.slots[slot].frames, history, planes);
            let ring = std::mem::take(&mut self.slots[slot].frames);
            self.stack_into(&ring, &mut inputs);
            self.slots[slot].frames = ring;
        }
        let x = Tensor::from_vec(
            inputs,
            (
                slots.len(),
                in_ch,
                self.config.in_height,
                self.config.in_width,
            ),
            &self.device,
        )?;
        let feats = self.vision_forward(&x)?;
        let hiddens: Vec<Tensor> = slots
            .iter()
            .map(|&slot| self.slots[slot].hidden.clone())
            .collect();
        let h_prev = Tensor::cat(&hiddens, 0)?;
        let h_new = self.rnn_step(&feats, &h_prev)?.detach();
        for (i, &slot) in slots.iter().enumerate() {
            self.slots[slot].hidden = h_new.narrow(0, i, 1)?;
        }
        let logits = self.head.forward(&h_new)?.detach();
        Ok(logits)
    }

    /// Replays a whole trajectory from a zero recurrent state, returning the
    /// per-step action logits attached to the autodiff graph.
    pub fn replay_trajectory<O: PlanarObs>(&self, traj: &Trajectory<O>) -> Result<Tensor> {
        let t_len = traj.len();
        if t_len == 0 {
            bail!("cannot replay an empty trajectory");
        }
        let in_ch = OBS_PLANES * self.config.history;
        let mut inputs =
            Vec::with_capacity(t_len * in_ch * self.config.in_height * self.config.in_width);
        let mut ring: VecDeque<Vec<f32>> = VecDeque::new();
        for obs in traj.observations() {
            let obs = obs?;
            let planes = self.planes_of(&obs);
            Self::push_frame(&mut ring, self.config.history, planes);
            self.stack_into(&ring, &mut inputs);
        }
        let x = Tensor::from_vec(
            inputs,
            (t_len, in_ch, self.config.in_height, self.config.in_width),
            &self.device,
        )?;
        let feats = self.vision_forward(&x)?;
        let rx = self.rnn_x.forward(&feats)?;
        let mut hidden = Tensor::zeros((1, self.config.rnn_dim), DType::F32, &self.device)?;
        let mut hs = Vec::with_capacity(t_len);
        for t in 0..t_len {
            let rxt = rx.narrow(0, t, 1)?;
            hidden = (rxt + self.rnn_h.forward(&hidden)?)?.tanh()?;
            hs.push(hidden.clone());
        }
        let hcat = Tensor::cat(&hs, 0)?;
        let logits = self.head.forward(&hcat)?;
        Ok(logits)
    }
}
