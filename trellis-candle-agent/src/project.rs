//! Weight surgery applied to vision layers after fresh construction.
//!
//! Dispatch is by layer kind through a common capability; supporting a new
//! layer kind means adding an implementation, not extending a type switch.
use anyhow::Result;
use candle_core::Var;

/// Parameter surgery exposed uniformly by every vision layer kind.
pub trait WeightSurgery {
    /// Subtracts, for every output unit, the mean of its weights across the
    /// input extent, so a solid-color input produces zero response. This
    /// closes off a degenerate local optimum where the policy keys on frame
    /// brightness instead of content.
    fn project_out_input_mean(&self) -> Result<()>;

    /// Adds one to every bias element. Diagnostic only.
    fn boost_biases(&self) -> Result<()>;
}

/// Surgery over a convolution's `(filters, in_channels, kh, kw)` kernel.
pub struct ConvSurgery {
    weight: Var,
    bias: Var,
}

impl ConvSurgery {
    /// Wraps a convolution's parameters.
    pub fn new(weight: Var, bias: Var) -> Self {
        Self { weight, bias }
    }
}

impl WeightSurgery for ConvSurgery {
    fn project_out_input_mean(&self) -> Result<()> {
        // Zero the spatial mean separately for each (filter, input channel)
        // pair; a constant plane then contributes nothing to the filter.
        let w = self.weight.as_tensor();
        let mean = w.mean_keepdim(3)?.mean_keepdim(2)?;
        self.weight.set(&w.broadcast_sub(&mean)?)?;
        Ok(())
    }

    fn boost_biases(&self) -> Result<()> {
        let b = self.bias.as_tensor();
        self.bias.set(&b.affine(1.0, 1.0)?)?;
        Ok(())
    }
}

/// Surgery over a fully-connected layer's `(out, in)` weight matrix.
pub struct LinearSurgery {
    weight: Var,
    bias: Option<Var>,
}

impl LinearSurgery {
    /// Wraps a fully-connected layer's parameters.
    pub fn new(weight: Var, bias: Option<Var>) -> Self {
        Self { weight, bias }
    }
}

impl WeightSurgery for LinearSurgery {
    fn project_out_input_mean(&self) -> Result<()> {
        let w = self.weight.as_tensor();
        let mean = w.mean_keepdim(1)?;
        self.weight.set(&w.broadcast_sub(&mean)?)?;
        Ok(())
    }

    fn boost_biases(&self) -> Result<()> {
        if let Some(bias) = &self.bias {
            bias.set(&bias.as_tensor().affine(1.0, 1.0)?)?;
        }
        Ok(())
    }
}
