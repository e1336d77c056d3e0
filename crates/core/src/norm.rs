//! Normalisation layers for the encoder blocks.
//!
//! RMSNorm is the default; LayerNorm stays available for parity with older
//! checkpoints trained before the switch.

use candle_core::{Result, Tensor};
use candle_nn::{layer_norm_no_bias, rms_norm, LayerNorm, Module, RmsNorm, VarBuilder};

use hanet_common::HaNetConfig;

/// Normalisation layer: RMSNorm (when `use_rmsnorm = true`) or LayerNorm.
pub enum NormLayer {
    LayerNorm(LayerNorm),
    RmsNorm(RmsNorm),
}

impl NormLayer {
    /// Construct from config. `vb` should be scoped to the layer prefix
    /// (e.g. `vb.pp("ln1")`).
    pub fn new(config: &HaNetConfig, vb: VarBuilder) -> Result<Self> {
        if config.use_rmsnorm {
            Ok(Self::RmsNorm(rms_norm(
                config.hidden_dim,
                config.norm_eps,
                vb,
            )?))
        } else {
            Ok(Self::LayerNorm(layer_norm_no_bias(
                config.hidden_dim,
                config.norm_eps,
                vb,
            )?))
        }
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::LayerNorm(l) => l.forward(x),
            Self::RmsNorm(r) => r.forward(x),
        }
    }
}
