//! Transformer encoder blocks shared by the word and sentence levels.
//!
//! Pre-norm residual wiring:
//!
//! ```text
//! x = x + attn(norm1(x))
//! x = x + ffn(norm2(x))
//! ```
//!
//! The FFN is the standard 2-projection kind: `c_proj( silu( c_fc(x) ) )`.

use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

use hanet_common::HaNetConfig;

use crate::attention::SelfAttention;
use crate::norm::NormLayer;

// ── FeedForward ─────────────────────────────────────────────────────────────

/// 2-projection FFN with SiLU activation.
pub struct FeedForward {
    c_fc: Linear,
    c_proj: Linear,
}

impl FeedForward {
    pub fn new(config: &HaNetConfig, vb: VarBuilder) -> Result<Self> {
        let c_fc = linear(config.hidden_dim, config.intermediate_size, vb.pp("c_fc"))?;
        let c_proj = linear(config.intermediate_size, config.hidden_dim, vb.pp("c_proj"))?;
        Ok(Self { c_fc, c_proj })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = candle_nn::ops::silu(&self.c_fc.forward(x)?)?;
        self.c_proj.forward(&h)
    }
}

// ── EncoderBlock ────────────────────────────────────────────────────────────

/// Single encoder block: pre-norm → attention → residual → pre-norm → FFN → residual.
pub struct EncoderBlock {
    ln1: NormLayer,
    attn: SelfAttention,
    ln2: NormLayer,
    ffn: FeedForward,
}

impl EncoderBlock {
    pub fn new(config: &HaNetConfig, vb: VarBuilder) -> Result<Self> {
        let ln1 = NormLayer::new(config, vb.pp("ln1"))?;
        let attn = SelfAttention::new(config, vb.pp("attn"))?;
        let ln2 = NormLayer::new(config, vb.pp("ln2"))?;
        let ffn = FeedForward::new(config, vb.pp("mlp"))?;
        Ok(Self {
            ln1,
            attn,
            ln2,
            ffn,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let residual = x;
        let attn_out = self.attn.forward(&self.ln1.forward(x)?)?;
        let x = (residual + attn_out)?;

        let residual = &x;
        let ff_out = self.ffn.forward(&self.ln2.forward(&x)?)?;
        residual + ff_out
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn block_preserves_shape() {
        let dev = Device::Cpu;
        let config = HaNetConfig {
            embed_dim: 8,
            hidden_dim: 16,
            num_heads: 2,
            intermediate_size: 32,
            word_layers: 1,
            sent_layers: 1,
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let block = EncoderBlock::new(&config, vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (1, 6, 16), &dev).unwrap();
        let y = block.forward(&x).unwrap();
        assert_eq!(y.dims(), &[1, 6, 16]);
    }
}
