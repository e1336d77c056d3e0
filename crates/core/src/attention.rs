//! Bidirectional self-attention and learned-context attention pooling.
//!
//! * **[`SelfAttention`]** — multi-head attention over a full sequence, every
//!   position attending to every other (classification, so no causal mask).
//!   RoPE carries position information (optional).
//! * **[`AttentionPool`]** — collapses a sequence to one vector with a
//!   learned context: `softmax(tanh(Wx) · c)` weights over positions.

use candle_core::{DType, IndexOp, Result, Tensor, D};
use candle_nn::{linear, Init, Linear, Module, VarBuilder};

use hanet_common::HaNetConfig;

/// Small init for the pooling context vector.
const CONTEXT_INIT: Init = Init::Randn {
    mean: 0.,
    stdev: 0.02,
};

/// Build RoPE cosine and sine tables: shape (seq_len, head_dim / 2).
///
/// Standard RoPE: θ_i = 10000^{-2i/d}.
fn rope_cos_sin(
    device: &candle_core::Device,
    seq_len: usize,
    head_dim: usize,
) -> Result<(Tensor, Tensor)> {
    let d2 = head_dim / 2;
    let inv_freq: Vec<f32> = (0..d2)
        .map(|i| 1.0 / 10000f32.powf(2.0 * i as f32 / head_dim as f32))
        .collect();
    let inv_freq = Tensor::from_vec(inv_freq, (1, d2), device)?;
    let positions = Tensor::arange(0u32, seq_len as u32, device)?
        .to_dtype(DType::F32)?
        .reshape((seq_len, 1))?;
    let freqs = positions.broadcast_mul(&inv_freq)?;
    let cos = freqs.cos()?;
    let sin = freqs.sin()?;
    Ok((cos, sin))
}

// ── SelfAttention ───────────────────────────────────────────────────────────

/// Multi-head bidirectional self-attention.
pub struct SelfAttention {
    c_attn: Linear,
    c_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
    use_rope: bool,
}

impl SelfAttention {
    pub fn new(config: &HaNetConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_dim;
        let num_heads = config.num_heads;
        let head_dim = config.head_dim();

        // Fused Q/K/V projection (3 × hidden)
        let c_attn = linear(hidden, 3 * hidden, vb.pp("c_attn"))?;
        let c_proj = linear(hidden, hidden, vb.pp("c_proj"))?;

        let scale = 1.0 / (head_dim as f64).sqrt();

        Ok(Self {
            c_attn,
            c_proj,
            num_heads,
            head_dim,
            scale,
            use_rope: config.use_rope,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, t, c) = x.dims3()?;

        let qkv = self.c_attn.forward(x)?;
        let qkv = qkv.reshape((b, t, 3, self.num_heads, self.head_dim))?;
        let qkv = qkv.permute((0, 3, 1, 4, 2))?; // (b, heads, t, head_dim, 3)

        let mut q = qkv.i((.., .., .., .., 0))?.contiguous()?;
        let mut k = qkv.i((.., .., .., .., 1))?.contiguous()?;
        let v = qkv.i((.., .., .., .., 2))?.contiguous()?;

        if self.use_rope {
            let (cos, sin) = rope_cos_sin(x.device(), t, self.head_dim)?;
            q = candle_nn::rotary_emb::rope_i(&q, &cos, &sin)?;
            k = candle_nn::rotary_emb::rope_i(&k, &cos, &sin)?;
        }

        // Scaled dot-product attention, no mask: every position sees all others
        let scores = (q.matmul(&k.t()?)? * self.scale)?;
        let att = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let y = att.contiguous()?.matmul(&v)?;
        let y = y.transpose(1, 2)?; // (b, t, heads, head_dim)
        let y = y.reshape((b, t, c))?;

        self.c_proj.forward(&y)
    }
}

// ── AttentionPool ───────────────────────────────────────────────────────────

/// Learned-context attention pooling: `(b, t, h)` → `(b, h)`.
///
/// `u = tanh(W x)`, weights = softmax over positions of `u · context`,
/// output = weighted sum of the input positions.
pub struct AttentionPool {
    proj: Linear,
    context: Tensor,
}

impl AttentionPool {
    pub fn new(config: &HaNetConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_dim;
        let proj = linear(hidden, hidden, vb.pp("proj"))?;
        let context = vb.get_with_hints((hidden,), "context", CONTEXT_INIT)?;
        Ok(Self { proj, context })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (_b, _t, h) = x.dims3()?;
        let u = self.proj.forward(x)?.tanh()?;
        let ctx = self.context.reshape((1, 1, h))?;
        let scores = u.broadcast_mul(&ctx)?.sum(D::Minus1)?; // (b, t)
        let att = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let weights = att.unsqueeze(D::Minus1)?; // (b, t, 1)
        x.broadcast_mul(&weights)?.sum(1)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    fn small_config() -> HaNetConfig {
        HaNetConfig {
            embed_dim: 8,
            hidden_dim: 16,
            num_heads: 2,
            intermediate_size: 32,
            word_layers: 1,
            sent_layers: 1,
            ..Default::default()
        }
    }

    #[test]
    fn attention_preserves_shape() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let attn = SelfAttention::new(&small_config(), vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (1, 5, 16), &dev).unwrap();
        let y = attn.forward(&x).unwrap();
        assert_eq!(y.dims(), &[1, 5, 16]);
    }

    #[test]
    fn attention_handles_single_position() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let attn = SelfAttention::new(&small_config(), vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (1, 1, 16), &dev).unwrap();
        let y = attn.forward(&x).unwrap();
        assert_eq!(y.dims(), &[1, 1, 16]);
    }

    #[test]
    fn pool_weights_sum_to_input_average_for_uniform_scores() {
        // With a zeroed context every position gets equal weight, so pooling
        // must equal the plain mean over positions.
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let mut pool = AttentionPool::new(&small_config(), vb).unwrap();
        pool.context = Tensor::zeros(16, DType::F32, &dev).unwrap();

        let x = Tensor::randn(0f32, 1f32, (1, 4, 16), &dev).unwrap();
        let pooled = pool.forward(&x).unwrap();
        let mean = x.mean(1).unwrap();

        let diff = (pooled - mean)
            .unwrap()
            .abs()
            .unwrap()
            .max(D::Minus1)
            .unwrap()
            .squeeze(0)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(diff < 1e-5, "uniform pooling should be a mean, diff {diff}");
    }

    #[test]
    fn pool_output_shape() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let pool = AttentionPool::new(&small_config(), vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (1, 7, 16), &dev).unwrap();
        let pooled = pool.forward(&x).unwrap();
        assert_eq!(pooled.dims(), &[1, 16]);
    }
}
