//! Hierarchical attention network for binary sentiment classification.
//!
//! Two encoder levels: words within a sentence, then sentences within a
//! document, each followed by learned-context attention pooling. A linear
//! head turns the document vector into a single raw logit; callers apply
//! `sigmoid` for the prediction score.

use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

use hanet_common::HaNetConfig;

use crate::attention::AttentionPool;
use crate::encoder::EncoderBlock;

/// Hierarchical attention classifier.
///
/// Layer naming under the `VarBuilder` prefix: `input_proj`, `word.{i}`,
/// `word_pool`, `sent.{i}`, `sent_pool`, `head`. Checkpoints depend on these
/// names; change them and old `.safetensors` files stop loading.
pub struct HaNet {
    input_proj: Linear,
    word_blocks: Vec<EncoderBlock>,
    word_pool: AttentionPool,
    sent_blocks: Vec<EncoderBlock>,
    sent_pool: AttentionPool,
    head: Linear,
    config: HaNetConfig,
}

impl HaNet {
    pub fn new(vb: VarBuilder, config: &HaNetConfig) -> Result<Self> {
        let input_proj = linear(config.embed_dim, config.hidden_dim, vb.pp("input_proj"))?;

        let mut word_blocks = Vec::with_capacity(config.word_layers);
        for i in 0..config.word_layers {
            word_blocks.push(EncoderBlock::new(config, vb.pp(format!("word.{i}")))?);
        }
        let word_pool = AttentionPool::new(config, vb.pp("word_pool"))?;

        let mut sent_blocks = Vec::with_capacity(config.sent_layers);
        for i in 0..config.sent_layers {
            sent_blocks.push(EncoderBlock::new(config, vb.pp(format!("sent.{i}")))?);
        }
        let sent_pool = AttentionPool::new(config, vb.pp("sent_pool"))?;

        let head = linear(config.hidden_dim, 1, vb.pp("head"))?;

        Ok(Self {
            input_proj,
            word_blocks,
            word_pool,
            sent_blocks,
            sent_pool,
            head,
            config: config.clone(),
        })
    }

    /// Encode one sentence `(n_words, embed_dim)` into a `(1, hidden)` vector.
    fn encode_sentence(&self, sentence: &Tensor) -> Result<Tensor> {
        let x = sentence.unsqueeze(0)?; // (1, n_words, embed_dim)
        let mut x = self.input_proj.forward(&x)?;
        for block in &self.word_blocks {
            x = block.forward(&x)?;
        }
        self.word_pool.forward(&x)
    }

    /// Forward over one document's sentences; returns a `(1)` logit tensor.
    ///
    /// Zero-sentence documents have no defined representation; callers skip
    /// them before reaching here.
    pub fn forward(&self, sentences: &[Tensor]) -> Result<Tensor> {
        if sentences.is_empty() {
            candle_core::bail!("cannot encode a document with no sentences");
        }

        let encoded = sentences
            .iter()
            .map(|s| self.encode_sentence(s))
            .collect::<Result<Vec<_>>>()?;
        let mut x = Tensor::stack(&encoded, 1)?; // (1, n_sentences, hidden)

        for block in &self.sent_blocks {
            x = block.forward(&x)?;
        }
        let doc = self.sent_pool.forward(&x)?; // (1, hidden)

        let logit = self.head.forward(&doc)?; // (1, 1)
        logit.squeeze(1)
    }

    /// Sigmoid prediction score in (0, 1); positive iff >= 0.5.
    pub fn score(&self, sentences: &[Tensor]) -> Result<f32> {
        let logit = self.forward(sentences)?;
        let score = candle_nn::ops::sigmoid(&logit)?;
        score.squeeze(0)?.to_scalar::<f32>()
    }

    pub fn config(&self) -> &HaNetConfig {
        &self.config
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
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

    fn build(dev: &Device) -> HaNet {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, dev);
        HaNet::new(vb, &small_config()).unwrap()
    }

    fn sample_doc(dev: &Device) -> Vec<Tensor> {
        vec![
            Tensor::randn(0f32, 1f32, (4, 8), dev).unwrap(),
            Tensor::randn(0f32, 1f32, (2, 8), dev).unwrap(),
            Tensor::randn(0f32, 1f32, (7, 8), dev).unwrap(),
        ]
    }

    #[test]
    fn forward_produces_single_logit() {
        let dev = Device::Cpu;
        let model = build(&dev);
        let logit = model.forward(&sample_doc(&dev)).unwrap();
        assert_eq!(logit.dims(), &[1]);
    }

    #[test]
    fn forward_is_deterministic() {
        let dev = Device::Cpu;
        let model = build(&dev);
        let doc = sample_doc(&dev);
        let a = model.forward(&doc).unwrap().to_vec1::<f32>().unwrap();
        let b = model.forward(&doc).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn score_is_a_probability() {
        let dev = Device::Cpu;
        let model = build(&dev);
        let s = model.score(&sample_doc(&dev)).unwrap();
        assert!(s > 0.0 && s < 1.0, "sigmoid score out of range: {s}");
    }

    #[test]
    fn single_word_single_sentence_document() {
        let dev = Device::Cpu;
        let model = build(&dev);
        let doc = vec![Tensor::randn(0f32, 1f32, (1, 8), &dev).unwrap()];
        let logit = model.forward(&doc).unwrap();
        assert_eq!(logit.dims(), &[1]);
    }

    #[test]
    fn empty_document_is_an_error() {
        let dev = Device::Cpu;
        let model = build(&dev);
        assert!(model.forward(&[]).is_err());
    }
}
