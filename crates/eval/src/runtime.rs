//! Evaluation runtime: load a trained model and score annotation documents.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

use hanet_common::HaNetConfig;
use hanet_core::HaNet;

use crate::annotation::{read_task_input, write_task_output, AnnotationDoc, Prediction};

/// A trained classifier loaded from a model directory.
pub struct EvalRuntime {
    model: HaNet,
    #[allow(dead_code)]
    varmap: VarMap,
    config: HaNetConfig,
    device: Device,
}

impl EvalRuntime {
    /// Load `config.json` plus `model_{tag}.safetensors` from `model_dir`.
    ///
    /// Unlike training startup, a missing or unreadable checkpoint is a hard
    /// error: scoring with random weights would silently produce garbage.
    pub fn load(model_dir: &Path, tag: &str, device: Device) -> anyhow::Result<Self> {
        let config = HaNetConfig::load(&model_dir.join("config.json"))?;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = HaNet::new(vb, &config)?;

        let safetensors = model_dir.join(format!("model_{tag}.safetensors"));
        varmap.load(&safetensors)?;

        Ok(Self {
            model,
            varmap,
            config,
            device,
        })
    }

    pub fn config(&self) -> &HaNetConfig {
        &self.config
    }

    /// Score one document; the score is `None` when it has no sentences.
    pub fn predict(&self, doc: &AnnotationDoc) -> anyhow::Result<Prediction> {
        if doc.is_empty() {
            return Ok(Prediction {
                id: doc.id.clone(),
                score: None,
            });
        }
        let mut sentences = Vec::with_capacity(doc.sentences.len());
        for s in &doc.sentences {
            let n_words = s.len() / self.config.embed_dim;
            sentences.push(Tensor::from_vec(
                s.clone(),
                (n_words, self.config.embed_dim),
                &self.device,
            )?);
        }
        let score = self.model.score(&sentences)?;
        Ok(Prediction {
            id: doc.id.clone(),
            score: Some(score),
        })
    }
}

/// Full evaluation pass: read `{tag}_task2input.xml` from `data_dir`, score
/// every document, write `{tag}_task2output.xml` next to it. Returns the
/// output path.
pub fn run_evaluation(
    data_dir: &Path,
    model_dir: &Path,
    tag: &str,
    device: Device,
) -> anyhow::Result<PathBuf> {
    let runtime = EvalRuntime::load(model_dir, tag, device)?;
    let input_path = data_dir.join(format!("{tag}_task2input.xml"));
    let docs = read_task_input(&input_path, runtime.config().embed_dim)?;

    let mut predictions = Vec::with_capacity(docs.len());
    for doc in &docs {
        predictions.push(runtime.predict(doc)?);
    }

    let output_path = data_dir.join(format!("{tag}_task2output.xml"));
    write_task_output(&output_path, &predictions)?;
    tracing::info!(
        documents = docs.len(),
        output = %output_path.display(),
        "evaluation complete"
    );
    Ok(output_path)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> HaNetConfig {
        HaNetConfig {
            embed_dim: 4,
            hidden_dim: 8,
            num_heads: 2,
            intermediate_size: 16,
            word_layers: 1,
            sent_layers: 1,
            ..Default::default()
        }
    }

    /// Save a freshly initialised model under `model_dir` as tag `tag`.
    fn save_model(model_dir: &Path, tag: &str) {
        let config = tiny_config();
        config.save(&model_dir.join("config.json")).unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _model = HaNet::new(vb, &config).unwrap();
        varmap
            .save(model_dir.join(format!("model_{tag}.safetensors")))
            .unwrap();
    }

    #[test]
    fn predicts_scores_for_non_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        save_model(dir.path(), "XX");
        let rt = EvalRuntime::load(dir.path(), "XX", Device::Cpu).unwrap();

        let doc = AnnotationDoc {
            id: "d1".to_string(),
            sentences: vec![vec![0.1; 8], vec![0.2; 4]],
        };
        let p = rt.predict(&doc).unwrap();
        let s = p.score.unwrap();
        assert!(s > 0.0 && s < 1.0);

        let empty = AnnotationDoc {
            id: "d2".to_string(),
            sentences: vec![],
        };
        let p = rt.predict(&empty).unwrap();
        assert_eq!(p.score, None);
        assert_eq!(p.polarity(), "unknown");
    }

    #[test]
    fn missing_checkpoint_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        tiny_config().save(&dir.path().join("config.json")).unwrap();
        assert!(EvalRuntime::load(dir.path(), "XX", Device::Cpu).is_err());
    }

    #[test]
    fn missing_config_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EvalRuntime::load(dir.path(), "XX", Device::Cpu).is_err());
    }

    #[test]
    fn evaluation_pass_writes_the_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("models");
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::create_dir_all(&data_dir).unwrap();
        save_model(&model_dir, "EN");

        let input = r#"<?xml version="1.0" encoding="UTF-8"?>
<documents>
  <document id="a">
    <sentence>
      <word v="0.1 0.2 0.3 0.4"/>
    </sentence>
  </document>
  <document id="b"/>
</documents>"#;
        std::fs::write(data_dir.join("EN_task2input.xml"), input).unwrap();

        let out = run_evaluation(&data_dir, &model_dir, "EN", Device::Cpu).unwrap();
        assert_eq!(out, data_dir.join("EN_task2output.xml"));

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains(r#"id="a""#));
        assert!(text.contains(r#"<document id="b" polarity="unknown"/>"#));
    }
}
