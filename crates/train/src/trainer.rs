//! Trainer: one-document-at-a-time training for the sentiment classifier.
//!
//! Owns the model, the AdamW optimiser and the per-epoch learning-rate
//! schedule. The CLI drives the epoch loop; the trainer supplies the
//! per-epoch training pass, the held-out test pass, and checkpointing.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::{loss, ops, AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use hanet_common::{DocDataset, Document, HaNetConfig};
use hanet_core::HaNet;

use crate::metrics::{EpochLog, MetricsWriter};
use crate::scheduler::AnnealLr;

// ── Config ──────────────────────────────────────────────────────────────────

/// All training hyper-parameters (CLI-level knobs).
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub lr: f64,
    pub gamma: f64,
    /// Starting epoch; a nonzero value resumes an interrupted run.
    pub start_epoch: usize,
    /// Record the step loss every this many processed steps.
    pub loss_every: usize,
    /// Record windowed accuracy every this many processed steps.
    pub accuracy_every: usize,
    /// Corpus tag, used in the best-checkpoint file name.
    pub tag: String,
    pub model_dir: PathBuf,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            gamma: 0.96,
            start_epoch: 0,
            loss_every: 10,
            accuracy_every: 100,
            tag: "CN".to_string(),
            model_dir: PathBuf::from("trained_models"),
        }
    }
}

/// Metrics returned after each training step.
#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub step: usize,
    pub loss: f32,
    pub score: f32,
    pub correct: bool,
}

/// Summary of one full pass over the training archive.
#[derive(Debug, Clone)]
pub struct EpochStats {
    pub epoch: usize,
    pub processed: usize,
    pub skipped: usize,
    pub mean_loss: f32,
    pub accuracy: f32,
}

/// Whether a score agrees with a label at the 0.5 decision threshold.
///
/// A score of exactly 0.5 counts as a positive prediction.
pub fn agrees(score: f32, label: u8) -> bool {
    if label == 1 {
        score >= 0.5
    } else {
        score < 0.5
    }
}

// ── Trainer ─────────────────────────────────────────────────────────────────

/// The training engine. Owns the model, optimiser, and LR schedule.
pub struct Trainer {
    pub model: HaNet,
    pub varmap: VarMap,
    optimizer: AdamW,
    scheduler: AnnealLr,
    pub config: TrainerConfig,
    model_config: HaNetConfig,
    pub global_step: usize,
    best_accuracy: f32,
    epochs_since_best: usize,
    device: Device,
}

impl Trainer {
    /// Construct a new Trainer. Builds the model from config.
    pub fn new(
        model_config: HaNetConfig,
        trainer_config: TrainerConfig,
        device: Device,
    ) -> anyhow::Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = HaNet::new(vb, &model_config)?;

        let scheduler = AnnealLr::with_epochs_done(
            trainer_config.lr,
            trainer_config.gamma,
            trainer_config.start_epoch,
        );
        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: scheduler.current_lr(),
                // Plain Adam: no decoupled weight decay.
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let params: usize = varmap
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum();
        tracing::info!(
            params,
            lr = scheduler.current_lr(),
            start_epoch = trainer_config.start_epoch,
            "built model"
        );

        Ok(Self {
            model,
            varmap,
            optimizer,
            scheduler,
            config: trainer_config,
            model_config,
            global_step: 0,
            best_accuracy: 0.0,
            epochs_since_best: 0,
            device,
        })
    }

    /// One optimiser step over a single document.
    ///
    /// The score is taken from the same forward pass the loss is computed
    /// from, so accuracy reflects the weights before the update.
    pub fn step(&mut self, doc: &Document) -> anyhow::Result<StepMetrics> {
        let sentences = doc.to_tensors(self.model_config.embed_dim, &self.device)?;
        let logit = self.model.forward(&sentences)?;
        let score = ops::sigmoid(&logit)?.squeeze(0)?.to_scalar::<f32>()?;

        let target = Tensor::new(&[doc.label as f32], &self.device)?;
        let loss = loss::binary_cross_entropy_with_logit(&logit, &target)?;
        let loss_val = loss.to_scalar::<f32>()?;

        let grads = loss.backward()?;
        self.optimizer.step(&grads)?;
        self.global_step += 1;

        Ok(StepMetrics {
            step: self.global_step,
            loss: loss_val,
            score,
            correct: agrees(score, doc.label),
        })
    }

    /// One shuffled pass over the training archive.
    ///
    /// Zero-sentence documents are skipped without touching the processed
    /// count, the metric windows, or the global step. Loss is recorded every
    /// `loss_every` processed steps; windowed accuracy and a log line every
    /// `accuracy_every`, after which the window resets.
    pub fn train_epoch(
        &mut self,
        dataset: &DocDataset,
        epoch: usize,
        rng: &mut StdRng,
        metrics: &mut MetricsWriter,
        log: &mut EpochLog,
    ) -> anyhow::Result<EpochStats> {
        let order = epoch_order(dataset.len(), rng);

        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut loss_sum = 0.0f32;
        let mut correct = 0usize;
        let mut window_correct = 0usize;
        let mut window_loss = 0.0f32;

        for &idx in &order {
            let doc = dataset.get(idx);
            if doc.is_empty() {
                skipped += 1;
                continue;
            }
            let m = self.step(doc)?;
            processed += 1;
            loss_sum += m.loss;
            window_loss += m.loss;
            if m.correct {
                correct += 1;
                window_correct += 1;
            }

            if processed % self.config.loss_every == 0 {
                metrics.record_train_loss(m.step, m.loss)?;
            }
            if processed % self.config.accuracy_every == 0 {
                let acc = window_correct as f32 / self.config.accuracy_every as f32;
                let mean = window_loss / self.config.accuracy_every as f32;
                metrics.record_train_accuracy(m.step, acc)?;
                log.info(&format!(
                    "epoch {epoch} step {}: accuracy {acc:.4}, mean loss {mean:.4}",
                    m.step
                ))?;
                tracing::info!(
                    epoch,
                    step = m.step,
                    accuracy = acc,
                    mean_loss = mean,
                    "train window"
                );
                window_correct = 0;
                window_loss = 0.0;
            }
        }

        if processed == 0 {
            anyhow::bail!("epoch {epoch}: no non-empty documents to train on");
        }
        Ok(EpochStats {
            epoch,
            processed,
            skipped,
            mean_loss: loss_sum / processed as f32,
            accuracy: correct as f32 / processed as f32,
        })
    }

    /// Accuracy over the non-empty documents of the held-out archive.
    ///
    /// No gradients, no shuffling, no optimiser interaction.
    pub fn evaluate(&self, dataset: &DocDataset) -> anyhow::Result<f32> {
        let mut correct = 0usize;
        let mut total = 0usize;
        for doc in dataset.docs() {
            if doc.is_empty() {
                continue;
            }
            let sentences = doc.to_tensors(self.model_config.embed_dim, &self.device)?;
            let score = self.model.score(&sentences)?;
            if agrees(score, doc.label) {
                correct += 1;
            }
            total += 1;
        }
        if total == 0 {
            anyhow::bail!("test set has no non-empty documents");
        }
        Ok(correct as f32 / total as f32)
    }

    /// Save the rolling per-epoch checkpoint (and the model config).
    pub fn save_epoch_checkpoint(&self, epoch: usize) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.config.model_dir)?;
        let path = self
            .config
            .model_dir
            .join(format!("epoch{epoch}.safetensors"));
        self.varmap.save(&path)?;
        self.model_config
            .save(&self.config.model_dir.join("config.json"))?;
        Ok(path)
    }

    /// Path of the best-model checkpoint for this run's tag.
    pub fn best_checkpoint_path(&self) -> PathBuf {
        self.config
            .model_dir
            .join(format!("model_{}.safetensors", self.config.tag))
    }

    /// Persist the best-model checkpoint iff `accuracy` strictly beats the
    /// best seen so far. Returns whether it did.
    pub fn save_if_best(&mut self, accuracy: f32) -> anyhow::Result<bool> {
        if accuracy > self.best_accuracy {
            self.best_accuracy = accuracy;
            self.epochs_since_best = 0;
            std::fs::create_dir_all(&self.config.model_dir)?;
            let path = self.best_checkpoint_path();
            self.varmap.save(&path)?;
            tracing::info!(accuracy, path = %path.display(), "new best model");
            Ok(true)
        } else {
            self.epochs_since_best += 1;
            Ok(false)
        }
    }

    /// Try to load weights from a checkpoint; on failure the fresh random
    /// initialisation stays in place and `false` is returned.
    pub fn load_checkpoint_best_effort(&mut self, path: &Path) -> bool {
        match self.varmap.load(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "loaded model checkpoint");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not load model checkpoint");
                false
            }
        }
    }

    /// Advance the learning-rate schedule after a completed epoch and push
    /// the decayed rate into the optimiser.
    pub fn end_epoch(&mut self) {
        self.scheduler.advance();
        self.optimizer.set_learning_rate(self.scheduler.current_lr());
    }

    pub fn current_lr(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn best_accuracy(&self) -> f32 {
        self.best_accuracy
    }

    /// Epochs since the test accuracy last improved; the driver's patience
    /// stop reads this.
    pub fn epochs_since_best(&self) -> usize {
        self.epochs_since_best
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// Shuffled visit order for one epoch. Each epoch continues the same RNG
/// stream, so a fixed seed fixes the whole run's ordering.
fn epoch_order(len: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

// ── Tests ───────────────────────────────────────────────────────────────────
