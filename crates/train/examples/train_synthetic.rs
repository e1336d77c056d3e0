//! Example: Train on a synthetic separable corpus.
//!
//! Generates archives of random documents whose word embeddings carry the
//! label's sign, then runs the full epoch loop end to end: train pass, test
//! pass, rolling and best checkpoints, LR decay.
//!
//! Run:
//!   cargo run -p hanet-train --example train_synthetic -- --docs 400 --epochs 3

use std::path::PathBuf;

use candle_core::Device;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hanet_common::{write_archive, DocDataset, Document, HaNetConfig};
use hanet_train::{EpochLog, MetricsWriter, Trainer, TrainerConfig};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "target/synthetic")]
    work_dir: PathBuf,
    #[arg(long, default_value = "400")]
    docs: usize,
    #[arg(long, default_value = "3")]
    epochs: usize,
    #[arg(long, default_value = "16")]
    embed_dim: usize,
    #[arg(long, default_value = "1e-3")]
    lr: f64,
    #[arg(long, default_value = "233")]
    seed: u64,
}

/// A random document whose words are shifted by the label's sign.
fn synthetic_doc(rng: &mut StdRng, embed_dim: usize, label: u8) -> Document {
    let shift = if label == 1 { 0.5 } else { -0.5 };
    let sentences = (0..rng.random_range(1..4))
        .map(|_| {
            let words = rng.random_range(2..8usize);
            (0..words * embed_dim)
                .map(|_| rng.random_range(-1.0f32..1.0) + shift)
                .collect()
        })
        .collect();
    Document { label, sentences }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.work_dir)?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let make = |rng: &mut StdRng, n: usize| -> Vec<Document> {
        (0..n)
            .map(|i| synthetic_doc(rng, args.embed_dim, (i % 2) as u8))
            .collect()
    };
    let train_path = args.work_dir.join("synthetic_train.bin");
    let test_path = args.work_dir.join("synthetic_test.bin");
    write_archive(&train_path, args.embed_dim, &make(&mut rng, args.docs))?;
    write_archive(&test_path, args.embed_dim, &make(&mut rng, (args.docs / 4).max(1)))?;

    let train_ds = DocDataset::load(&train_path)?;
    let test_ds = DocDataset::load(&test_path)?;

    let model_config = HaNetConfig {
        embed_dim: args.embed_dim,
        hidden_dim: 32,
        num_heads: 4,
        intermediate_size: 64,
        word_layers: 1,
        sent_layers: 1,
        ..Default::default()
    };
    let trainer_config = TrainerConfig {
        lr: args.lr,
        tag: "SYN".to_string(),
        model_dir: args.work_dir.join("trained_models"),
        ..Default::default()
    };

    let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
    let mut trainer = Trainer::new(model_config, trainer_config, device)?;
    let mut metrics = MetricsWriter::open(&args.work_dir.join("metrics"))?;

    for epoch in 0..args.epochs {
        let mut log = EpochLog::create(&args.work_dir.join("logs"), epoch)?;
        let stats = trainer.train_epoch(&train_ds, epoch, &mut rng, &mut metrics, &mut log)?;
        trainer.save_epoch_checkpoint(epoch)?;
        let test_acc = trainer.evaluate(&test_ds)?;
        trainer.save_if_best(test_acc)?;
        metrics.record_test_accuracy(epoch, test_acc)?;
        trainer.end_epoch();
        tracing::info!(
            epoch,
            train_accuracy = stats.accuracy,
            test_accuracy = test_acc,
            mean_loss = stats.mean_loss,
            lr = trainer.current_lr(),
            "epoch complete"
        );
    }
    Ok(())
}
