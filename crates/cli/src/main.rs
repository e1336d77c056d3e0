use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use hanet_common::{write_archive, DocDataset, Document, HaNetConfig};
use hanet_eval::run_evaluation;
use hanet_train::{clear_dir_files, EpochLog, MetricsWriter, Trainer, TrainerConfig};

#[derive(Parser, Debug)]
#[command(name = "hanet", about = "Unified CLI for the HA-Net sentiment classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the classifier on packed document archives.
    Train(TrainArgs),
    /// Score an annotation task-input file with a trained model.
    Evaluate(EvaluateArgs),
    /// Pack a JSON-lines corpus into a binary document archive.
    Pack(PackArgs),
}

// ── Train ───────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct TrainArgs {
    /// Run on a CUDA device instead of the CPU.
    #[arg(long)]
    gpu: bool,
    #[arg(long, default_value_t = 0)]
    gpu_id: usize,
    /// Warm-start from the best checkpoint for this tag, if it loads.
    #[arg(long)]
    model_load: bool,
    #[arg(long, default_value_t = 1e-4)]
    lr: f64,
    #[arg(long, default_value_t = 233)]
    seed: u64,
    /// Recorded in the run log; the training loop is single-threaded.
    #[arg(long, default_value_t = 8)]
    workers: usize,
    /// Corpus tag; selects `{tag}_train.bin` / `{tag}_test.bin` and names
    /// the best checkpoint.
    #[arg(long, default_value = "CN")]
    tag: String,
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "trained_models")]
    model_dir: PathBuf,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[arg(long, default_value = "metrics")]
    metrics_dir: PathBuf,
    /// Starting epoch; pass the number of epochs already completed to
    /// resume an interrupted run.
    #[arg(long, default_value_t = 0)]
    epoch: usize,
    /// Multiplicative learning-rate decay applied after each epoch.
    #[arg(long, default_value_t = 0.96)]
    gamma: f64,
    #[arg(long, default_value_t = 100)]
    max_epochs: usize,
    /// Stop early after this many epochs without a test-accuracy improvement.
    #[arg(long)]
    patience: Option<usize>,
}

// ── Evaluate / Pack ─────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct EvaluateArgs {
    #[arg(long)]
    gpu: bool,
    #[arg(long, default_value_t = 0)]
    gpu_id: usize,
    #[arg(long, default_value = "CN")]
    tag: String,
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "trained_models")]
    model_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct PackArgs {
    /// JSON-lines input, one document per line:
    /// `{"label": 0|1, "sentences": [[[...], ...], ...]}`.
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    embed_dim: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => cmd_train(args),
        Command::Evaluate(args) => cmd_evaluate(args),
        Command::Pack(args) => cmd_pack(args),
    }
}

// ── Command implementations ─────────────────────────────────────────────────

fn select_device(gpu: bool, gpu_id: usize) -> Result<Device> {
    if gpu {
        Ok(Device::new_cuda(gpu_id)?)
    } else {
        Ok(Device::Cpu)
    }
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    if args.epoch >= args.max_epochs {
        anyhow::bail!(
            "starting epoch {} is not below --max-epochs {}",
            args.epoch,
            args.max_epochs
        );
    }

    let device = select_device(args.gpu, args.gpu_id)?;
    if args.gpu {
        device.set_seed(args.seed)?;
    }
    let mut rng = StdRng::seed_from_u64(args.seed);

    let train_ds = DocDataset::load(&args.data_dir.join(format!("{}_train.bin", args.tag)))?;
    let test_ds = DocDataset::load(&args.data_dir.join(format!("{}_test.bin", args.tag)))?;
    if train_ds.is_empty() {
        anyhow::bail!("training archive has no documents");
    }
    if test_ds.embed_dim() != train_ds.embed_dim() {
        anyhow::bail!(
            "train archive embed_dim {} does not match test archive embed_dim {}",
            train_ds.embed_dim(),
            test_ds.embed_dim()
        );
    }
    eprintln!(
        "Loaded {} train / {} test documents (embed_dim {})",
        train_ds.len(),
        test_ds.len(),
        train_ds.embed_dim()
    );

    let config_path = args.model_dir.join("config.json");
    let model_config = if config_path.exists() {
        HaNetConfig::load(&config_path)?
    } else {
        let config = HaNetConfig {
            embed_dim: train_ds.embed_dim(),
            ..Default::default()
        };
        std::fs::create_dir_all(&args.model_dir)?;
        config.save(&config_path)?;
        eprintln!("Created default config at {}", config_path.display());
        config
    };
    if model_config.embed_dim != train_ds.embed_dim() {
        anyhow::bail!(
            "config embed_dim {} does not match archive embed_dim {}",
            model_config.embed_dim,
            train_ds.embed_dim()
        );
    }

    std::fs::create_dir_all(&args.log_dir)?;
    std::fs::create_dir_all(&args.metrics_dir)?;
    // Fresh runs wipe the scalar streams and logs of previous runs.
    if args.epoch == 0 {
        clear_dir_files(&args.log_dir)?;
        clear_dir_files(&args.metrics_dir)?;
    }

    tracing::info!(
        tag = %args.tag,
        seed = args.seed,
        workers = args.workers,
        lr = args.lr,
        gamma = args.gamma,
        start_epoch = args.epoch,
        max_epochs = args.max_epochs,
        "training run configured"
    );

    let trainer_config = TrainerConfig {
        lr: args.lr,
        gamma: args.gamma,
        start_epoch: args.epoch,
        tag: args.tag.clone(),
        model_dir: args.model_dir.clone(),
        ..Default::default()
    };
    let mut trainer = Trainer::new(model_config, trainer_config, device)?;

    if args.model_load {
        let best = trainer.best_checkpoint_path();
        if !trainer.load_checkpoint_best_effort(&best) {
            eprintln!("Cannot load existing model from file!");
        }
    }

    let mut metrics = MetricsWriter::open(&args.metrics_dir)?;

    for epoch in args.epoch..args.max_epochs {
        eprintln!("==== epoch {epoch} lr {:.2e} ====", trainer.current_lr());
        let mut log = EpochLog::create(&args.log_dir, epoch)?;
        let stats = trainer.train_epoch(&train_ds, epoch, &mut rng, &mut metrics, &mut log)?;
        eprintln!(
            "epoch {epoch} processed {} skipped {} train accuracy {:.4} mean loss {:.4}",
            stats.processed, stats.skipped, stats.accuracy, stats.mean_loss
        );

        let path = trainer.save_epoch_checkpoint(epoch)?;
        eprintln!("Saved checkpoint to {}", path.display());

        let test_acc = trainer.evaluate(&test_ds)?;
        eprintln!("epoch {epoch} test accuracy {test_acc:.4}");
        if trainer.save_if_best(test_acc)? {
            eprintln!(
                "New best model ({test_acc:.4}) saved to {}",
                trainer.best_checkpoint_path().display()
            );
        }
        metrics.record_test_accuracy(epoch, test_acc)?;
        trainer.end_epoch();

        if let Some(patience) = args.patience {
            if trainer.epochs_since_best() >= patience {
                eprintln!("No test-accuracy improvement for {patience} epochs; stopping.");
                break;
            }
        }
    }

    eprintln!(
        "Training done. Best test accuracy {:.4}",
        trainer.best_accuracy()
    );
    Ok(())
}

fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let device = select_device(args.gpu, args.gpu_id)?;
    eprintln!("Loading model from {} ...", args.model_dir.display());
    let output = run_evaluation(&args.data_dir, &args.model_dir, &args.tag, device)?;
    eprintln!("Wrote predictions to {}", output.display());
    Ok(())
}

fn cmd_pack(args: PackArgs) -> Result<()> {
    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("open {}", args.input.display()))?;
    let docs = parse_jsonl_docs(std::io::BufReader::new(file), args.embed_dim)?;
    write_archive(&args.output, args.embed_dim, &docs)?;
    eprintln!(
        "Packed {} documents to {}",
        docs.len(),
        args.output.display()
    );
    Ok(())
}

// ── JSON-lines corpus parsing ───────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct JsonDoc {
    label: u8,
    /// Sentences as lists of word vectors, each `embed_dim` wide.
    sentences: Vec<Vec<Vec<f32>>>,
}

/// Parse a JSON-lines corpus into flat documents. Blank lines are skipped;
/// word vectors must all be `embed_dim` wide.
fn parse_jsonl_docs(reader: impl BufRead, embed_dim: usize) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let lineno = idx + 1;
        let parsed: JsonDoc = serde_json::from_str(&line)
            .with_context(|| format!("line {lineno}: invalid document"))?;
        if parsed.label > 1 {
            anyhow::bail!("line {lineno}: label {} is not binary", parsed.label);
        }
        let mut sentences = Vec::with_capacity(parsed.sentences.len());
        for (j, sentence) in parsed.sentences.iter().enumerate() {
            if sentence.is_empty() {
                anyhow::bail!("line {lineno}: sentence {j} has no words");
            }
            let mut flat = Vec::with_capacity(sentence.len() * embed_dim);
            for word in sentence {
                if word.len() != embed_dim {
                    anyhow::bail!(
                        "line {lineno}: word vector has {} values, expected {embed_dim}",
                        word.len()
                    );
                }
                flat.extend_from_slice(word);
            }
            sentences.push(flat);
        }
        docs.push(Document {
            label: parsed.label,
            sentences,
        });
    }
    Ok(docs)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_corpus_parses_with_blank_lines_and_empty_documents() {
        let input = concat!(
            r#"{"label": 1, "sentences": [[[0.1, 0.2], [0.3, 0.4]], [[0.5, 0.6]]]}"#,
            "\n\n",
            r#"{"label": 0, "sentences": []}"#,
            "\n",
        );
        let docs = parse_jsonl_docs(input.as_bytes(), 2).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].label, 1);
        assert_eq!(docs[0].sentences[0], vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(docs[0].sentences[1], vec![0.5, 0.6]);
        assert!(docs[1].is_empty());
    }

    #[test]
    fn jsonl_rejects_non_binary_labels() {
        let input = r#"{"label": 2, "sentences": [[[0.1, 0.2]]]}"#;
        assert!(parse_jsonl_docs(input.as_bytes(), 2).is_err());
    }

    #[test]
    fn jsonl_rejects_wrong_width_word_vectors() {
        let input = r#"{"label": 0, "sentences": [[[0.1, 0.2, 0.3]]]}"#;
        assert!(parse_jsonl_docs(input.as_bytes(), 2).is_err());
        // Four-wide words flatten to a clean multiple of 2 and still fail.
        let input = r#"{"label": 0, "sentences": [[[0.1, 0.2, 0.3, 0.4]]]}"#;
        assert!(parse_jsonl_docs(input.as_bytes(), 2).is_err());
    }

    #[test]
    fn jsonl_rejects_sentences_without_words() {
        let input = r#"{"label": 0, "sentences": [[]]}"#;
        assert!(parse_jsonl_docs(input.as_bytes(), 2).is_err());
    }
}
