//! # hanet-train — The Training Engine
//!
//! Training loop, optimiser, and metrics for the sentiment classifier:
//!
//! * **[`Trainer`]** — owns model + optimiser + LR schedule. One call to
//!   [`Trainer::train_epoch`] runs a shuffled pass over the archive with
//!   per-step backward, AdamW, and metric recording; [`Trainer::evaluate`]
//!   scores the held-out split.
//! * **[`AnnealLr`]** — multiplicative per-epoch learning-rate decay.
//! * **[`MetricsWriter`]** / **[`EpochLog`]** — CSV scalar streams and the
//!   per-epoch run log.

pub mod metrics;
pub mod scheduler;
pub mod trainer;

pub use metrics::{clear_dir_files, EpochLog, MetricsWriter};
pub use scheduler::AnnealLr;
pub use trainer::{agrees, EpochStats, StepMetrics, Trainer, TrainerConfig};
