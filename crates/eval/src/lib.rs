//! # hanet-eval — Annotation-Task Evaluation
//!
//! * **[`AnnotationDoc`]** / **[`Prediction`]** — task XML records.
//! * **[`EvalRuntime`]** — load a trained model + score documents.
//! * **[`run_evaluation`]** — `{tag}_task2input.xml` → `{tag}_task2output.xml`.

pub mod annotation;
pub mod runtime;

pub use annotation::{read_task_input, write_task_output, AnnotationDoc, Prediction};
pub use runtime::{run_evaluation, EvalRuntime};
