//! # hanet-core — Network Layers
//!
//! Every layer needed to build and run the hierarchical attention classifier:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`norm`] | `NormLayer` (RMSNorm / LayerNorm) |
//! | [`attention`] | `SelfAttention` (bidirectional, RoPE), `AttentionPool` |
//! | [`encoder`] | `FeedForward`, `EncoderBlock` (pre-norm residual) |
//! | [`model`] | `HaNet` (word level → sentence level → logit) |
//!
//! Everything goes through `candle-core`/`candle-nn`; the same code runs on
//! CPU and CUDA. Forward passes are deterministic for fixed weights.

pub mod attention;
pub mod encoder;
pub mod model;
pub mod norm;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use attention::{AttentionPool, SelfAttention};
pub use encoder::EncoderBlock;
pub use model::HaNet;
