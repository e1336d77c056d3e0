//! Model configuration for HA-Net.
//!
//! Serialised as JSON next to the checkpoints so a trained model directory is
//! self-describing. Architecture switches carry a default so older config
//! files keep loading when fields are added.

use serde::{Deserialize, Serialize};

/// Configuration for the hierarchical attention classifier.
///
/// Stored alongside weights for reproducible reload. Backwards-compatible:
/// missing optional fields fall back to their `#[serde(default)]` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaNetConfig {
    // ── Core dimensions ─────────────────────────────────────────────────────
    /// Width of the pre-computed word embeddings in the dataset archives.
    pub embed_dim: usize,
    /// Hidden size shared by both encoder levels.
    pub hidden_dim: usize,
    /// Number of attention heads.
    pub num_heads: usize,
    /// FFN intermediate dimension.
    pub intermediate_size: usize,
    /// Encoder blocks at the word level.
    pub word_layers: usize,
    /// Encoder blocks at the sentence level.
    pub sent_layers: usize,

    // ── Architecture switches ───────────────────────────────────────────────
    /// Use RMSNorm for the pre-norms instead of LayerNorm.
    #[serde(default = "default_true")]
    pub use_rmsnorm: bool,
    /// Use Rotary Position Embeddings in word-level attention.
    #[serde(default = "default_true")]
    pub use_rope: bool,
    /// Layer norm / RMSNorm epsilon.
    #[serde(default = "default_norm_eps")]
    pub norm_eps: f64,
}

// ── Default value functions ─────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_norm_eps() -> f64 {
    1e-5
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for HaNetConfig {
    fn default() -> Self {
        Self {
            embed_dim: 300, // word2vec-style embeddings
            hidden_dim: 128,
            num_heads: 4,
            intermediate_size: 512,
            word_layers: 1,
            sent_layers: 1,
            use_rmsnorm: true,
            use_rope: true,
            norm_eps: 1e-5,
        }
    }
}

impl HaNetConfig {
    /// Head dimension (`hidden_dim / num_heads`). Panics if not divisible.
    pub fn head_dim(&self) -> usize {
        assert!(
            self.hidden_dim % self.num_heads == 0,
            "hidden_dim ({}) must be divisible by num_heads ({})",
            self.hidden_dim,
            self.num_heads,
        );
        self.hidden_dim / self.num_heads
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_json_round_trip() {
        let config = HaNetConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let loaded: HaNetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.embed_dim, loaded.embed_dim);
        assert_eq!(config.hidden_dim, loaded.hidden_dim);
        assert_eq!(config.num_heads, loaded.num_heads);
        assert_eq!(config.word_layers, loaded.word_layers);
        assert_eq!(config.sent_layers, loaded.sent_layers);
        assert!(loaded.use_rmsnorm);
    }

    #[test]
    fn config_head_dim() {
        let config = HaNetConfig {
            hidden_dim: 128,
            num_heads: 4,
            ..Default::default()
        };
        assert_eq!(config.head_dim(), 32);
    }

    #[test]
    fn backward_compat_missing_fields() {
        // A JSON with only the core dimensions (no switches)
        let old_json = r#"{
            "embed_dim": 300,
            "hidden_dim": 256,
            "num_heads": 8,
            "intermediate_size": 1024,
            "word_layers": 2,
            "sent_layers": 1
        }"#;
        let loaded: HaNetConfig = serde_json::from_str(old_json).unwrap();
        // Missing fields should default correctly
        assert!(loaded.use_rmsnorm);
        assert!(loaded.use_rope);
        assert_eq!(loaded.norm_eps, 1e-5);
    }
}
