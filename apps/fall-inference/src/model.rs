use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const FEATURE_COUNT: usize = 9;

/// Backend seam for the classifier: a 9-feature vector in, a fall
/// probability percentage out.
pub trait FallModel: Send + Sync {
    fn infer_one(&self, features: &[f32; FEATURE_COUNT]) -> Result<f32>;
}

#[derive(Debug, Deserialize)]
struct ModelWeights {
    weights: Vec<f32>,
    bias: f32,
}

/// Logistic backend loaded from a JSON weights file:
/// `{"weights": [w0..w8], "bias": b}`. The logit maps through a sigmoid onto
/// 0..100, matching the upstream classifier's output scale.
pub struct LogisticModel {
    weights: [f32; FEATURE_COUNT],
    bias: f32,
}

impl LogisticModel {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read model weights {}", path.display()))?;
        let parsed: ModelWeights =
            serde_json::from_str(&raw).context("parse model weights JSON")?;
        Self::from_weights(parsed)
    }

    fn from_weights(parsed: ModelWeights) -> Result<Self> {
        if parsed.weights.len() != FEATURE_COUNT {
            anyhow::bail!(
                "model must have {FEATURE_COUNT} weights, got {}",
                parsed.weights.len()
            );
        }
        let mut weights = [0f32; FEATURE_COUNT];
        weights.copy_from_slice(&parsed.weights);
        Ok(Self {
            weights,
            bias: parsed.bias,
        })
    }
}

impl FallModel for LogisticModel {
    fn infer_one(&self, features: &[f32; FEATURE_COUNT]) -> Result<f32> {
        let logit: f32 = self
            .weights
            .iter()
            .zip(features)
            .map(|(weight, feature)| weight * feature)
            .sum::<f32>()
            + self.bias;
        Ok(sigmoid(logit) * 100.0)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
