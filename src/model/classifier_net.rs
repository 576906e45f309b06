use candle_core::{Module, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::error::DetectorError;
use crate::features::FEATURE_DIM;
use crate::types::Label;

/// Shape of the feed-forward classifier; stored in every artifact manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierArchitecture {
    pub input_dim: usize,
    pub hidden: Vec<usize>,
    pub num_classes: usize,
    pub dropout: f32,
}

impl Default for ClassifierArchitecture {
    fn default() -> Self {
        Self {
            input_dim: FEATURE_DIM,
            hidden: vec![512, 256, 128],
            num_classes: Label::COUNT,
            dropout: 0.3,
        }
    }
}

impl ClassifierArchitecture {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.input_dim != FEATURE_DIM {
            return Err(DetectorError::configuration(format!(
                "classifier input_dim {} does not match feature dimension {FEATURE_DIM}",
                self.input_dim
            )));
        }
        if self.num_classes != Label::COUNT {
            return Err(DetectorError::configuration(format!(
                "classifier must have {} outputs, got {}",
                Label::COUNT,
                self.num_classes
            )));
        }
        if self.hidden.is_empty() || self.hidden.contains(&0) {
            return Err(DetectorError::configuration(
                "classifier needs at least one non-empty hidden layer",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(DetectorError::configuration(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Dense ReLU stack with dropout after every hidden layer; emits raw logits.
pub(crate) struct VoiceClassifierNet {
    hidden: Vec<Linear>,
    output: Linear,
    dropout: Dropout,
}

impl VoiceClassifierNet {
    pub(crate) fn new(arch: &ClassifierArchitecture, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut hidden = Vec::with_capacity(arch.hidden.len());
        let mut in_dim = arch.input_dim;
        for (i, &width) in arch.hidden.iter().enumerate() {
            hidden.push(candle_nn::linear(in_dim, width, vb.pp(format!("hidden.{i}")))?);
            in_dim = width;
        }
        let output = candle_nn::linear(in_dim, arch.num_classes, vb.pp("output"))?;
        Ok(Self {
            hidden,
            output,
            dropout: Dropout::new(arch.dropout),
        })
    }

    /// `xs` is `(batch, input_dim)`; dropout is active only when `train` is set.
    pub(crate) fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for layer in &self.hidden {
            xs = layer.forward(&xs)?.relu()?;
            xs = self.dropout.forward(&xs, train)?;
        }
        self.output.forward(&xs)
    }
}
