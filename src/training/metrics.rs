use serde::Serialize;

use crate::types::Label;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: Label,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

/// Confusion matrix plus per-class scores. `confusion[actual][predicted]`,
/// indexed by [`Label::index`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f32,
    pub confusion: [[usize; Label::COUNT]; Label::COUNT],
    pub per_class: Vec<ClassMetrics>,
    pub total: usize,
}

impl ClassificationMetrics {
    /// `pairs` yields `(actual, predicted)`. Undefined ratios are reported as 0.
    pub fn from_predictions(pairs: impl IntoIterator<Item = (Label, Label)>) -> Self {
        let mut confusion = [[0usize; Label::COUNT]; Label::COUNT];
        for (actual, predicted) in pairs {
            confusion[actual.index()][predicted.index()] += 1;
        }
        let total: usize = confusion.iter().flatten().sum();
        let correct: usize = (0..Label::COUNT).map(|i| confusion[i][i]).sum();

        let per_class = Label::ALL
            .iter()
            .map(|&label| {
                let i = label.index();
                let tp = confusion[i][i];
                let support: usize = confusion[i].iter().sum();
                let predicted: usize = confusion.iter().map(|row| row[i]).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        Self {
            accuracy: ratio(correct, total),
            confusion,
            per_class,
            total,
        }
    }

    pub fn class(&self, label: Label) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|m| m.label == label)
    }

    pub fn macro_f1(&self) -> f32 {
        if self.per_class.is_empty() {
            return 0.0;
        }
        self.per_class.iter().map(|m| m.f1).sum::<f32>() / self.per_class.len() as f32
    }
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}
