use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::error::{ClassificationError, InferenceError};

/// The five content categories, in the order they appear in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Porn,
    Sexy,
    Hentai,
    Neutral,
    Drawing,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Porn,
        Category::Sexy,
        Category::Hentai,
        Category::Neutral,
        Category::Drawing,
    ];

    /// Label the classifier reports this category under.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Porn => "Porn",
            Self::Sexy => "Sexy",
            Self::Hentai => "Hentai",
            Self::Neutral => "Neutral",
            Self::Drawing => "Drawing",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Independent per-category scores in `[0, 1]`. They need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionVector {
    pub porn: f32,
    pub sexy: f32,
    pub hentai: f32,
    pub neutral: f32,
    pub drawing: f32,
}

impl PredictionVector {
    /// Maps raw label scores onto the five categories.
    ///
    /// Labels match case-insensitively. A category the classifier did not
    /// report scores 0, labels outside the five are ignored, and finite scores
    /// are clamped into `[0, 1]`.
    pub fn from_scores(scores: &HashMap<String, f32>) -> Result<Self, InferenceError> {
        let mut prediction = Self::default();
        for category in Category::ALL {
            let found = scores
                .iter()
                .find(|(label, _)| label.eq_ignore_ascii_case(category.label()));
            let score = match found {
                Some((label, score)) if !score.is_finite() => {
                    return Err(InferenceError::NonFiniteScore { label: label.clone() })
                }
                Some((_, score)) => score.clamp(0.0, 1.0),
                None => 0.0,
            };
            *prediction.score_mut(category) = score;
        }
        Ok(prediction)
    }

    pub fn score(&self, category: Category) -> f32 {
        match category {
            Category::Porn => self.porn,
            Category::Sexy => self.sexy,
            Category::Hentai => self.hentai,
            Category::Neutral => self.neutral,
            Category::Drawing => self.drawing,
        }
    }

    fn score_mut(&mut self, category: Category) -> &mut f32 {
        match category {
            Category::Porn => &mut self.porn,
            Category::Sexy => &mut self.sexy,
            Category::Hentai => &mut self.hentai,
            Category::Neutral => &mut self.neutral,
            Category::Drawing => &mut self.drawing,
        }
    }

    /// Highest-scoring category. Ties resolve in `Category::ALL` order.
    pub fn top(&self) -> Category {
        let mut best = Category::Porn;
        for category in Category::ALL {
            if self.score(category) > self.score(best) {
                best = category;
            }
        }
        best
    }
}

/// Outcome for a single input, tagged with the caller's original filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassificationResult {
    Success {
        filename: String,
        prediction: PredictionVector,
    },
    Failure {
        filename: String,
        error: String,
    },
}

impl ClassificationResult {
    pub fn from_outcome(filename: impl Into<String>, outcome: Result<PredictionVector, ClassificationError>) -> Self {
        let filename = filename.into();
        match outcome {
            Ok(prediction) => Self::Success { filename, prediction },
            Err(e) => Self::Failure {
                filename,
                error: e.to_string(),
            },
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Success { filename, .. } | Self::Failure { filename, .. } => filename,
        }
    }

    pub fn prediction(&self) -> Option<&PredictionVector> {
        match self {
            Self::Success { prediction, .. } => Some(prediction),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Per-item results, index-aligned with the input sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchResult {
    pub results: Vec<ClassificationResult>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassificationResult> {
        self.results.iter()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }
}

impl IntoIterator for BatchResult {
    type Item = ClassificationResult;
    type IntoIter = std::vec::IntoIter<ClassificationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Where an item is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Normalizing,
    Adapted,
    Classifying,
    Succeeded,
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Normalizing => "normalizing",
            Self::Adapted => "adapted",
            Self::Classifying => "classifying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Normalizing,
            2 => Self::Adapted,
            3 => Self::Classifying,
            4 => Self::Succeeded,
            _ => Self::Failed,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
