//! # Classification Results
//!
//! A [`ClassificationResult`] is one [`ClassScore`] per label, in label order,
//! followed by a [`Prediction`] summary. Scores are relative to the top score:
//! ``score[i] / max(score)``; they are not probabilities.
//!
//! The result serializes as an ordered sequence:
//! ``[{"class": .., "score": ..}, ..., {"pred_class": .., "pred_score": ..}]``.

use crate::errors::{InferError, InferResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A per-class relative score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    /// Class label.
    pub class: String,

    /// Raw score divided by the top raw score.
    pub score: f32,
}

/// The top-scoring class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class label of the top score.
    pub pred_class: String,

    /// The top raw score.
    pub pred_score: f32,
}

/// One element of a serialized [`ClassificationResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultEntry {
    /// A per-class score.
    Class(ClassScore),

    /// The trailing summary.
    Prediction(Prediction),
}

/// Per-class scores plus the top prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Per-class relative scores, in label order.
    pub scores: Vec<ClassScore>,

    /// The top prediction.
    pub prediction: Prediction,
}

impl ClassificationResult {
    /// The predicted class label.
    pub fn pred_class(&self) -> &str {
        &self.prediction.pred_class
    }

    /// The top raw score.
    pub fn pred_score(&self) -> f32 {
        self.prediction.pred_score
    }

    /// The result as an ordered entry sequence.
    pub fn entries(&self) -> Vec<ResultEntry> {
        self.scores
            .iter()
            .cloned()
            .map(ResultEntry::Class)
            .chain(std::iter::once(ResultEntry::Prediction(
                self.prediction.clone(),
            )))
            .collect()
    }
}

impl Serialize for ClassificationResult {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries())
    }
}

impl<'de> Deserialize<'de> for ClassificationResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut entries = Vec::<ResultEntry>::deserialize(deserializer)?;

        let prediction = match entries.pop() {
            Some(ResultEntry::Prediction(prediction)) => prediction,
            _ => return Err(D::Error::custom("result must end with a prediction")),
        };
        let scores = entries
            .into_iter()
            .map(|entry| match entry {
                ResultEntry::Class(score) => Ok(score),
                ResultEntry::Prediction(_) => {
                    Err(D::Error::custom("prediction must be the last entry"))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { scores, prediction })
    }
}

/// Normalize raw `scores` against `classes`.
///
/// The top score is the first maximum; each score is divided by it.
///
/// # Errors
///
/// - [`InferError::EmptyScores`] if `scores` is empty.
/// - [`InferError::ClassIndex`] if a score index has no label.
pub fn normalize_scores<S: AsRef<str>>(
    classes: &[S],
    scores: &[f32],
) -> InferResult<ClassificationResult> {
    let (pred_label, pred_score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, score)| match best {
            Some((_, top)) if score <= top => best,
            _ => Some((idx, score)),
        })
        .ok_or(InferError::EmptyScores)?;

    let label = |index: usize| {
        classes
            .get(index)
            .map(|c| c.as_ref().to_string())
            .ok_or(InferError::ClassIndex {
                index,
                num_classes: classes.len(),
            })
    };

    let scores = scores
        .iter()
        .enumerate()
        .map(|(idx, score)| {
            Ok(ClassScore {
                class: label(idx)?,
                score: score / pred_score,
            })
        })
        .collect::<InferResult<Vec<_>>>()?;

    Ok(ClassificationResult {
        scores,
        prediction: Prediction {
            pred_class: label(pred_label)?,
            pred_score,
        },
    })
}
