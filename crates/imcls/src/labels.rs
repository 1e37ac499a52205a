//! # Class Labels
//!
//! Named label sets, and the [`LabelResolver`] that picks a model's labels
//! from checkpoint metadata.
//!
//! Fallback priority, highest first:
//! 1. labels supplied by the caller;
//! 2. the config's `default_classes`;
//! 3. [`RAF_BASIC_CLASSES`].

use crate::checkpoint::CheckpointMeta;

/// A well-known, named label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticLabelSet {
    /// Name of the label set.
    pub name: &'static str,

    /// Description of the label set.
    pub description: &'static str,

    /// Ordered class labels.
    pub classes: &'static [&'static str],
}

impl StaticLabelSet {
    /// Owned copies of the labels.
    pub fn to_vec(&self) -> Vec<String> {
        self.classes.iter().map(|c| c.to_string()).collect()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if the set has no labels.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// The seven RAF-DB basic expressions.
pub static RAF_BASIC_CLASSES: StaticLabelSet = StaticLabelSet {
    name: "raf_basic",
    description: "RAF-DB basic facial expressions",
    classes: &[
        "Surprise",
        "Fear",
        "Disgust",
        "Happiness",
        "Sadness",
        "Anger",
        "Neutral",
    ],
};

/// The seven FER2013 expressions.
pub static FER2013_CLASSES: StaticLabelSet = StaticLabelSet {
    name: "fer2013",
    description: "FER2013 facial expressions",
    classes: &[
        "Angry", "Disgust", "Fear", "Happy", "Sad", "Surprise", "Neutral",
    ],
};

/// Directory of named label sets.
pub static LABEL_SETS: &[&StaticLabelSet] = &[&RAF_BASIC_CLASSES, &FER2013_CLASSES];

/// Look up a named label set.
pub fn lookup_label_set(name: &str) -> Option<&'static StaticLabelSet> {
    LABEL_SETS.iter().copied().find(|set| set.name == name)
}

/// Map a fine label index onto the coarser taxonomy.
///
/// Indices ``0..=3`` are kept; higher indices shift down by 3.
pub fn coarse_label_index(index: usize) -> usize {
    if index <= 3 { index } else { index - 3 }
}

/// Resolves model labels from checkpoint metadata, with a fallback set.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelResolver {
    default_classes: Vec<String>,
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new(RAF_BASIC_CLASSES.to_vec())
    }
}

impl LabelResolver {
    /// Resolver with an explicit fallback set.
    pub fn new(default_classes: Vec<String>) -> Self {
        Self { default_classes }
    }

    /// Resolver with the first available fallback.
    ///
    /// `caller` wins over `configured`; [`RAF_BASIC_CLASSES`] is the last resort.
    pub fn with_fallbacks(
        caller: Option<Vec<String>>,
        configured: Option<Vec<String>>,
    ) -> Self {
        caller
            .or(configured)
            .map(Self::new)
            .unwrap_or_default()
    }

    /// The fallback labels.
    pub fn default_classes(&self) -> &[String] {
        &self.default_classes
    }

    /// Labels for a loaded checkpoint.
    ///
    /// Metadata ``CLASSES`` are adopted verbatim; otherwise the fallback set.
    pub fn resolve(
        &self,
        meta: Option<&CheckpointMeta>,
    ) -> Vec<String> {
        match meta.and_then(|meta| meta.classes.as_ref()) {
            Some(classes) => classes.clone(),
            None => {
                tracing::warn!(
                    classes = ?self.default_classes,
                    "checkpoint has no CLASSES metadata; using default labels"
                );
                self.default_classes.clone()
            }
        }
    }
}
