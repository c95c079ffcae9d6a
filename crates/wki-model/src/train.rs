use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::TrainingCache;
use crate::ridge::RidgeRegressor;
use crate::snapshot::ModelSnapshot;
use crate::vectorizer::TfidfVectorizer;

/// Fewer cached records than this and training is skipped.
pub const MIN_TRAINING_SAMPLES: usize = 3;

/// L2 penalty for the duration regressor.
pub const RIDGE_ALPHA: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainError {
    #[error("insufficient training data: {found} samples, need {required}")]
    InsufficientData { found: usize, required: usize },
    #[error("feature rows ({rows}) and targets ({targets}) differ in length")]
    ShapeMismatch { rows: usize, targets: usize },
    #[error("regression produced non-finite coefficients")]
    NonFinite,
}

impl TrainError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, TrainError::InsufficientData { .. })
    }
}

/// Rebuild the vectorizer, regressor and suggestion corpus from the cache.
pub fn train(cache: &TrainingCache) -> Result<ModelSnapshot, TrainError> {
    train_at(cache, Utc::now())
}

pub fn train_at(
    cache: &TrainingCache,
    trained_at: DateTime<Utc>,
) -> Result<ModelSnapshot, TrainError> {
    if cache.len() < MIN_TRAINING_SAMPLES {
        return Err(TrainError::InsufficientData {
            found: cache.len(),
            required: MIN_TRAINING_SAMPLES,
        });
    }

    let (texts, targets): (Vec<&str>, Vec<f64>) = cache
        .records()
        .map(|rec| (rec.text.as_str(), rec.minutes))
        .unzip();

    let (vectorizer, rows) = TfidfVectorizer::fit_transform(&texts);
    let regressor = RidgeRegressor::fit(&rows, &targets, vectorizer.dim(), RIDGE_ALPHA)?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut task_corpus = Vec::new();
    let mut corpus_vectors = Vec::new();
    for (text, row) in texts.iter().zip(&rows) {
        if seen.insert(*text) {
            task_corpus.push((*text).to_string());
            corpus_vectors.push(row.clone());
        }
    }

    debug!(
        target: "wki::training",
        samples = texts.len(),
        tasks = task_corpus.len(),
        features = vectorizer.dim(),
        "model fitted"
    );

    Ok(ModelSnapshot::new(
        vectorizer,
        regressor,
        task_corpus,
        corpus_vectors,
        trained_at,
        texts.len(),
    ))
}
