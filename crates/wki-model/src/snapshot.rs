use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ridge::RidgeRegressor;
use crate::text::normalize_text;
use crate::vectorizer::{SparseVector, TfidfVectorizer};

/// Everything one training run produced. Built in one piece by
/// [`crate::train`] and never mutated afterwards; the store hands it out as
/// `Arc<ModelSnapshot>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    vectorizer: TfidfVectorizer,
    regressor: RidgeRegressor,
    task_corpus: Vec<String>,
    corpus_vectors: Vec<SparseVector>,
    trained_at: DateTime<Utc>,
    sample_count: usize,
}

impl ModelSnapshot {
    pub(crate) fn new(
        vectorizer: TfidfVectorizer,
        regressor: RidgeRegressor,
        task_corpus: Vec<String>,
        corpus_vectors: Vec<SparseVector>,
        trained_at: DateTime<Utc>,
        sample_count: usize,
    ) -> Self {
        debug_assert_eq!(task_corpus.len(), corpus_vectors.len());
        Self {
            vectorizer,
            regressor,
            task_corpus,
            corpus_vectors,
            trained_at,
            sample_count,
        }
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn regressor(&self) -> &RidgeRegressor {
        &self.regressor
    }

    /// Distinct task texts in first-seen order.
    pub fn task_corpus(&self) -> &[String] {
        &self.task_corpus
    }

    pub fn corpus_vectors(&self) -> &[SparseVector] {
        &self.corpus_vectors
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Normalize and vectorize free text against this snapshot's vocabulary.
    pub fn vectorize(&self, text: &str) -> SparseVector {
        self.vectorizer.transform(&normalize_text(text))
    }
}
