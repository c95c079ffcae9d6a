use std::cmp::Ordering;
use std::sync::Arc;


use crate::snapshot::ModelSnapshot;
use crate::store::ModelStore;
use crate::vectorizer::cosine_similarity;

/// Returned when no model is trained yet.
pub const DEFAULT_MINUTES: u32 = 60;
pub const MIN_MINUTES: u32 = 5;
pub const MAX_MINUTES: u32 = 480;
/// Upper bound on suggested similar tasks.
pub const SUGGESTION_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateSource {
    Model,
    Fallback,
}

impl EstimateSource {
    /// Wire label used by the HTTP API.
    pub fn as_str(self) -> &'static str {
        match self {
            EstimateSource::Model => "modell",
            EstimateSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub minutes: u32,
    pub source: EstimateSource,
}

impl Estimate {
    pub fn fallback() -> Self {
        Self {
            minutes: DEFAULT_MINUTES,
            source: EstimateSource::Fallback,
        }
    }

    /// Minutes as hours, rounded to two decimals.
    pub fn hours(&self) -> f64 {
        minutes_to_hours(self.minutes)
    }
}

pub fn minutes_to_hours(minutes: u32) -> f64 {
    (f64::from(minutes) / 60.0 * 100.0).round() / 100.0
}

fn clamp_minutes(raw: f64) -> Option<u32> {
    if !raw.is_finite() {
        return None;
    }
    let clamped = raw
        .round()
        .clamp(f64::from(MIN_MINUTES), f64::from(MAX_MINUTES));
    Some(clamped as u32)
}

/// Inference against one pinned snapshot. Every call made through the same
/// view sees the same model, even if the store is replaced meanwhile.
#[derive(Debug, Clone, Default)]
pub struct InferenceView {
    snapshot: Option<Arc<ModelSnapshot>>,
}

impl InferenceView {
    pub fn new(snapshot: Option<Arc<ModelSnapshot>>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> Option<&ModelSnapshot> {
        self.snapshot.as_deref()
    }

    pub fn sample_count(&self) -> usize {
        self.snapshot.as_ref().map_or(0, |s| s.sample_count())
    }

    pub fn predict_duration(&self, text: &str) -> Estimate {
        let Some(snapshot) = self.snapshot.as_deref() else {
            return Estimate::fallback();
        };
        let features = snapshot.vectorize(text);
        match clamp_minutes(snapshot.regressor().predict(&features)) {
            Some(minutes) => Estimate {
                minutes,
                source: EstimateSource::Model,
            },
            None => Estimate::fallback(),
        }
    }

    pub fn suggest_similar_tasks(&self, text: &str) -> Vec<String> {
        let Some(snapshot) = self.snapshot.as_deref() else {
            return Vec::new();
        };
        let query = snapshot.vectorize(text);
        if query.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f64)> = snapshot
            .corpus_vectors()
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, cosine_similarity(&query, vector)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        // stable sort keeps corpus order among ties
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored
            .into_iter()
            .take(SUGGESTION_LIMIT)
            .map(|(idx, _)| snapshot.task_corpus()[idx].clone())
            .collect()
    }
}

/// Store-backed entry point for request handlers.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    store: Arc<ModelStore>,
}

impl InferenceEngine {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }

    /// Pin the current snapshot for a batch of calls.
    pub fn view(&self) -> InferenceView {
        InferenceView::new(self.store.read())
    }

    pub fn predict_duration(&self, text: &str) -> Estimate {
        self.view().predict_duration(text)
    }

    pub fn suggest_similar_tasks(&self, text: &str) -> Vec<String> {
        self.view().suggest_similar_tasks(text)
    }
}
