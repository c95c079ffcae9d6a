//! Model lifecycle primitives for the Werkstatt KI estimation service.
//!
//! Everything in here is synchronous and free of network I/O: the training
//! cache and its reconciler, the tf-idf vectorizer and ridge regressor, the
//! trainer that bundles them into an immutable [`ModelSnapshot`], the
//! hot-swap [`ModelStore`], and the inference helpers that read from it.

pub mod cache;
pub mod inference;
pub mod persist;
pub mod record;
pub mod ridge;
pub mod snapshot;
pub mod store;
pub mod text;
pub mod train;
pub mod vectorizer;

pub use cache::{ReconcileOutcome, TrainingCache};
pub use inference::{
    minutes_to_hours, Estimate, EstimateSource, InferenceEngine, InferenceView, DEFAULT_MINUTES,
    MAX_MINUTES, MIN_MINUTES, SUGGESTION_LIMIT,
};
pub use persist::{PersistError, PersistedState, STATE_FORMAT};
pub use record::{Disqualified, FetchMeta, TrainingRecord, WireRecord, STATUS_COMPLETED};
pub use ridge::RidgeRegressor;
pub use snapshot::ModelSnapshot;
pub use store::ModelStore;
pub use text::normalize_text;
pub use train::{train, TrainError, MIN_TRAINING_SAMPLES};
pub use vectorizer::{cosine_similarity, SparseVector, TfidfVectorizer};
