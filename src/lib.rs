//! Kolosal text features - text feature generators for the AutoML pipeline
//!
//! This crate turns free-text columns into model-ready numeric features:
//! - n-gram count vectors whose vocabulary adapts to the memory available
//!   while fitting
//! - per-column text statistics (character/word counts, case, digit and
//!   symbol ratios)
//!
//! # Modules
//!
//! - [`feature_engineering`] - Generators, vectorizer, downsampling policy
//! - [`memory`] - Dense footprint prediction and process/host memory readings
//! - [`error`] - Crate-wide error type

// Core error handling
pub mod error;

// Feature generation
pub mod feature_engineering;

// Infrastructure
pub mod memory;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{KolosalError, Result};

    // Generators
    pub use crate::feature_engineering::{
        FeatureGenerator, FeatureMetadata, TextNgramConfig, TextNgramFeatureGenerator,
        TextNgramState, TextSpecialConfig, TextSpecialFeatureGenerator, TypeGroups,
    };

    // Vectorization and downsampling
    pub use crate::feature_engineering::{
        CountVectorizer, CountVectorizerConfig, DownsamplingPolicy, NgramMatrix, Vectorizer,
    };

    // Memory estimation
    pub use crate::memory::{MemoryEstimator, SystemMemoryEstimator};
}
