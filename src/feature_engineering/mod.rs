//! Feature engineering module
//!
//! Text feature generators for the AutoML feature pipeline:
//! - `TextNgramFeatureGenerator` - memory-adaptive n-gram count features
//! - `TextSpecialFeatureGenerator` - character, word and symbol statistics
//!
//! plus the vectorizer, downsampling policy and metadata types they share.

pub mod config;
pub mod downsampling;
pub mod metadata;
pub mod text_ngram;
pub mod text_special;
pub mod vectorizer;

pub use config::{TextNgramConfig, TextSpecialConfig, DEFAULT_SYMBOLS};
pub use downsampling::{
    AbandonReason, DownsampleRun, DownsampleState, DownsamplingPolicy, FailureDecision,
};
pub use metadata::{FeatureGenerator, FeatureMetadata, TypeGroups, TEXT_TYPE_GROUP};
pub use text_ngram::{
    FittedGroupState, TextGroup, TextNgramFeatureGenerator, TextNgramState, COMBINED_GROUP_NAME,
    NGRAM_TYPE_GROUP, TEXT_SEPARATOR, TOTAL_COLUMN_SUFFIX,
};
pub use text_special::{TextSpecialFeatureGenerator, SPECIAL_TYPE_GROUP};
pub use vectorizer::{
    CountVectorizer, CountVectorizerConfig, NgramMatrix, TextTokenizer, Vectorizer,
    DEFAULT_TOKEN_PATTERN,
};
