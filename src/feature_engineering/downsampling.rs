//! Vocabulary downsampling policy for memory-bounded n-gram generation
//!
//! The policy is pure: it never measures memory itself. The n-gram generator
//! feeds it predicted usage ratios and failure counts and acts on its
//! decisions, which keeps every guard testable in isolation.

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};

/// Progress of one fit-time generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownsampleState {
    /// Vocabularies not yet learned.
    Initial,
    /// Vocabularies learned; next step is transform and memory check.
    Transformed,
    /// A memory failure occurred; retrying with a fixed downsample ratio.
    OomRetry,
    /// Memory could not be satisfied; n-gram features are being dropped.
    Abandoned,
    Done,
}

/// Guard that ended n-gram generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbandonReason {
    /// A vocabulary is already at or below the floor; shrinking further is pointless.
    VocabularyFloor { vocabulary_size: usize, floor: usize },
    /// Too many memory failures.
    FailureCeiling { failures: usize, max_failures: usize },
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::VocabularyFloor { vocabulary_size, floor } => write!(
                f,
                "vocabulary size {} is at or below the floor of {}",
                vocabulary_size, floor
            ),
            AbandonReason::FailureCeiling { failures, max_failures } => write!(
                f,
                "{} memory failures reached the limit of {}",
                failures, max_failures
            ),
        }
    }
}

/// What to do after a memory failure during fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FailureDecision {
    Abandon(AbandonReason),
    Retry { downsample_ratio: f64 },
}

/// Memory policy for fit-time n-gram generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownsamplingPolicy {
    /// Fraction of available memory the dense n-gram output may occupy
    pub max_memory_ratio: f64,
    /// Fixed ratio applied on every retry after a memory failure
    pub retry_downsample_ratio: f64,
    /// Vocabularies this small are never shrunk further
    pub vocabulary_floor: usize,
    /// Memory failures tolerated before n-grams are dropped
    pub max_failures: usize,
}

impl Default for DownsamplingPolicy {
    fn default() -> Self {
        Self {
            max_memory_ratio: 0.15,
            retry_downsample_ratio: 0.25,
            vocabulary_floor: 50,
            max_failures: 3,
        }
    }
}

impl DownsamplingPolicy {
    pub fn new(max_memory_ratio: f64) -> Self {
        Self {
            max_memory_ratio,
            ..Self::default()
        }
    }

    /// Ratio to shrink by when the prediction exceeds the budget, `None` when
    /// it fits.
    pub fn initial_downsample_ratio(&self, predicted_usage_ratio: f64) -> Option<f64> {
        if predicted_usage_ratio > self.max_memory_ratio {
            Some(self.max_memory_ratio / predicted_usage_ratio)
        } else {
            None
        }
    }

    /// Downsample ratios must lie strictly inside (0, 1).
    pub fn validate_ratio(downsample_ratio: f64) -> Result<()> {
        if downsample_ratio > 0.0 && downsample_ratio < 1.0 {
            Ok(())
        } else {
            Err(KolosalError::InvalidParameter {
                name: "downsample_ratio".to_string(),
                value: downsample_ratio.to_string(),
                reason: "must be >0 and <1".to_string(),
            })
        }
    }

    /// `floor(vocabulary_size * downsample_ratio)`.
    pub fn downsampled_size(vocabulary_size: usize, downsample_ratio: f64) -> usize {
        (vocabulary_size as f64 * downsample_ratio).floor() as usize
    }

    /// Vocabulary-floor guard.
    pub fn vocabulary_floor_reached(&self, vocabulary_sizes: &[usize]) -> Option<AbandonReason> {
        vocabulary_sizes
            .iter()
            .find(|&&size| size <= self.vocabulary_floor)
            .map(|&size| AbandonReason::VocabularyFloor {
                vocabulary_size: size,
                floor: self.vocabulary_floor,
            })
    }

    /// Failure-ceiling guard.
    pub fn failure_ceiling_reached(&self, failures: usize) -> Option<AbandonReason> {
        (failures >= self.max_failures).then_some(AbandonReason::FailureCeiling {
            failures,
            max_failures: self.max_failures,
        })
    }

    /// Decide after the `failures`-th memory failure. Guards run in fixed
    /// order: vocabulary floor, then failure ceiling, else retry.
    pub fn on_failure(&self, failures: usize, vocabulary_sizes: &[usize]) -> FailureDecision {
        if let Some(reason) = self.vocabulary_floor_reached(vocabulary_sizes) {
            return FailureDecision::Abandon(reason);
        }
        if let Some(reason) = self.failure_ceiling_reached(failures) {
            return FailureDecision::Abandon(reason);
        }
        FailureDecision::Retry {
            downsample_ratio: self.retry_downsample_ratio,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_memory_ratio > 0.0 && self.max_memory_ratio.is_finite()) {
            return Err(KolosalError::InvalidParameter {
                name: "max_memory_ratio".to_string(),
                value: self.max_memory_ratio.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
        Self::validate_ratio(self.retry_downsample_ratio).map_err(|_| {
            KolosalError::InvalidParameter {
                name: "retry_downsample_ratio".to_string(),
                value: self.retry_downsample_ratio.to_string(),
                reason: "must be >0 and <1".to_string(),
            }
        })?;
        if self.max_failures == 0 {
            return Err(KolosalError::InvalidParameter {
                name: "max_failures".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Mutable bookkeeping for one fit call.
#[derive(Debug, Clone, PartialEq)]
pub struct DownsampleRun {
    pub state: DownsampleState,
    pub downsample_ratio: Option<f64>,
    pub failures: usize,
}

impl DownsampleRun {
    pub fn new() -> Self {
        Self {
            state: DownsampleState::Initial,
            downsample_ratio: None,
            failures: 0,
        }
    }
}

impl Default for DownsampleRun {
    fn default() -> Self {
        Self::new()
    }
}
