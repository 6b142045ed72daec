//! Text feature generator configuration

use super::downsampling::DownsamplingPolicy;
use super::vectorizer::CountVectorizerConfig;
use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Symbols counted by the text-special generator by default.
pub const DEFAULT_SYMBOLS: [char; 16] = [
    '!', '?', '@', '%', '$', '*', '&', '#', '^', '.', ':', ' ', '/', ';', '-', '=',
];

/// Configuration for the n-gram feature generator
///
/// The memory policy fields sit at the top level of the serialized form,
/// next to `vectorizer`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextNgramConfig {
    /// Memory budget, retry ratio and abandonment guards
    #[serde(flatten)]
    pub downsampling: DownsamplingPolicy,

    /// Settings for the default count vectorizer
    pub vectorizer: CountVectorizerConfig,
}

impl TextNgramConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the memory budget
    pub fn with_max_memory_ratio(mut self, ratio: f64) -> Self {
        self.downsampling.max_memory_ratio = ratio;
        self
    }

    /// Builder method to set the vectorizer settings
    pub fn with_vectorizer(mut self, vectorizer: CountVectorizerConfig) -> Self {
        self.vectorizer = vectorizer;
        self
    }

    /// Builder method to set the retry limit
    pub fn with_max_failures(mut self, max_failures: usize) -> Self {
        self.downsampling.max_failures = max_failures;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.downsampling.validate()?;
        self.vectorizer.validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Configuration for the text-special feature generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSpecialConfig {
    /// Symbols to generate count and ratio features for
    pub symbols: Vec<char>,
}

impl Default for TextSpecialConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.to_vec(),
        }
    }
}

impl TextSpecialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols<I: IntoIterator<Item = char>>(mut self, symbols: I) -> Self {
        self.symbols = symbols.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for symbol in &self.symbols {
            if !seen.insert(symbol) {
                return Err(KolosalError::ConfigError(format!(
                    "duplicate symbol {:?}",
                    symbol
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
