//! Statistical text descriptors
//!
//! For every text column: character and word counts, case/digit/special
//! character ratios, and a count plus ratio per configured symbol.

use super::config::TextSpecialConfig;
use super::metadata::{
    frame_from_columns, infer_text_features, text_values, FeatureGenerator, FeatureMetadata,
    TypeGroups,
};
use crate::error::{KolosalError, Result};
use polars::prelude::*;
use tracing::debug;

/// Type group reported for text-special output columns.
pub const SPECIAL_TYPE_GROUP: &str = "text_special";

fn without_spaces(text: &str) -> Vec<char> {
    text.chars().filter(|&c| c != ' ').collect()
}

fn ratio_of(text: &str, predicate: impl Fn(char) -> bool) -> f64 {
    let chars = without_spaces(text);
    if chars.is_empty() {
        return 0.0;
    }
    chars.iter().filter(|&&c| predicate(c)).count() as f64 / chars.len() as f64
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn capital_ratio(text: &str) -> f64 {
    ratio_of(text, char::is_uppercase)
}

pub fn lower_ratio(text: &str) -> f64 {
    ratio_of(text, char::is_lowercase)
}

/// Only `0`-`9` count as digits; fractions and numeral letters do not.
pub fn digit_ratio(text: &str) -> f64 {
    ratio_of(text, |c| c.is_ascii_digit())
}

/// Share of non-space characters that are not word characters.
pub fn special_ratio(text: &str) -> f64 {
    ratio_of(text, |c| !is_word_char(c))
}

pub fn symbol_count(text: &str, symbol: char) -> usize {
    text.chars().filter(|&c| c == symbol).count()
}

/// `symbol` occurrences over non-space characters, 0 for blank text.
pub fn symbol_ratio(text: &str, symbol: char) -> f64 {
    let non_space = without_spaces(text).len();
    if non_space == 0 {
        return 0.0;
    }
    symbol_count(text, symbol) as f64 / non_space as f64
}

/// Generates statistical descriptors from free-text columns
#[derive(Debug, Clone)]
pub struct TextSpecialFeatureGenerator {
    config: TextSpecialConfig,
    features_in: Vec<String>,
    is_fitted: bool,
}

impl TextSpecialFeatureGenerator {
    pub fn new(config: TextSpecialConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            features_in: Vec::new(),
            is_fitted: false,
        })
    }

    pub fn config(&self) -> &TextSpecialConfig {
        &self.config
    }

    /// Output column names for text column `feature`, in emission order.
    pub fn output_names(&self, feature: &str) -> Vec<String> {
        let mut names: Vec<String> = [
            "char_count",
            "word_count",
            "capital_ratio",
            "lower_ratio",
            "digit_ratio",
            "special_ratio",
        ]
        .iter()
        .map(|stat| format!("{}.{}", feature, stat))
        .collect();
        for symbol in &self.config.symbols {
            names.push(format!("{}.symbol_count.{}", feature, symbol));
            names.push(format!("{}.symbol_ratio.{}", feature, symbol));
        }
        names
    }

    fn feature_columns(&self, df: &DataFrame, feature: &str) -> Result<Vec<Column>> {
        let values = text_values(df, feature)?;
        let counts = |f: fn(&str) -> usize| -> Vec<i64> {
            values.iter().map(|v| f(v) as i64).collect()
        };
        let ratios = |f: fn(&str) -> f64| -> Vec<f64> { values.iter().map(|v| f(v)).collect() };

        let mut columns: Vec<Column> = vec![
            Series::new(format!("{}.char_count", feature).into(), counts(char_count)).into(),
            Series::new(format!("{}.word_count", feature).into(), counts(word_count)).into(),
            Series::new(format!("{}.capital_ratio", feature).into(), ratios(capital_ratio)).into(),
            Series::new(format!("{}.lower_ratio", feature).into(), ratios(lower_ratio)).into(),
            Series::new(format!("{}.digit_ratio", feature).into(), ratios(digit_ratio)).into(),
            Series::new(format!("{}.special_ratio", feature).into(), ratios(special_ratio)).into(),
        ];

        for &symbol in &self.config.symbols {
            let symbol_counts: Vec<i64> = values
                .iter()
                .map(|v| symbol_count(v, symbol) as i64)
                .collect();
            let symbol_ratios: Vec<f64> = values.iter().map(|v| symbol_ratio(v, symbol)).collect();
            columns.push(
                Series::new(format!("{}.symbol_count.{}", feature, symbol).into(), symbol_counts)
                    .into(),
            );
            columns.push(
                Series::new(format!("{}.symbol_ratio.{}", feature, symbol).into(), symbol_ratios)
                    .into(),
            );
        }

        Ok(columns)
    }

    fn generate(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut columns = Vec::new();
        for feature in &self.features_in {
            columns.extend(self.feature_columns(df, feature)?);
        }
        frame_from_columns(columns, df.height())
    }
}

impl Default for TextSpecialFeatureGenerator {
    fn default() -> Self {
        Self {
            config: TextSpecialConfig::default(),
            features_in: Vec::new(),
            is_fitted: false,
        }
    }
}

impl FeatureGenerator for TextSpecialFeatureGenerator {
    fn fit_transform(
        &mut self,
        df: &DataFrame,
        metadata: &FeatureMetadata,
    ) -> Result<(DataFrame, TypeGroups)> {
        self.features_in = infer_text_features(df, metadata)?;
        debug!(features = ?self.features_in, "Generating text special features");
        let output = self.generate(df)?;
        self.is_fitted = true;

        let names = output
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut type_groups = TypeGroups::new();
        type_groups.insert(SPECIAL_TYPE_GROUP.to_string(), names);
        Ok((output, type_groups))
    }

    fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(KolosalError::ModelNotFitted);
        }
        self.generate(df)
    }

    fn features_in(&self) -> &[String] {
        &self.features_in
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}
