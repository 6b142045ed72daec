//! Feature metadata and the generator lifecycle
//!
//! Generators read their input columns from `FeatureMetadata` at fit time
//! and report the output columns they produce per semantic type group.

use crate::error::{KolosalError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Special type group holding free-text input columns.
pub const TEXT_TYPE_GROUP: &str = "text";

/// Output type group -> produced column names.
pub type TypeGroups = BTreeMap<String, Vec<String>>;

/// Column type metadata produced by the upstream type classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub type_group_map_special: BTreeMap<String, Vec<String>>,
}

impl FeatureMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata tagging `columns` as free text.
    pub fn with_text_features<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut metadata = Self::default();
        metadata.type_group_map_special.insert(
            TEXT_TYPE_GROUP.to_string(),
            columns.into_iter().map(Into::into).collect(),
        );
        metadata
    }

    /// Columns tagged as free text, empty when the group is absent.
    pub fn text_features(&self) -> &[String] {
        self.type_group_map_special
            .get(TEXT_TYPE_GROUP)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Fit/transform lifecycle shared by feature generators.
pub trait FeatureGenerator {
    /// Learn state from `df` and return its features plus their type groups.
    fn fit_transform(
        &mut self,
        df: &DataFrame,
        metadata: &FeatureMetadata,
    ) -> Result<(DataFrame, TypeGroups)>;

    /// Generate features using fitted state only.
    fn transform(&self, df: &DataFrame) -> Result<DataFrame>;

    /// Input columns in use after fit.
    fn features_in(&self) -> &[String];

    fn is_fitted(&self) -> bool;
}

/// Text columns from `metadata`, verified to exist in `df`.
pub(crate) fn infer_text_features(df: &DataFrame, metadata: &FeatureMetadata) -> Result<Vec<String>> {
    metadata
        .text_features()
        .iter()
        .map(|name| {
            df.column(name)
                .map(|_| name.clone())
                .map_err(|_| KolosalError::FeatureNotFound(name.clone()))
        })
        .collect()
}

/// String values of column `name`, nulls as empty strings.
pub(crate) fn text_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .map_err(|_| KolosalError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

/// Frame of `columns`, or a zero-column frame of `height` rows.
pub(crate) fn frame_from_columns(columns: Vec<Column>, height: usize) -> Result<DataFrame> {
    if columns.is_empty() {
        // SAFETY: a frame with no columns trivially satisfies the equal-length and
        // unique-name invariants (polars 0.46 has no `empty_with_height`).
        return Ok(unsafe { DataFrame::new_no_checks(height, Vec::new()) });
    }
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_features() {
        let metadata = FeatureMetadata::with_text_features(["title", "body"]);
        assert_eq!(metadata.text_features(), ["title", "body"]);
        assert!(FeatureMetadata::new().text_features().is_empty());
    }

    #[test]
    fn test_infer_text_features_missing_column() {
        let df = df!("title" => &["a"]).unwrap();
        let metadata = FeatureMetadata::with_text_features(["title", "body"]);
        let err = infer_text_features(&df, &metadata).unwrap_err();
        assert!(matches!(err, KolosalError::FeatureNotFound(name) if name == "body"));
    }

    #[test]
    fn test_text_values_nulls_become_empty() {
        let df = df!("title" => &[Some("hello"), None]).unwrap();
        assert_eq!(text_values(&df, "title").unwrap(), vec!["hello", ""]);
    }

    #[test]
    fn test_text_values_casts_numbers() {
        let df = df!("code" => &[7i64, 42]).unwrap();
        assert_eq!(text_values(&df, "code").unwrap(), vec!["7", "42"]);
    }

    #[test]
    fn test_empty_frame_keeps_height() {
        let frame = frame_from_columns(Vec::new(), 4).unwrap();
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.width(), 0);
    }

    #[test]
    fn test_metadata_serde() {
        let metadata = FeatureMetadata::with_text_features(["title"]);
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"type_group_map_special":{"text":["title"]}}"#);
    }
}
