//! Integration test: text statistics feature generation

use kolosal_text_features::feature_engineering::{
    FeatureGenerator, FeatureMetadata, TextSpecialConfig, TextSpecialFeatureGenerator,
    SPECIAL_TYPE_GROUP,
};
use polars::prelude::*;

fn sample_df() -> DataFrame {
    df!(
        "review" => &[Some("AbC 123!"), Some("hello world"), None],
        "score" => &[1.0, 2.0, 3.0],
    )
    .unwrap()
}

fn f64_column(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn i64_column(df: &DataFrame, name: &str) -> Vec<i64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[test]
fn test_text_special_fit_transform() {
    let config = TextSpecialConfig::new().with_symbols(['!', ' ']);
    let mut generator = TextSpecialFeatureGenerator::new(config).unwrap();
    let (out, groups) = generator
        .fit_transform(&sample_df(), &FeatureMetadata::with_text_features(["review"]))
        .unwrap();

    assert_eq!(out.height(), 3, "row count should be preserved");
    assert_eq!(out.width(), 10);
    assert_eq!(groups[SPECIAL_TYPE_GROUP].len(), 10);

    assert_eq!(i64_column(&out, "review.char_count"), vec![8, 11, 0]);
    assert_eq!(i64_column(&out, "review.word_count"), vec![2, 2, 0]);
    assert_eq!(i64_column(&out, "review.symbol_count.!"), vec![1, 0, 0]);
    assert_eq!(i64_column(&out, "review.symbol_count. "), vec![1, 1, 0]);

    let capital = f64_column(&out, "review.capital_ratio");
    assert!((capital[0] - 2.0 / 7.0).abs() < 1e-12);
    assert_eq!(capital[1], 0.0);
    assert_eq!(capital[2], 0.0);

    let lower = f64_column(&out, "review.lower_ratio");
    assert!((lower[1] - 1.0).abs() < 1e-12);

    let bang = f64_column(&out, "review.symbol_ratio.!");
    assert!((bang[0] - 1.0 / 7.0).abs() < 1e-12);
    assert_eq!(bang[2], 0.0);
}

#[test]
fn test_text_special_transform_new_rows() {
    let mut generator = TextSpecialFeatureGenerator::default();
    generator
        .fit_transform(&sample_df(), &FeatureMetadata::with_text_features(["review"]))
        .unwrap();

    let new_df = df!("review" => &["99?"]).unwrap();
    let out = generator.transform(&new_df).unwrap();
    assert_eq!(out.height(), 1);
    assert_eq!(i64_column(&out, "review.symbol_count.?"), vec![1]);
    let digits = f64_column(&out, "review.digit_ratio");
    assert!((digits[0] - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_text_special_from_json_config() {
    let config = TextSpecialConfig::from_json_str(r#"{"symbols": ["@"]}"#).unwrap();
    let mut generator = TextSpecialFeatureGenerator::new(config).unwrap();
    let df = df!("handle" => &["@a @b"]).unwrap();
    let (out, _) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["handle"]))
        .unwrap();
    assert_eq!(i64_column(&out, "handle.symbol_count.@"), vec![2]);
    assert_eq!(out.width(), 8);
}
