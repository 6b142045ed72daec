//! Integration test: n-gram feature generation end-to-end

use kolosal_text_features::feature_engineering::{
    CountVectorizerConfig, FeatureGenerator, FeatureMetadata, TextNgramConfig,
    TextNgramFeatureGenerator, TextNgramState, NGRAM_TYPE_GROUP,
};
use kolosal_text_features::memory::MemoryEstimator;
use kolosal_text_features::KolosalError;
use polars::prelude::*;

/// Memory that always looks plentiful.
struct Plenty;

impl MemoryEstimator for Plenty {
    fn current_process_resident_bytes(&self) -> u64 {
        1 << 20
    }

    fn available_system_bytes(&self) -> u64 {
        1 << 40
    }
}

fn animals_df() -> DataFrame {
    df!(
        "id" => &[1i64, 2, 3],
        "text" => &["cat dog", "dog dog cat", "bird"],
    )
    .unwrap()
}

fn unigram_generator() -> TextNgramFeatureGenerator {
    let config = TextNgramConfig::default().with_vectorizer(CountVectorizerConfig::unigram());
    TextNgramFeatureGenerator::new(config)
        .unwrap()
        .with_memory_estimator(Box::new(Plenty))
}

fn int_column(df: &DataFrame, name: &str) -> Vec<i64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Int64)
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn row(df: &DataFrame, idx: usize) -> Vec<i64> {
    df.get_column_names()
        .iter()
        .map(|name| int_column(df, name)[idx])
        .collect()
}

#[test]
fn test_unigram_scenario() {
    let df = animals_df();
    let mut generator = unigram_generator();
    let (out, groups) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    let names: Vec<String> = out.get_column_names().iter().map(|s| s.to_string()).collect();
    assert_eq!(
        names,
        vec!["__nlp__.cat", "__nlp__.dog", "__nlp__.bird", "__nlp__._total_"]
    );
    assert_eq!(groups[NGRAM_TYPE_GROUP], names);

    assert_eq!(row(&out, 0), vec![1, 1, 0, 2]);
    assert_eq!(row(&out, 1), vec![1, 2, 0, 2]);
    assert_eq!(row(&out, 2), vec![0, 0, 1, 1]);
}

#[test]
fn test_output_dtypes() {
    let mut generator = unigram_generator();
    let (out, _) = generator
        .fit_transform(&animals_df(), &FeatureMetadata::with_text_features(["text"]))
        .unwrap();
    assert_eq!(out.column("__nlp__.cat").unwrap().dtype(), &DataType::Int64);
    assert_eq!(out.column("__nlp__._total_").unwrap().dtype(), &DataType::Int32);
}

#[test]
fn test_rows_preserved_with_duplicates() {
    let df = df!("text" => &["b a", "alpha beta", "alpha beta", "gamma", "alpha beta"]).unwrap();
    let mut generator = unigram_generator();
    let (out, _) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    assert_eq!(out.height(), 5, "row count should be preserved");
    assert_eq!(int_column(&out, "__nlp__.alpha"), vec![0, 1, 1, 0, 1]);
    assert_eq!(int_column(&out, "__nlp__.gamma"), vec![0, 0, 0, 1, 0]);
    assert_eq!(int_column(&out, "__nlp__._total_"), vec![0, 2, 2, 1, 2]);
}

#[test]
fn test_total_counts_present_terms() {
    let df = df!("text" => &["red red red green", "blue", "green blue red"]).unwrap();
    let mut generator = unigram_generator();
    let (out, _) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    let totals = int_column(&out, "__nlp__._total_");
    for (idx, total) in totals.iter().enumerate() {
        let present = out
            .get_column_names()
            .iter()
            .filter(|name| !name.ends_with("._total_"))
            .filter(|name| int_column(&out, name)[idx] > 0)
            .count() as i64;
        assert_eq!(*total, present);
    }
    for name in out.get_column_names() {
        assert!(name.starts_with("__nlp__."), "unexpected column {}", name);
    }
}

#[test]
fn test_multiple_text_columns_are_combined() {
    let df = df!(
        "title" => &["red car", "blue bike"],
        "body" => &["fast", "slow"],
    )
    .unwrap();
    let mut generator = unigram_generator();
    let (out, _) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["title", "body"]))
        .unwrap();

    assert_eq!(out.width(), 7);
    assert_eq!(int_column(&out, "__nlp__.fast"), vec![1, 0]);
    assert_eq!(generator.features_in(), ["title", "body"]);
}

#[test]
fn test_transform_reuses_vocabulary() {
    let mut generator = unigram_generator();
    generator
        .fit_transform(&animals_df(), &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    let new_df = df!("text" => &["dog fish", "cat cat", "fish"]).unwrap();
    let out = generator.transform(&new_df).unwrap();
    assert_eq!(out.width(), 4);
    assert!(out.column("__nlp__.fish").is_err(), "unseen terms must not appear");
    assert_eq!(row(&out, 0), vec![0, 1, 0, 1]);
    assert_eq!(row(&out, 1), vec![2, 0, 0, 1]);
    assert_eq!(row(&out, 2), vec![0, 0, 0, 0]);
}

#[test]
fn test_no_text_columns() {
    let df = df!("n" => &[1i64, 2, 3, 4]).unwrap();
    let mut generator = unigram_generator();
    let (out, groups) = generator.fit_transform(&df, &FeatureMetadata::new()).unwrap();

    assert_eq!(out.width(), 0);
    assert_eq!(out.height(), 4);
    assert_eq!(groups[NGRAM_TYPE_GROUP], Vec::<String>::new());

    let later = generator.transform(&df).unwrap();
    assert_eq!(later.height(), 4);
    assert_eq!(later.width(), 0);
}

#[test]
fn test_empty_vocabulary_drops_group() {
    let df = df!("text" => &["a", "b", "!"]).unwrap();
    let mut generator = unigram_generator();
    let (out, groups) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    assert_eq!(out.width(), 0);
    assert_eq!(out.height(), 3);
    assert!(groups[NGRAM_TYPE_GROUP].is_empty());
    assert!(generator.features_in().is_empty());
    assert!(generator.vectorizers().is_empty());

    let out = generator.transform(&df!("text" => &["cat dog"]).unwrap()).unwrap();
    assert_eq!(out.width(), 0);
    assert_eq!(out.height(), 1);
}

#[test]
fn test_transform_before_fit() {
    let generator = unigram_generator();
    assert!(matches!(
        generator.transform(&animals_df()),
        Err(KolosalError::ModelNotFitted)
    ));
}

#[test]
fn test_missing_text_column() {
    let mut generator = unigram_generator();
    let err = generator
        .fit_transform(&animals_df(), &FeatureMetadata::with_text_features(["missing"]))
        .unwrap_err();
    assert!(matches!(err, KolosalError::FeatureNotFound(_)));
}

#[test]
fn test_system_memory_estimator_preserves_rows() {
    let config = TextNgramConfig::default().with_vectorizer(CountVectorizerConfig::unigram());
    let mut generator = TextNgramFeatureGenerator::new(config).unwrap();
    let (out, _) = generator
        .fit_transform(&animals_df(), &FeatureMetadata::with_text_features(["text"]))
        .unwrap();
    assert_eq!(out.height(), 3);
    assert!(out.column("__nlp__._total_").is_ok());
}

#[test]
fn test_default_vectorizer_min_df() {
    let docs: Vec<String> = (0..40)
        .map(|i| format!("shared words here unique{}", i))
        .collect();
    let df = df!("text" => &docs).unwrap();
    let mut generator = TextNgramFeatureGenerator::with_defaults()
        .unwrap()
        .with_memory_estimator(Box::new(Plenty));
    let (out, _) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    // Only n-grams of the shared prefix reach min_df = 30.
    assert!(out.column("__nlp__.shared words here").is_ok());
    assert!(out.column("__nlp__.unique0").is_err());
    assert_eq!(out.width(), 7);
}

#[test]
fn test_fitted_state_survives_json() {
    let mut generator = unigram_generator();
    generator
        .fit_transform(&animals_df(), &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    serde_json::to_writer(file.as_file(), &generator.export_state().unwrap()).unwrap();
    let state: TextNgramState =
        serde_json::from_reader(std::fs::File::open(file.path()).unwrap()).unwrap();
    let restored = TextNgramFeatureGenerator::from_state(state)
        .unwrap()
        .with_memory_estimator(Box::new(Plenty));

    let new_df = df!("text" => &["dog fish", "cat cat", "fish"]).unwrap();
    let expected = generator.transform(&new_df).unwrap();
    let actual = restored.transform(&new_df).unwrap();
    assert!(actual.equals(&expected), "restored generator should transform identically");
    assert_eq!(row(&actual, 1), vec![2, 0, 0, 1]);
}

#[test]
fn test_total_named_term_does_not_collide() {
    let df = df!("text" => &["grand _total_ here", "cat"]).unwrap();
    let mut generator = unigram_generator();
    let (out, _) = generator
        .fit_transform(&df, &FeatureMetadata::with_text_features(["text"]))
        .unwrap();

    assert_eq!(out.width(), 4);
    assert_eq!(int_column(&out, "__nlp__._total_"), vec![2, 1]);
}
