//! Memory-adaptive text n-gram features
//!
//! All text columns are joined row-wise into one synthetic document per row
//! (the `__nlp__` group). A vectorizer is fitted on the distinct documents and
//! every row is then turned into one count column per vocabulary term plus a
//! `_total_` column counting the terms present in that row.
//!
//! While fitting, the dense footprint is predicted before it is materialized.
//! Vocabularies are shrunk when the prediction exceeds the memory budget, and
//! the whole feature family is dropped when memory failures keep recurring.
//! After fit the vocabulary is fixed and any memory failure is fatal.
//!
//! Fitted state is exported as a plain serde value (`TextNgramState`) so an
//! outer persistence layer can store and restore a fitted generator.

use super::config::TextNgramConfig;
use super::downsampling::{DownsampleRun, DownsampleState, DownsamplingPolicy, FailureDecision};
use super::metadata::{
    frame_from_columns, infer_text_features, text_values, FeatureGenerator, FeatureMetadata,
    TypeGroups,
};
use super::vectorizer::{CountVectorizer, NgramMatrix, Vectorizer};
use crate::error::{KolosalError, Result};
use crate::memory::{MemoryEstimator, SystemMemoryEstimator};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Type group reported for n-gram output columns.
pub const NGRAM_TYPE_GROUP: &str = "text_ngram";

/// Name of the group that combines every text column.
pub const COMBINED_GROUP_NAME: &str = "__nlp__";

/// Joins the text columns of a row into one document.
pub const TEXT_SEPARATOR: &str = ". ";

/// Suffix of the per-row present-term count column.
pub const TOTAL_COLUMN_SUFFIX: &str = "_total_";

/// A named logical text feature built from one or more source columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextGroup {
    pub name: String,
    pub columns: Vec<String>,
}

impl TextGroup {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// The `__nlp__` group over all `columns`.
    pub fn combined(columns: Vec<String>) -> Self {
        Self::new(COMBINED_GROUP_NAME, columns)
    }

    /// One document per row, in row order.
    pub fn documents(&self, df: &DataFrame) -> Result<Vec<String>> {
        let values = self
            .columns
            .iter()
            .map(|name| text_values(df, name))
            .collect::<Result<Vec<_>>>()?;

        Ok((0..df.height())
            .map(|row| {
                values
                    .iter()
                    .map(|column| column[row].as_str())
                    .collect::<Vec<_>>()
                    .join(TEXT_SEPARATOR)
            })
            .collect())
    }

    /// Distinct documents in first-seen order, used only to fit the vocabulary.
    pub fn unique_documents(&self, df: &DataFrame) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        Ok(self
            .documents(df)?
            .into_iter()
            .filter(|doc| seen.insert(doc.clone()))
            .collect())
    }

    pub fn column_name(&self, term: &str) -> String {
        format!("{}.{}", self.name, term)
    }

    pub fn total_column_name(&self) -> String {
        self.column_name(TOTAL_COLUMN_SUFFIX)
    }
}

#[derive(Debug)]
struct FittedTextGroup {
    group: TextGroup,
    vectorizer: Box<dyn Vectorizer>,
}

/// Fitted vocabulary of one surviving text group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedGroupState {
    pub group: TextGroup,
    pub vectorizer: CountVectorizer,
}

/// Everything a fitted `TextNgramFeatureGenerator` needs to transform.
///
/// An abandoned fit exports with no groups and empty `features_in`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextNgramState {
    pub config: TextNgramConfig,
    pub features_in: Vec<String>,
    pub groups: Vec<FittedGroupState>,
}

/// Generates n-gram count features from free-text columns
pub struct TextNgramFeatureGenerator {
    config: TextNgramConfig,
    vectorizer_template: Box<dyn Vectorizer>,
    memory: Box<dyn MemoryEstimator>,
    features_in: Vec<String>,
    groups: Vec<FittedTextGroup>,
    is_fitted: bool,
}

impl TextNgramFeatureGenerator {
    /// Create a generator using a `CountVectorizer` built from `config`.
    pub fn new(config: TextNgramConfig) -> Result<Self> {
        config.validate()?;
        let vectorizer = CountVectorizer::new(config.vectorizer.clone())?;
        Ok(Self {
            config,
            vectorizer_template: Box::new(vectorizer),
            memory: Box::new(SystemMemoryEstimator::new()),
            features_in: Vec::new(),
            groups: Vec::new(),
            is_fitted: false,
        })
    }

    /// Create a generator with the AutoML default settings.
    pub fn with_defaults() -> Result<Self> {
        Self::new(TextNgramConfig::default())
    }

    /// Use `vectorizer` as the unfitted template cloned for every text group.
    pub fn with_vectorizer(mut self, vectorizer: Box<dyn Vectorizer>) -> Self {
        self.vectorizer_template = vectorizer;
        self
    }

    pub fn with_memory_estimator(mut self, memory: Box<dyn MemoryEstimator>) -> Self {
        self.memory = memory;
        self
    }

    pub fn config(&self) -> &TextNgramConfig {
        &self.config
    }

    /// Text groups that survived fitting.
    pub fn text_groups(&self) -> Vec<&TextGroup> {
        self.groups.iter().map(|fitted| &fitted.group).collect()
    }

    /// Fitted vectorizers, one per surviving text group.
    pub fn vectorizers(&self) -> Vec<&dyn Vectorizer> {
        self.groups
            .iter()
            .map(|fitted| fitted.vectorizer.as_ref())
            .collect()
    }

    pub fn vocabulary_sizes(&self) -> Vec<usize> {
        self.groups
            .iter()
            .map(|fitted| fitted.vectorizer.vocabulary_size())
            .collect()
    }

    /// Snapshot of the fitted state. Only groups backed by a
    /// `CountVectorizer` can be exported.
    pub fn export_state(&self) -> Result<TextNgramState> {
        if !self.is_fitted {
            return Err(KolosalError::ModelNotFitted);
        }

        let groups = self
            .groups
            .iter()
            .map(|fitted| {
                let vectorizer = fitted
                    .vectorizer
                    .as_any()
                    .downcast_ref::<CountVectorizer>()
                    .ok_or_else(|| {
                        KolosalError::SerializationError(format!(
                            "vectorizer of text group '{}' is not a CountVectorizer",
                            fitted.group.name
                        ))
                    })?;
                Ok(FittedGroupState {
                    group: fitted.group.clone(),
                    vectorizer: vectorizer.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TextNgramState {
            config: self.config.clone(),
            features_in: self.features_in.clone(),
            groups,
        })
    }

    /// Rebuild a fitted generator from `state`. Memory readings come from the
    /// system until `with_memory_estimator` replaces the estimator.
    pub fn from_state(state: TextNgramState) -> Result<Self> {
        let mut generator = Self::new(state.config)?;
        for fitted in state.groups {
            if !fitted.vectorizer.is_fitted() {
                return Err(KolosalError::ValidationError(format!(
                    "vectorizer of text group '{}' is not fitted",
                    fitted.group.name
                )));
            }
            generator.groups.push(FittedTextGroup {
                group: fitted.group,
                vectorizer: Box::new(fitted.vectorizer),
            });
        }
        generator.features_in = state.features_in;
        generator.is_fitted = true;
        Ok(generator)
    }

    /// Drive the fit-time state machine until it settles.
    fn fit_with_downsampling(&mut self, df: &DataFrame) -> Result<DataFrame> {
        let mut run = DownsampleRun::new();
        let mut output = None;

        loop {
            run.state = match run.state {
                DownsampleState::Initial => {
                    self.fit_vocabularies(df)?;
                    if self.groups.is_empty() {
                        DownsampleState::Done
                    } else {
                        DownsampleState::Transformed
                    }
                }
                DownsampleState::Transformed | DownsampleState::OomRetry => {
                    match self.generate_while_fitting(df, &mut run.downsample_ratio) {
                        Ok(frame) => {
                            output = Some(frame);
                            DownsampleState::Done
                        }
                        Err(err) if counts_as_fit_failure(&err) => {
                            run.failures += 1;
                            let policy = &self.config.downsampling;
                            match policy.on_failure(run.failures, &self.vocabulary_sizes()) {
                                FailureDecision::Abandon(reason) => {
                                    warn!(
                                        reason = %reason,
                                        "ngrams generation ran out of memory, removing ngram features. \
                                         To use ngrams for this problem, increase the memory allocation"
                                    );
                                    debug!(error = %err, "Last ngram generation failure");
                                    DownsampleState::Abandoned
                                }
                                FailureDecision::Retry { downsample_ratio } => {
                                    warn!(
                                        failures = run.failures,
                                        downsample_ratio,
                                        "ngrams generation ran out of memory, reducing ngram feature count. \
                                         To make full use of ngrams, increase the memory allocation"
                                    );
                                    debug!(error = %err, "Ngram generation failure");
                                    run.downsample_ratio = Some(downsample_ratio);
                                    DownsampleState::OomRetry
                                }
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
                DownsampleState::Abandoned => {
                    self.groups.clear();
                    self.features_in.clear();
                    DownsampleState::Done
                }
                DownsampleState::Done => break,
            };
        }

        match output {
            Some(frame) => Ok(frame),
            None => frame_from_columns(Vec::new(), df.height()),
        }
    }

    /// Fit one vectorizer per text group on its distinct documents. Groups
    /// whose vocabulary comes out empty are dropped along with their columns.
    fn fit_vocabularies(&mut self, df: &DataFrame) -> Result<()> {
        if self.features_in.is_empty() {
            return Ok(());
        }

        info!(features = ?self.features_in, "Fitting vectorizer for text features");
        let candidates = vec![TextGroup::combined(self.features_in.clone())];
        let mut removed: HashSet<String> = HashSet::new();

        for group in candidates {
            let documents = group.unique_documents(df)?;
            let mut vectorizer = self.vectorizer_template.box_clone();
            match vectorizer.fit(&documents) {
                Ok(()) => {
                    info!(
                        group = %group.name,
                        n_documents = documents.len(),
                        vocabulary_size = vectorizer.vocabulary_size(),
                        "Vectorizer fit"
                    );
                    self.groups.push(FittedTextGroup { group, vectorizer });
                }
                Err(KolosalError::EmptyVocabulary(reason)) => {
                    warn!(group = %group.name, reason = %reason, "Removing 'text_ngram' features");
                    removed.extend(group.columns);
                }
                Err(err) => return Err(err),
            }
        }

        self.features_in.retain(|feature| !removed.contains(feature));
        Ok(())
    }

    /// Transform every group, shrinking vocabularies to fit the memory budget.
    fn generate_while_fitting(
        &mut self,
        df: &DataFrame,
        downsample_ratio: &mut Option<f64>,
    ) -> Result<DataFrame> {
        let height = df.height();
        let policy = &self.config.downsampling;
        let mut columns = Vec::new();

        for fitted in self.groups.iter_mut() {
            let documents = fitted.group.documents(df)?;
            let mut matrix = fitted.vectorizer.transform(&documents)?;

            let usage = self.memory.predicted_usage_ratio(height, matrix.cols());
            debug!(
                group = %fitted.group.name,
                predicted_usage_ratio = usage,
                max_memory_ratio = policy.max_memory_ratio,
                "Predicted ngram memory usage"
            );

            if downsample_ratio.is_none() {
                if let Some(ratio) = policy.initial_downsample_ratio(usage) {
                    warn!(
                        predicted_usage_ratio = usage,
                        "Due to memory constraints, ngram feature count is being reduced. \
                         Allocate more memory to maximize model quality"
                    );
                    *downsample_ratio = Some(ratio);
                }
            }

            if let Some(ratio) = *downsample_ratio {
                DownsamplingPolicy::validate_ratio(ratio)?;
                let vocabulary_size = fitted.vectorizer.vocabulary_size();
                let keep = DownsamplingPolicy::downsampled_size(vocabulary_size, ratio);
                info!(
                    group = %fitted.group.name,
                    from = vocabulary_size,
                    to = keep,
                    "Reducing vectorizer vocabulary size to avoid running out of memory"
                );
                if keep == 0 {
                    return Err(KolosalError::EmptyVocabulary(format!(
                        "downsampling {} terms by {} leaves no terms",
                        vocabulary_size, ratio
                    )));
                }
                fitted
                    .vectorizer
                    .shrink_vocabulary(&matrix.term_frequencies(), keep)?;
                matrix = fitted.vectorizer.transform(&documents)?;
            }

            columns.extend(group_columns(
                &fitted.group,
                fitted.vectorizer.as_ref(),
                &matrix,
            )?);
        }

        frame_from_columns(columns, height)
    }

    fn generate(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut columns = Vec::new();
        for fitted in &self.groups {
            let documents = fitted.group.documents(df)?;
            let matrix = fitted.vectorizer.transform(&documents)?;
            columns.extend(group_columns(
                &fitted.group,
                fitted.vectorizer.as_ref(),
                &matrix,
            )?);
        }
        frame_from_columns(columns, df.height())
    }
}

impl std::fmt::Debug for TextNgramFeatureGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextNgramFeatureGenerator")
            .field("config", &self.config)
            .field("features_in", &self.features_in)
            .field("groups", &self.groups)
            .field("is_fitted", &self.is_fitted)
            .finish()
    }
}

/// Memory failures and vocabularies shrunk to nothing both go through the
/// retry/abandon policy while fitting.
fn counts_as_fit_failure(err: &KolosalError) -> bool {
    err.is_memory_error() || matches!(err, KolosalError::EmptyVocabulary(_))
}

/// Dense term columns named `{group}.{term}` followed by `{group}._total_`.
///
/// A term spelled like the total column is left out so the total keeps its
/// name. `_total_` counts the emitted term columns present in each row.
fn group_columns(
    group: &TextGroup,
    vectorizer: &dyn Vectorizer,
    matrix: &NgramMatrix,
) -> Result<Vec<Column>> {
    let names = vectorizer.feature_names();
    if names.len() != matrix.cols() {
        return Err(KolosalError::ShapeError {
            expected: format!("{} term columns", names.len()),
            actual: matrix.cols().to_string(),
        });
    }

    let selected: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, term)| term.as_str() != TOTAL_COLUMN_SUFFIX)
        .map(|(idx, _)| idx)
        .collect();

    let dense = matrix.try_dense_columns(&selected)?;
    let totals = matrix.try_present_counts(&selected)?;

    let mut columns: Vec<Column> = Vec::with_capacity(selected.len() + 1);
    for (&idx, values) in selected.iter().zip(dense) {
        columns.push(Series::new(group.column_name(&names[idx]).into(), values).into());
    }
    columns.push(Series::new(group.total_column_name().into(), totals).into());

    Ok(columns)
}

impl FeatureGenerator for TextNgramFeatureGenerator {
    fn fit_transform(
        &mut self,
        df: &DataFrame,
        metadata: &FeatureMetadata,
    ) -> Result<(DataFrame, TypeGroups)> {
        if self.is_fitted {
            return Err(KolosalError::ValidationError(
                "n-gram generator is already fitted".to_string(),
            ));
        }

        self.features_in = infer_text_features(df, metadata)?;
        let output = self.fit_with_downsampling(df)?;
        self.is_fitted = true;

        let names = output
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut type_groups = TypeGroups::new();
        type_groups.insert(NGRAM_TYPE_GROUP.to_string(), names);
        Ok((output, type_groups))
    }

    fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(KolosalError::ModelNotFitted);
        }

        self.generate(df).map_err(|err| {
            if err.is_memory_error() {
                error!(
                    error = %err,
                    "Out of memory during ngram feature transform, unrecoverable. \
                     Increase memory allocation or reduce data size to avoid this error"
                );
            }
            err
        })
    }

    fn features_in(&self) -> &[String] {
        &self.features_in
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}
