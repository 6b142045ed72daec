//! Bag-of-n-grams vectorization
//!
//! `CountVectorizer` learns a vocabulary of word n-grams and turns documents
//! into a sparse count matrix. The vocabulary can be shrunk in place to the
//! most frequent terms when the dense output would not fit in memory.

use crate::error::{KolosalError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use std::any::Any;
use std::collections::{HashMap, HashSet, TryReserveError};
use std::fmt;
use tracing::debug;

/// Word tokens of two or more word characters.
pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Sparse document x term count matrix (CSR).
#[derive(Debug, Clone)]
pub struct NgramMatrix {
    inner: CsMat<i64>,
}

impl NgramMatrix {
    /// Build from per-row `(column, count)` entries. Entries need not be sorted.
    pub fn from_rows(n_cols: usize, rows: Vec<Vec<(usize, i64)>>) -> Result<Self> {
        let n_rows = rows.len();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);

        for mut entries in rows {
            entries.sort_unstable_by_key(|(col, _)| *col);
            for (col, count) in entries {
                if col >= n_cols {
                    return Err(KolosalError::ShapeError {
                        expected: format!("column < {}", n_cols),
                        actual: col.to_string(),
                    });
                }
                indices.push(col);
                data.push(count);
            }
            indptr.push(indices.len());
        }

        let inner = CsMat::try_new((n_rows, n_cols), indptr, indices, data).map_err(
            |(_, _, _, err)| KolosalError::DataError(format!("invalid n-gram matrix: {}", err)),
        )?;
        Ok(Self { inner })
    }

    pub fn rows(&self) -> usize {
        self.inner.rows()
    }

    pub fn cols(&self) -> usize {
        self.inner.cols()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// Value at `(row, col)`, zero when not stored.
    pub fn get(&self, row: usize, col: usize) -> i64 {
        self.inner.get(row, col).copied().unwrap_or(0)
    }

    /// Column sums: total occurrences of each term over all rows.
    pub fn term_frequencies(&self) -> Vec<i64> {
        let mut totals = vec![0i64; self.cols()];
        for row in self.inner.outer_iterator() {
            for (col, &value) in row.iter() {
                totals[col] += value;
            }
        }
        totals
    }

    /// Output position of every column, `None` for columns not `selected`.
    fn column_positions(&self, selected: &[usize]) -> Result<Vec<Option<usize>>> {
        let cols = self.cols();
        let mut positions = vec![None; cols];
        for (pos, &col) in selected.iter().enumerate() {
            if col >= cols {
                return Err(KolosalError::ShapeError {
                    expected: format!("column < {}", cols),
                    actual: col.to_string(),
                });
            }
            positions[col] = Some(pos);
        }
        Ok(positions)
    }

    /// Dense copies of the `selected` columns, in that order.
    ///
    /// Every column buffer is reserved fallibly, so running out of memory
    /// surfaces as `KolosalError::MemoryError` instead of aborting.
    pub fn try_dense_columns(&self, selected: &[usize]) -> Result<Vec<Vec<i64>>> {
        let (rows, cols) = self.shape();
        let positions = self.column_positions(selected)?;

        let mut columns: Vec<Vec<i64>> = try_with_capacity(selected.len(), rows, cols)?;
        for _ in selected {
            columns.push(try_zeroed(rows, rows, cols)?);
        }

        for (row_idx, row) in self.inner.outer_iterator().enumerate() {
            for (col, &value) in row.iter() {
                if let Some(pos) = positions[col] {
                    columns[pos][row_idx] = value;
                }
            }
        }
        Ok(columns)
    }

    /// Number of `selected` columns with a positive count in each row.
    pub fn try_present_counts(&self, selected: &[usize]) -> Result<Vec<i32>> {
        let (rows, cols) = self.shape();
        let positions = self.column_positions(selected)?;

        let mut counts: Vec<i32> = try_zeroed(rows, rows, cols)?;
        for (row_idx, row) in self.inner.outer_iterator().enumerate() {
            counts[row_idx] = row
                .iter()
                .filter(|&(col, &value)| value > 0 && positions[col].is_some())
                .count() as i32;
        }
        Ok(counts)
    }
}

fn allocation_error(rows: usize, cols: usize, err: TryReserveError) -> KolosalError {
    KolosalError::MemoryError(format!(
        "cannot allocate dense n-gram output of {} x {} cells: {}",
        rows, cols, err
    ))
}

fn try_with_capacity<T>(capacity: usize, rows: usize, cols: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .map_err(|e| allocation_error(rows, cols, e))?;
    Ok(buffer)
}

/// `len` zeroes in a fallibly reserved buffer.
fn try_zeroed<T: Clone + Default>(len: usize, rows: usize, cols: usize) -> Result<Vec<T>> {
    let mut buffer = try_with_capacity(len, rows, cols)?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

/// A fitted-vocabulary text vectorizer.
///
/// Implementations are owned by exactly one text group. `shrink_vocabulary`
/// mutates the fitted state; matrices produced before a shrink are stale.
pub trait Vectorizer: fmt::Debug + Send + Sync {
    /// Learn the vocabulary from `documents`.
    fn fit(&mut self, documents: &[String]) -> Result<()>;

    /// Count vocabulary n-grams in each document.
    fn transform(&self, documents: &[String]) -> Result<NgramMatrix>;

    fn fit_transform(&mut self, documents: &[String]) -> Result<NgramMatrix> {
        self.fit(documents)?;
        self.transform(documents)
    }

    fn is_fitted(&self) -> bool;

    fn vocabulary_size(&self) -> usize;

    /// Terms in column order.
    fn feature_names(&self) -> Vec<String>;

    /// Number of fitting documents each term appeared in, in column order.
    fn document_frequencies(&self) -> Vec<usize>;

    /// Keep only the `keep` terms with the highest `frequencies` (one entry
    /// per current column). Ties keep the earlier column. Surviving terms
    /// keep their relative order.
    fn shrink_vocabulary(&mut self, frequencies: &[i64], keep: usize) -> Result<()>;

    /// Fresh copy of this vectorizer, fitted state included.
    fn box_clone(&self) -> Box<dyn Vectorizer>;

    /// Concrete type access, used to export fitted state.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Vectorizer> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Indices of the `keep` largest values, ties broken by lower index, returned
/// in ascending index order.
pub fn top_k_indices(frequencies: &[i64], keep: usize) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..frequencies.len()).collect();
    ranked.sort_by(|&a, &b| frequencies[b].cmp(&frequencies[a]).then(a.cmp(&b)));
    ranked.truncate(keep);
    ranked.sort_unstable();
    ranked
}

/// Serialized form of `TextTokenizer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizerParams {
    pub lowercase: bool,
    pub token_pattern: String,
    pub stop_words: Vec<String>,
}

/// Regex word tokenizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TokenizerParams", into = "TokenizerParams")]
pub struct TextTokenizer {
    lowercase: bool,
    token_pattern: Regex,
    stop_words: HashSet<String>,
}

impl TextTokenizer {
    pub fn new(token_pattern: &str) -> Result<Self> {
        Ok(Self {
            lowercase: true,
            token_pattern: Regex::new(token_pattern)?,
            stop_words: HashSet::new(),
        })
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_words = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let processed = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        self.token_pattern
            .find_iter(&processed)
            .map(|m| m.as_str())
            .filter(|token| !self.stop_words.contains(*token))
            .map(str::to_string)
            .collect()
    }
}

impl TryFrom<TokenizerParams> for TextTokenizer {
    type Error = KolosalError;

    fn try_from(params: TokenizerParams) -> Result<Self> {
        Ok(TextTokenizer::new(&params.token_pattern)?
            .with_lowercase(params.lowercase)
            .with_stop_words(params.stop_words))
    }
}

impl From<TextTokenizer> for TokenizerParams {
    fn from(tokenizer: TextTokenizer) -> Self {
        let mut stop_words: Vec<String> = tokenizer.stop_words.into_iter().collect();
        stop_words.sort();
        Self {
            lowercase: tokenizer.lowercase,
            token_pattern: tokenizer.token_pattern.as_str().to_string(),
            stop_words,
        }
    }
}

/// Settings for `CountVectorizer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountVectorizerConfig {
    /// Inclusive `(min_n, max_n)` n-gram lengths
    pub ngram_range: (usize, usize),
    /// Minimum number of documents a term must appear in
    pub min_df: usize,
    /// Maximum fraction of documents a term may appear in
    pub max_df: f64,
    /// Keep at most this many terms, ranked by corpus frequency
    pub max_features: Option<usize>,
    pub lowercase: bool,
    pub token_pattern: String,
    pub stop_words: Vec<String>,
    /// Emit 1 instead of the count for present terms
    pub binary: bool,
}

impl Default for CountVectorizerConfig {
    /// AutoML default: 1- to 3-grams seen in at least 30 documents, capped at
    /// 10 000 terms.
    fn default() -> Self {
        Self {
            ngram_range: (1, 3),
            min_df: 30,
            max_df: 1.0,
            max_features: Some(10_000),
            lowercase: true,
            token_pattern: DEFAULT_TOKEN_PATTERN.to_string(),
            stop_words: Vec::new(),
            binary: false,
        }
    }
}

impl CountVectorizerConfig {
    /// Unigrams, no document-frequency floor, no feature cap.
    pub fn unigram() -> Self {
        Self {
            ngram_range: (1, 1),
            min_df: 1,
            max_features: None,
            ..Self::default()
        }
    }

    pub fn with_ngram_range(mut self, min: usize, max: usize) -> Self {
        self.ngram_range = (min, max);
        self
    }

    pub fn with_min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df;
        self
    }

    pub fn with_max_df(mut self, max_df: f64) -> Self {
        self.max_df = max_df;
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(KolosalError::InvalidParameter {
                name: "ngram_range".to_string(),
                value: format!("({}, {})", min_n, max_n),
                reason: "must satisfy 1 <= min_n <= max_n".to_string(),
            });
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(KolosalError::InvalidParameter {
                name: "max_df".to_string(),
                value: self.max_df.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if self.max_features == Some(0) {
            return Err(KolosalError::InvalidParameter {
                name: "max_features".to_string(),
                value: "0".to_string(),
                reason: "must be positive when set".to_string(),
            });
        }
        Regex::new(&self.token_pattern)?;
        Ok(())
    }
}

/// Count-based n-gram vectorizer
///
/// Column indices follow first occurrence in the fitting documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountVectorizer {
    config: CountVectorizerConfig,
    tokenizer: TextTokenizer,
    vocabulary: HashMap<String, usize>,
    document_frequency: Vec<usize>,
    fitted: bool,
}

impl CountVectorizer {
    pub fn new(config: CountVectorizerConfig) -> Result<Self> {
        config.validate()?;
        let tokenizer = TextTokenizer::new(&config.token_pattern)?
            .with_lowercase(config.lowercase)
            .with_stop_words(config.stop_words.iter().cloned());
        Ok(Self {
            config,
            tokenizer,
            vocabulary: HashMap::new(),
            document_frequency: Vec::new(),
            fitted: false,
        })
    }

    pub fn config(&self) -> &CountVectorizerConfig {
        &self.config
    }

    /// Term -> column index.
    pub fn vocabulary(&self) -> &HashMap<String, usize> {
        &self.vocabulary
    }

    fn generate_ngrams(&self, tokens: &[String]) -> Vec<String> {
        let (min_n, max_n) = self.config.ngram_range;
        let mut ngrams = Vec::new();

        for n in min_n..=max_n {
            if tokens.len() >= n {
                for window in tokens.windows(n) {
                    ngrams.push(window.join(" "));
                }
            }
        }

        ngrams
    }

    fn analyze(&self, document: &str) -> Vec<String> {
        let tokens = self.tokenizer.tokenize(document);
        self.generate_ngrams(&tokens)
    }

    fn install_vocabulary(&mut self, terms: Vec<(String, usize)>) {
        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(idx, (term, _))| (term.clone(), idx))
            .collect();
        self.document_frequency = terms.into_iter().map(|(_, df)| df).collect();
    }
}

impl Vectorizer for CountVectorizer {
    fn fit(&mut self, documents: &[String]) -> Result<()> {
        let n_docs = documents.len();

        // Terms in first-occurrence order with document and corpus counts.
        let mut order: Vec<String> = Vec::new();
        let mut stats: HashMap<String, (usize, i64)> = HashMap::new();

        for doc in documents {
            let ngrams = self.analyze(doc);
            let mut seen: HashSet<&str> = HashSet::new();
            for ngram in &ngrams {
                let first_in_doc = seen.insert(ngram.as_str());
                match stats.get_mut(ngram) {
                    Some((df, total)) => {
                        *total += 1;
                        if first_in_doc {
                            *df += 1;
                        }
                    }
                    None => {
                        order.push(ngram.clone());
                        stats.insert(ngram.clone(), (1, 1));
                    }
                }
            }
        }

        if order.is_empty() {
            return Err(KolosalError::EmptyVocabulary(
                "no terms found; documents may only contain stop words".to_string(),
            ));
        }

        let max_df_count = (self.config.max_df * n_docs as f64).floor() as usize;
        let mut kept: Vec<(String, usize, i64)> = order
            .into_iter()
            .filter_map(|term| {
                let (df, total) = stats.remove(&term)?;
                (df >= self.config.min_df && df <= max_df_count).then_some((term, df, total))
            })
            .collect();

        if kept.is_empty() {
            return Err(KolosalError::EmptyVocabulary(format!(
                "after pruning, no terms remain (min_df = {}, max_df = {})",
                self.config.min_df, self.config.max_df
            )));
        }

        if let Some(max_features) = self.config.max_features {
            if kept.len() > max_features {
                let totals: Vec<i64> = kept.iter().map(|(_, _, total)| *total).collect();
                let keep: HashSet<usize> = top_k_indices(&totals, max_features).into_iter().collect();
                kept = kept
                    .into_iter()
                    .enumerate()
                    .filter(|(idx, _)| keep.contains(idx))
                    .map(|(_, entry)| entry)
                    .collect();
            }
        }

        self.install_vocabulary(kept.into_iter().map(|(term, df, _)| (term, df)).collect());
        self.fitted = true;

        debug!(
            n_documents = n_docs,
            vocabulary_size = self.vocabulary.len(),
            "CountVectorizer fitted"
        );
        Ok(())
    }

    fn transform(&self, documents: &[String]) -> Result<NgramMatrix> {
        if !self.fitted {
            return Err(KolosalError::ModelNotFitted);
        }

        let rows = documents
            .iter()
            .map(|doc| {
                let mut counts: HashMap<usize, i64> = HashMap::new();
                for ngram in self.analyze(doc) {
                    if let Some(&idx) = self.vocabulary.get(&ngram) {
                        *counts.entry(idx).or_insert(0) += 1;
                    }
                }
                counts
                    .into_iter()
                    .map(|(idx, count)| (idx, if self.config.binary { 1 } else { count }))
                    .collect()
            })
            .collect();

        NgramMatrix::from_rows(self.vocabulary.len(), rows)
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn feature_names(&self) -> Vec<String> {
        let mut names = vec![String::new(); self.vocabulary.len()];
        for (term, &idx) in &self.vocabulary {
            names[idx] = term.clone();
        }
        names
    }

    fn document_frequencies(&self) -> Vec<usize> {
        self.document_frequency.clone()
    }

    fn shrink_vocabulary(&mut self, frequencies: &[i64], keep: usize) -> Result<()> {
        if !self.fitted {
            return Err(KolosalError::ModelNotFitted);
        }
        if frequencies.len() != self.vocabulary.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} term frequencies", self.vocabulary.len()),
                actual: frequencies.len().to_string(),
            });
        }
        if keep >= self.vocabulary.len() {
            return Ok(());
        }

        let names = self.feature_names();
        let survivors = top_k_indices(frequencies, keep)
            .into_iter()
            .map(|idx| (names[idx].clone(), self.document_frequency[idx]))
            .collect();
        self.install_vocabulary(survivors);
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Vectorizer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
