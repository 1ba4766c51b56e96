//! Lyrics normalization and TF-IDF vectorization.
//!
//! Both are collaborators of the feature pipeline and sit behind traits so a
//! different normalizer or a pre-fitted vocabulary can be swapped in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

lazy_static::lazy_static! {
    /// English stop words removed before vectorization
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "about", "above", "after", "again", "against", "ain", "all", "am", "an",
        "and", "any", "are", "aren", "as", "at", "be", "because", "been", "before",
        "being", "below", "between", "both", "but", "by", "can", "couldn", "d", "did",
        "didn", "do", "does", "doesn", "doing", "don", "down", "during", "each", "few",
        "for", "from", "further", "had", "hadn", "has", "hasn", "have", "haven", "having",
        "he", "her", "here", "hers", "herself", "him", "himself", "his", "how", "i",
        "if", "in", "into", "is", "isn", "it", "its", "itself", "just", "ll", "m", "ma",
        "me", "mightn", "more", "most", "mustn", "my", "myself", "needn", "no", "nor",
        "not", "now", "o", "of", "off", "on", "once", "only", "or", "other", "our",
        "ours", "ourselves", "out", "over", "own", "re", "s", "same", "shan", "she",
        "should", "shouldn", "so", "some", "such", "t", "than", "that", "the", "their",
        "theirs", "them", "themselves", "then", "there", "these", "they", "this",
        "those", "through", "to", "too", "under", "until", "up", "ve", "very", "was",
        "wasn", "we", "were", "weren", "what", "when", "where", "which", "while", "who",
        "whom", "why", "will", "with", "won", "wouldn", "y", "you", "your", "yours",
        "yourself", "yourselves",
    ]
    .into_iter()
    .collect();
}

/// Whether `word` is an English stop word.
#[must_use]
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Turns free-form lyrics into a normalized token string.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> String;
}

/// Lowercases, strips non-letters, drops stop words and lemmatizes plurals.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishNormalizer;

impl TextNormalizer for EnglishNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let cleaned: String = raw
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace())
            .collect();

        cleaned
            .split_whitespace()
            .filter(|token| !is_stop_word(token))
            .map(lemmatize)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Light noun lemmatizer: plural suffixes only.
fn lemmatize(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    let keeps_s = word.len() <= 3
        || word.ends_with("ss")
        || word.ends_with("us")
        || word.ends_with("is");
    match word.strip_suffix('s') {
        Some(stem) if !keeps_s => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Fits a vocabulary over corpus documents.
pub trait TextVectorizer: Send + Sync {
    fn fit(&self, documents: &[&str]) -> Vocabulary;
}

/// TF-IDF vectorizer over unigrams and bigrams.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    pub max_features: usize,
    pub ngram_range: (usize, usize),
    pub remove_stop_words: bool,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self {
            max_features: 5000,
            ngram_range: (1, 2),
            remove_stop_words: true,
        }
    }
}

impl TfidfVectorizer {
    #[must_use]
    pub fn with_max_features(max_features: usize) -> Self {
        Self {
            max_features,
            ..Self::default()
        }
    }
}

impl TextVectorizer for TfidfVectorizer {
    fn fit(&self, documents: &[&str]) -> Vocabulary {
        let analyzer = Analyzer {
            ngram_range: self.ngram_range,
            remove_stop_words: self.remove_stop_words,
        };

        let mut total_counts: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let terms = analyzer.terms(doc);
            let mut seen = HashSet::new();
            for term in terms {
                *total_counts.entry(term.clone()).or_insert(0) += 1;
                if seen.insert(term.clone()) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        // Most frequent first, alphabetical among equals
        let mut ranked: Vec<(String, usize)> = total_counts.into_iter().collect();
        ranked.sort_by(|(ta, ca), (tb, cb)| cb.cmp(ca).then_with(|| ta.cmp(tb)));
        ranked.truncate(self.max_features);

        let kept: BTreeMap<String, usize> = ranked
            .into_iter()
            .map(|(term, _)| {
                let df = doc_freq.get(&term).copied().unwrap_or(0);
                (term, df)
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let n_docs = documents.len() as f64;
        let mut terms = HashMap::with_capacity(kept.len());
        let mut idf = Vec::with_capacity(kept.len());
        for (column, (term, df)) in kept.into_iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let weight = ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0;
            idf.push(weight);
            terms.insert(term, column);
        }

        Vocabulary {
            terms,
            idf,
            ngram_range: self.ngram_range,
            remove_stop_words: self.remove_stop_words,
        }
    }
}

/// Tokenizer shared by fitting and transforming.
struct Analyzer {
    ngram_range: (usize, usize),
    remove_stop_words: bool,
}

impl Analyzer {
    fn terms(&self, doc: &str) -> Vec<String> {
        let lowered = doc.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
            .filter(|t| !(self.remove_stop_words && is_stop_word(t)))
            .collect();

        let (low, high) = self.ngram_range;
        let mut terms = Vec::new();
        for n in low.max(1)..=high {
            if tokens.len() < n {
                break;
            }
            terms.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        terms
    }
}

/// A fitted, immutable vocabulary with inverse document frequencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: HashMap<String, usize>,
    idf: Vec<f64>,
    ngram_range: (usize, usize),
    remove_stop_words: bool,
}

impl Vocabulary {
    /// Width of every transformed vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    /// Column for `term`, if it survived fitting.
    #[must_use]
    pub fn column(&self, term: &str) -> Option<usize> {
        self.terms.get(term).copied()
    }

    /// L2-normalized TF-IDF vector for `doc`; all zeros when no term matches.
    #[must_use]
    pub fn transform(&self, doc: &str) -> Vec<f64> {
        let analyzer = Analyzer {
            ngram_range: self.ngram_range,
            remove_stop_words: self.remove_stop_words,
        };

        let mut vector = vec![0.0; self.dimension()];
        for term in analyzer.terms(doc) {
            if let Some(&column) = self.terms.get(&term) {
                vector[column] += 1.0;
            }
        }
        for (value, idf) in vector.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        crate::features::l2_normalize(&mut vector);
        vector
    }
}
