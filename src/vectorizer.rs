use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::article::Article;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());

/// Common English words excluded from vectors and title comparisons.
/// Tokens of two characters or fewer are dropped before this list is
/// consulted, so only longer function words appear here.
pub static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "about", "after", "all", "also", "and", "any", "are", "been", "before", "but", "can",
        "could", "did", "does", "for", "from", "had", "has", "have", "her", "here", "him", "his",
        "how", "into", "its", "just", "more", "most", "new", "not", "now", "off", "one", "only",
        "our", "out", "over", "said", "says", "she", "some", "than", "that", "the", "their",
        "them", "then", "there", "these", "they", "this", "under", "very", "was", "were", "what",
        "when", "which", "while", "who", "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Lowercases, strips URLs and punctuation, and drops short tokens and
/// stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let stripped = URL_RE.replace_all(&lowered, " ");
    stripped
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(*t))
        .map(str::to_string)
        .collect()
}

/// Sparse TF-IDF vector with its precomputed L2 norm.
#[derive(Debug, Clone, Default)]
pub struct DocVector {
    pub weights: HashMap<String, f64>,
    pub norm: f64,
}

/// TF-IDF space over one batch of articles, keyed by article id.
///
/// Term frequency is log-dampened (`1 + ln(count)`); document frequency
/// uses the smoothed form `ln(1 + N / (1 + df))`.
pub struct TfIdfVectorizer {
    vectors: HashMap<String, DocVector>,
}

impl TfIdfVectorizer {
    pub fn build(articles: &[Article]) -> Self {
        let total = articles.len() as f64;

        let counts: Vec<(String, HashMap<String, usize>)> = articles
            .iter()
            .map(|article| {
                let mut term_counts: HashMap<String, usize> = HashMap::new();
                for token in tokenize(&article.document_text()) {
                    *term_counts.entry(token).or_insert(0) += 1;
                }
                (article.id.clone(), term_counts)
            })
            .collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for (_, term_counts) in &counts {
            for term in term_counts.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut vectors = HashMap::with_capacity(counts.len());
        for (id, term_counts) in &counts {
            let mut weights = HashMap::with_capacity(term_counts.len());
            for (term, count) in term_counts {
                let tf = 1.0 + (*count as f64).ln();
                let idf = (1.0 + total / (1.0 + df[term.as_str()] as f64)).ln();
                weights.insert(term.clone(), tf * idf);
            }
            let norm = map_norm(&weights);
            vectors.insert(id.clone(), DocVector { weights, norm });
        }

        Self { vectors }
    }

    pub fn vector(&self, id: &str) -> Option<&DocVector> {
        self.vectors.get(id)
    }

    /// Cosine similarity between two documents in this space. Unknown ids
    /// score zero.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        match (self.vectors.get(a), self.vectors.get(b)) {
            (Some(va), Some(vb)) => cosine(va, vb),
            _ => 0.0,
        }
    }
}

/// Cosine similarity over sparse vectors, iterating the smaller map for
/// the dot product. A zero norm on either side defaults the denominator
/// to 1 so degenerate documents score zero instead of NaN.
pub fn cosine(a: &DocVector, b: &DocVector) -> f64 {
    let (small, large) = if a.weights.len() <= b.weights.len() {
        (a, b)
    } else {
        (b, a)
    };

    let mut dot = 0.0;
    for (term, weight) in &small.weights {
        if let Some(other) = large.weights.get(term) {
            dot += weight * other;
        }
    }

    let mut denom = a.norm * b.norm;
    if denom == 0.0 {
        denom = 1.0;
    }
    dot / denom
}

/// Similarity of a document against an accumulated (unnormalized)
/// centroid. Both norms are computed fresh from the maps; the document's
/// stored norm is not reused.
pub fn centroid_similarity(doc: &DocVector, centroid: &HashMap<String, f64>) -> f64 {
    let (small, large) = if doc.weights.len() <= centroid.len() {
        (&doc.weights, centroid)
    } else {
        (centroid, &doc.weights)
    };

    let mut dot = 0.0;
    for (term, weight) in small {
        if let Some(other) = large.get(term) {
            dot += weight * other;
        }
    }

    let mut denom = map_norm(centroid) * map_norm(&doc.weights);
    if denom == 0.0 {
        denom = 1.0;
    }
    dot / denom
}

/// L2 norm of a raw weight map.
pub fn map_norm(weights: &HashMap<String, f64>) -> f64 {
    weights.values().map(|w| w * w).sum::<f64>().sqrt()
}

/// Element-wise addition of a document vector into a centroid.
pub fn add_into(centroid: &mut HashMap<String, f64>, doc: &DocVector) {
    for (term, weight) in &doc.weights {
        *centroid.entry(term.clone()).or_insert(0.0) += weight;
    }
}
