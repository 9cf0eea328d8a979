//! Embedding-distance chunking.
//!
//! Text is cut into sentences; each sentence is embedded together with one neighbour on each
//! side so that single short sentences do not dominate. A new chunk starts wherever the cosine
//! distance between consecutive groups is above the configured percentile of all distances.

use crate::embedding::EmbeddingClient;
use crate::processing::types::ChunkingError;
use crate::store::mmr::cosine_similarity;
use std::sync::Arc;

const BUFFER_SIZE: usize = 1;

/// Splits text where meaning shifts, as measured by an embedding model.
pub struct SemanticChunker {
    embedder: Arc<dyn EmbeddingClient>,
    breakpoint_percentile: f32,
}

impl SemanticChunker {
    /// Chunker breaking above the `breakpoint_percentile` (0-100) of sentence distances.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        breakpoint_percentile: f32,
    ) -> Result<Self, ChunkingError> {
        if !(0.0..=100.0).contains(&breakpoint_percentile) {
            return Err(ChunkingError::InvalidPercentile(breakpoint_percentile));
        }
        Ok(Self {
            embedder,
            breakpoint_percentile,
        })
    }

    /// Split `text` into sentence groups.
    pub async fn split_text(&self, text: &str) -> Result<Vec<String>, ChunkingError> {
        let sentences = split_sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences.into_iter().map(str::to_string).collect());
        }

        let groups = buffered_groups(&sentences, BUFFER_SIZE);
        let embeddings = self.embedder.generate_embeddings(groups).await?;
        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();
        let threshold = percentile(&distances, self.breakpoint_percentile);

        let mut chunks = Vec::new();
        let mut start = 0;
        for (index, distance) in distances.iter().enumerate() {
            if *distance > threshold {
                chunks.push(sentences[start..=index].join(" "));
                start = index + 1;
            }
        }
        if start < sentences.len() {
            chunks.push(sentences[start..].join(" "));
        }

        tracing::debug!(
            sentences = sentences.len(),
            chunks = chunks.len(),
            threshold,
            "Semantic chunking complete"
        );
        Ok(chunks)
    }
}

/// Sentences end at `.`, `?`, or `!` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut previous: Option<char> = None;

    for (index, ch) in text.char_indices() {
        if ch.is_whitespace() && matches!(previous, Some('.' | '?' | '!')) {
            let sentence = text[start..index].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = index;
        }
        previous = Some(ch);
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Each sentence joined with up to `buffer` neighbours on either side.
fn buffered_groups(sentences: &[&str], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|index| {
            let from = index.saturating_sub(buffer);
            let to = (index + buffer + 1).min(sentences.len());
            sentences[from..to].join(" ")
        })
        .collect()
}

/// Linear-interpolated percentile of `values`.
fn percentile(values: &[f32], percentile: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (percentile / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
