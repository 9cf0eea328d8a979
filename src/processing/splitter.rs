//! Plain-text splitting strategies.
//!
//! - Character: split on one separator and greedily merge pieces up to `chunk_size` characters,
//!   carrying trailing pieces forward as overlap. A single piece longer than the budget is
//!   emitted on its own with a warning.
//! - Recursive: semantic-boundary splitting through `semchunk-rs` (paragraphs, then sentences,
//!   then words), followed by a bounded sliding overlap between neighbours.
//! - Semantic: embedding-distance breakpoints, see [`super::semantic`].
//!
//! Every length here is counted in Unicode scalar values, not bytes.

use crate::config::{SplitterSettings, SplitterStrategy};
use crate::embedding::EmbeddingClient;
use crate::processing::semantic::SemanticChunker;
use crate::processing::types::ChunkingError;
use semchunk_rs::Chunker;
use std::collections::VecDeque;
use std::sync::Arc;

type LengthFn = Arc<dyn Fn(&str) -> usize + Send + Sync>;

fn char_counter() -> LengthFn {
    Arc::new(|segment: &str| segment.chars().count())
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<(), ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if chunk_overlap > chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            overlap: chunk_overlap,
            chunk_size,
        });
    }
    Ok(())
}

/// Separator-based splitter with greedy merging.
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    separator: String,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CharacterSplitter {
    /// Splitter cutting on `separator` into chunks of at most `chunk_size` characters.
    pub fn new(
        separator: impl Into<String>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self, ChunkingError> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self {
            separator: separator.into(),
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let pieces: Vec<&str> = if self.separator.is_empty() {
            text.char_indices()
                .map(|(start, ch)| &text[start..start + ch.len_utf8()])
                .collect()
        } else {
            text.split(self.separator.as_str())
                .filter(|piece| !piece.is_empty())
                .collect()
        };
        self.merge_pieces(&pieces)
    }

    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let separator_len = self.separator.chars().count();
        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let piece_len = piece.chars().count();
            let joined = if current.is_empty() { 0 } else { separator_len };

            if total + piece_len + joined > self.chunk_size {
                if total > self.chunk_size {
                    tracing::warn!(
                        size = total,
                        chunk_size = self.chunk_size,
                        "Created a chunk longer than the configured size"
                    );
                }
                if !current.is_empty() {
                    if let Some(chunk) = self.join(&current) {
                        chunks.push(chunk);
                    }
                    loop {
                        let joined = if current.is_empty() { 0 } else { separator_len };
                        let exceeds_overlap = total > self.chunk_overlap;
                        let still_too_long =
                            total > 0 && total + piece_len + joined > self.chunk_size;
                        if !exceeds_overlap && !still_too_long {
                            break;
                        }
                        let Some((_, dropped_len)) = current.pop_front() else {
                            break;
                        };
                        let dropped_separator = if current.is_empty() { 0 } else { separator_len };
                        total = total.saturating_sub(dropped_len + dropped_separator);
                    }
                }
            }

            current.push_back((piece, piece_len));
            total += piece_len;
            if current.len() > 1 {
                total += separator_len;
            }
        }

        if let Some(chunk) = self.join(&current) {
            if total > self.chunk_size {
                tracing::warn!(
                    size = total,
                    chunk_size = self.chunk_size,
                    "Created a chunk longer than the configured size"
                );
            }
            chunks.push(chunk);
        }
        chunks
    }

    fn join(&self, pieces: &VecDeque<(&str, usize)>) -> Option<String> {
        let joined = pieces
            .iter()
            .map(|(piece, _)| *piece)
            .collect::<Vec<_>>()
            .join(&self.separator);
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Semantic-boundary splitter with a sliding character overlap.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    /// Splitter producing chunks of at most `chunk_size` characters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text`; whitespace-only input yields no chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let counter = char_counter();
        let counter_for_chunker = counter.clone();
        let chunker = Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
        );
        let base_chunks = chunker.chunk(text);
        apply_overlap(base_chunks, self.chunk_size, self.chunk_overlap, &counter)
    }
}

/// Prefix each chunk with the tail of its predecessor, staying within `chunk_size`.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    length: &LengthFn,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if chunks.is_empty() || effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let chunk = match previous.as_deref() {
            Some(prior) => {
                build_overlapped_chunk(prior, &current, effective_overlap, chunk_size, length)
            }
            None => current.clone(),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    length: &LengthFn,
) -> String {
    let tail = tail_within_limit(previous, overlap, length);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_budget(&combined, chunk_size, length)
}

/// Longest suffix of `text` (leading whitespace trimmed) measuring at most `limit`.
fn tail_within_limit<'a>(text: &'a str, limit: usize, length: &LengthFn) -> &'a str {
    if limit == 0 {
        return "";
    }
    text.char_indices()
        .map(|(start, _)| text[start..].trim_start())
        .find(|candidate| length.as_ref()(candidate) <= limit)
        .unwrap_or("")
}

fn trim_to_budget(text: &str, budget: usize, length: &LengthFn) -> String {
    if length.as_ref()(text) <= budget {
        return text.to_string();
    }
    tail_within_limit(text, budget, length).to_string()
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

/// Splitter selected through `TEXT_SPLITTER_STRATEGY`.
pub enum TextSplitter {
    /// Separator-based merging.
    Character(CharacterSplitter),
    /// Semantic-boundary recursion.
    Recursive(RecursiveSplitter),
    /// Embedding-distance breakpoints.
    Semantic(SemanticChunker),
}

impl TextSplitter {
    /// Build the configured splitter; `embedder` is only used by the semantic strategy.
    pub fn from_settings(
        settings: &SplitterSettings,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, ChunkingError> {
        let splitter = match settings.strategy {
            SplitterStrategy::Character => Self::Character(CharacterSplitter::new(
                settings.separator.clone(),
                settings.chunk_size,
                settings.chunk_overlap,
            )?),
            SplitterStrategy::Recursive => Self::Recursive(RecursiveSplitter::new(
                settings.chunk_size,
                settings.chunk_overlap,
            )?),
            SplitterStrategy::Semantic => Self::Semantic(SemanticChunker::new(
                embedder,
                settings.breakpoint_percentile,
            )?),
        };
        Ok(splitter)
    }

    /// Split one document.
    pub async fn split_text(&self, text: &str) -> Result<Vec<String>, ChunkingError> {
        match self {
            Self::Character(splitter) => Ok(splitter.split_text(text)),
            Self::Recursive(splitter) => Ok(splitter.split_text(text)),
            Self::Semantic(chunker) => chunker.split_text(text).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "Tesla's Q3 Results\n\nTesla reported record revenue of $25.2B in Q3 2024.\n\nModel Y Performance\n\nThe Model Y became the best-selling vehicle globally, with 350,000 units sold.";

    #[test]
    fn short_paragraphs_merge_into_one_chunk() {
        let splitter = CharacterSplitter::new("\n\n", 800, 0).expect("splitter");
        let chunks = splitter.split_text(REPORT);
        assert_eq!(chunks, vec![REPORT.to_string()]);
    }

    #[test]
    fn pieces_are_merged_up_to_chunk_size() {
        let splitter = CharacterSplitter::new("\n\n", 80, 0).expect("splitter");
        let chunks = splitter.split_text(REPORT);
        assert_eq!(
            chunks,
            vec![
                "Tesla's Q3 Results\n\nTesla reported record revenue of $25.2B in Q3 2024.",
                "Model Y Performance",
                "The Model Y became the best-selling vehicle globally, with 350,000 units sold.",
            ]
        );
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 80));
    }

    #[test]
    fn space_separator_carries_overlap() {
        let splitter = CharacterSplitter::new(" ", 10, 5).expect("splitter");
        let chunks = splitter.split_text("aaa bbb ccc ddd");
        assert_eq!(chunks, vec!["aaa bbb", "bbb ccc", "ccc ddd"]);
    }

    #[test]
    fn oversized_piece_is_emitted_alone() {
        let long = "x".repeat(120);
        let text = format!("short\n\n{long}\n\ntail");
        let splitter = CharacterSplitter::new("\n\n", 100, 0).expect("splitter");
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks, vec!["short".to_string(), long, "tail".to_string()]);
    }

    #[test]
    fn empty_separator_splits_characters() {
        let splitter = CharacterSplitter::new("", 3, 0).expect("splitter");
        assert_eq!(splitter.split_text("abcdefg"), vec!["abc", "def", "g"]);
    }

    #[test]
    fn invalid_sizes_are_rejected() {
        assert!(matches!(
            CharacterSplitter::new("\n\n", 0, 0),
            Err(ChunkingError::InvalidChunkSize)
        ));
        assert!(matches!(
            RecursiveSplitter::new(10, 11),
            Err(ChunkingError::InvalidOverlap { .. })
        ));
    }

    #[test]
    fn recursive_splitter_respects_budget_and_keeps_words() {
        let text = "The quick brown fox jumps over the lazy dog. A second sentence follows here.";
        let splitter = RecursiveSplitter::new(30, 0).expect("splitter");
        let chunks = splitter.split_text(text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 30));
        let words: Vec<&str> = chunks.iter().flat_map(|chunk| chunk.split_whitespace()).collect();
        assert_eq!(words, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn recursive_splitter_handles_empty_input() {
        let splitter = RecursiveSplitter::new(30, 5).expect("splitter");
        assert!(splitter.split_text("   ").is_empty());
    }

    #[test]
    fn overlap_prefixes_previous_tail_within_budget() {
        let counter = char_counter();
        let chunks = apply_overlap(
            vec!["one two".to_string(), "three four".to_string()],
            14,
            3,
            &counter,
        );
        assert_eq!(chunks[0], "one two");
        assert_eq!(chunks[1], "two three four");
        assert!(chunks.iter().all(|chunk| counter.as_ref()(chunk) <= 14));
    }
}
