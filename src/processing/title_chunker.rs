//! Section-aware chunking of partitioned elements.
//!
//! Titles open new sections, tables stand alone, and running text is packed up to a soft
//! limit without ever crossing the hard limit. Sections that end up tiny (a heading followed by
//! a short paragraph) are folded into a neighbour afterwards. Elements are never split, so an
//! element longer than the hard limit becomes a chunk of its own.

use crate::config::TitleChunkingSettings;
use crate::partition::{Element, ElementCategory};
use crate::processing::types::ChunkingError;

const SEPARATOR: &str = "\n\n";
const SEPARATOR_LEN: usize = 2;

/// Size limits for [`chunk_by_title`], in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleChunkerOptions {
    /// Hard limit; only a single oversized element may exceed it.
    pub max_characters: usize,
    /// Soft limit; a chunk past this length accepts no more elements.
    pub new_after_n_chars: usize,
    /// Chunks shorter than this are merged into a neighbour when possible.
    pub combine_text_under_n_chars: usize,
}

impl Default for TitleChunkerOptions {
    fn default() -> Self {
        Self {
            max_characters: 3000,
            new_after_n_chars: 2400,
            combine_text_under_n_chars: 500,
        }
    }
}

impl TitleChunkerOptions {
    /// Validate limits, clamping the soft and merge limits to the hard limit.
    pub fn new(
        max_characters: usize,
        new_after_n_chars: usize,
        combine_text_under_n_chars: usize,
    ) -> Result<Self, ChunkingError> {
        if max_characters == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            max_characters,
            new_after_n_chars: new_after_n_chars.min(max_characters),
            combine_text_under_n_chars: combine_text_under_n_chars.min(max_characters),
        })
    }

    /// Options taken from the loaded configuration.
    pub fn from_settings(settings: &TitleChunkingSettings) -> Result<Self, ChunkingError> {
        Self::new(
            settings.max_characters,
            settings.new_after_n_chars,
            settings.combine_text_under_n_chars,
        )
    }
}

/// Ordered group of elements with their combined text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Element texts joined by a blank line; empty texts are skipped.
    pub text: String,
    /// Elements in document order.
    pub elements: Vec<Element>,
}

impl Chunk {
    /// Length of [`Chunk::text`] in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Default)]
struct Draft {
    elements: Vec<Element>,
    len: usize,
    isolated: bool,
}

impl Draft {
    fn start(element: Element) -> Self {
        let mut draft = Self::default();
        draft.push(element);
        draft
    }

    fn push(&mut self, element: Element) {
        self.len = joined_len(self.len, text_len(&element));
        self.elements.push(element);
    }

    fn absorb(&mut self, other: Draft) {
        self.len = joined_len(self.len, other.len);
        self.elements.extend(other.elements);
    }

    fn into_chunk(self) -> Chunk {
        let text = self
            .elements
            .iter()
            .map(|element| element.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(SEPARATOR);
        Chunk {
            text,
            elements: self.elements,
        }
    }
}

fn text_len(element: &Element) -> usize {
    element.text.trim().chars().count()
}

fn joined_len(left: usize, right: usize) -> usize {
    match (left, right) {
        (0, r) => r,
        (l, 0) => l,
        (l, r) => l + SEPARATOR_LEN + r,
    }
}

/// Group elements into chunks bounded by `options`.
pub fn chunk_by_title(elements: &[Element], options: &TitleChunkerOptions) -> Vec<Chunk> {
    let mut drafts: Vec<Draft> = Vec::new();
    let mut open: Option<Draft> = None;

    for element in elements.iter().cloned() {
        match element.category {
            ElementCategory::Title => {
                drafts.extend(open.take());
                open = Some(Draft::start(element));
            }
            ElementCategory::Table => {
                drafts.extend(open.take());
                let mut table = Draft::start(element);
                table.isolated = true;
                drafts.push(table);
            }
            ElementCategory::Text | ElementCategory::Image => {
                let fits = open.as_ref().is_some_and(|draft| {
                    draft.len <= options.new_after_n_chars
                        && joined_len(draft.len, text_len(&element)) <= options.max_characters
                });
                match open.as_mut() {
                    Some(draft) if fits => draft.push(element),
                    _ => {
                        drafts.extend(open.take());
                        open = Some(Draft::start(element));
                    }
                }
            }
        }
    }
    drafts.extend(open);

    combine_small_drafts(&mut drafts, options);

    let chunks: Vec<Chunk> = drafts.into_iter().map(Draft::into_chunk).collect();
    tracing::debug!(
        elements = elements.len(),
        chunks = chunks.len(),
        max_characters = options.max_characters,
        "Chunked elements by title"
    );
    chunks
}

/// Fold undersized drafts into the next non-table draft, otherwise the previous one.
fn combine_small_drafts(drafts: &mut Vec<Draft>, options: &TitleChunkerOptions) {
    let mut index = 0;
    while index < drafts.len() {
        let current = &drafts[index];
        if current.isolated || current.len >= options.combine_text_under_n_chars {
            index += 1;
            continue;
        }

        if let Some(next) = drafts.get(index + 1)
            && !next.isolated
            && joined_len(current.len, next.len) <= options.max_characters
        {
            let next = drafts.remove(index + 1);
            drafts[index].absorb(next);
            continue;
        }

        if index > 0
            && !drafts[index - 1].isolated
            && joined_len(drafts[index - 1].len, drafts[index].len) <= options.max_characters
        {
            let current = drafts.remove(index);
            drafts[index - 1].absorb(current);
            continue;
        }

        index += 1;
    }
}
