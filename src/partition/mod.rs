//! PDF partitioning into typed elements.
//!
//! Partitioning itself is delegated to the Unstructured API, which performs layout analysis,
//! table-structure inference, and image extraction. This module owns the element model the
//! rest of the pipeline consumes and the mapping from Unstructured's JSON output onto it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod elements_file;
mod unstructured;

pub use elements_file::ElementsFilePartitioner;
pub use unstructured::{UnstructuredPartitioner, UnstructuredSettings};

/// Errors raised while partitioning a document.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Input file does not exist or is not a regular file.
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),
    /// Partitioner settings are unusable.
    #[error("Partitioner misconfigured: {0}")]
    Configuration(String),
    /// Reading the input or element file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// HTTP layer failed before receiving a response.
    #[error("Partitioning request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Service answered with a non-success status.
    #[error("Unexpected partitioning response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: reqwest::StatusCode,
        /// Response body.
        body: String,
    },
    /// Element JSON could not be decoded.
    #[error("Malformed element data: {0}")]
    InvalidResponse(String),
}

/// Coarse element category used by chunking and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementCategory {
    /// Heading text; starts a new chunk.
    Title,
    /// Narrative text, list items, captions, headers, and everything else textual.
    Text,
    /// Table with an HTML rendering.
    Table,
    /// Picture with an optional base64 payload.
    Image,
}

impl ElementCategory {
    /// Map an Unstructured element type onto a category.
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "Title" => Self::Title,
            "Table" => Self::Table,
            "Image" => Self::Image,
            _ => Self::Text,
        }
    }
}

/// One typed fragment of a partitioned document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Identifier assigned by the partitioner.
    pub id: String,
    /// Coarse category.
    pub category: ElementCategory,
    /// Raw element type reported by the partitioner (e.g. `NarrativeText`).
    pub kind: String,
    /// Extracted text; may be empty for images.
    pub text: String,
    /// HTML rendering, present on tables.
    pub text_as_html: Option<String>,
    /// Base64 image payload, present on extracted images.
    pub image_base64: Option<String>,
    /// MIME type of `image_base64` when reported.
    pub image_mime_type: Option<String>,
    /// 1-based page number.
    pub page_number: Option<u32>,
    /// Source file name.
    pub filename: Option<String>,
}

impl Element {
    /// Whether the element carries an image payload.
    pub fn has_image(&self) -> bool {
        self.image_base64
            .as_deref()
            .is_some_and(|payload| !payload.trim().is_empty())
    }
}

/// Turns a document on disk into an ordered list of elements.
#[async_trait]
pub trait Partitioner: Send + Sync {
    /// Partition the file at `path`.
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, PartitionError>;
}

/// Element shape produced by the Unstructured API and its JSON export.
#[derive(Debug, Deserialize)]
pub(crate) struct RawElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    element_id: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    text_as_html: Option<String>,
    #[serde(default)]
    image_base64: Option<String>,
    #[serde(default)]
    image_mime_type: Option<String>,
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    filename: Option<String>,
}

impl RawElement {
    fn into_element(self, position: usize) -> Element {
        let RawElement {
            kind,
            element_id,
            text,
            metadata,
        } = self;
        Element {
            id: element_id.unwrap_or_else(|| format!("element-{position}")),
            category: ElementCategory::from_kind(&kind),
            kind,
            text,
            text_as_html: metadata.text_as_html,
            image_base64: metadata.image_base64,
            image_mime_type: metadata.image_mime_type,
            page_number: metadata.page_number,
            filename: metadata.filename,
        }
    }
}

/// Decode an Unstructured element array.
pub(crate) fn parse_elements(body: &str) -> Result<Vec<Element>, PartitionError> {
    let raw: Vec<RawElement> = serde_json::from_str(body)
        .map_err(|error| PartitionError::InvalidResponse(error.to_string()))?;
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(position, element)| element.into_element(position))
        .collect())
}

/// Fail early when the input file is absent.
pub(crate) fn require_file(path: &Path) -> Result<(), PartitionError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PartitionError::MissingInput(path.to_path_buf()))
    }
}
