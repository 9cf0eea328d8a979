//! JSON export of processed multi-modal chunks.

use crate::processing::indexer::ORIGINAL_CONTENT_KEY;
use crate::processing::types::{EnhancedChunk, ProcessingError};
use serde_json::{Value, json};
use std::path::Path;

/// Write `chunks` as a pretty-printed JSON array to `path`.
///
/// Each entry is `{chunk_id, enhanced_content, metadata: {original_content: {...}}}`, with
/// `original_content` kept as a nested object rather than the string stored in the index.
pub fn export_chunks(path: &Path, chunks: &[EnhancedChunk]) -> Result<(), ProcessingError> {
    let entries: Vec<Value> = chunks
        .iter()
        .map(|chunk| {
            json!({
                "chunk_id": chunk.chunk_id,
                "enhanced_content": chunk.enhanced_content,
                "metadata": {
                    ORIGINAL_CONTENT_KEY: chunk.bundle.to_metadata_value(),
                },
            })
        })
        .collect();

    let body = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, body).map_err(|source| ProcessingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), chunks = chunks.len(), "Exported chunks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::classify::ContentBundle;
    use crate::processing::summarize::SummarySource;

    #[test]
    fn export_matches_documented_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chunks.json");
        let chunks = vec![EnhancedChunk {
            chunk_id: 1,
            enhanced_content: "Search text".into(),
            bundle: ContentBundle::new("raw".into(), vec!["<table/>".into()], vec![]),
            source: "doc.pdf".into(),
            summary_source: SummarySource::Generated,
        }];

        export_chunks(&path, &chunks).expect("export");
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");

        assert_eq!(
            written,
            json!([{
                "chunk_id": 1,
                "enhanced_content": "Search text",
                "metadata": {
                    "original_content": {
                        "raw_text": "raw",
                        "tables_html": ["<table/>"],
                        "images_base64": []
                    }
                }
            }])
        );
    }

    #[test]
    fn unwritable_path_reports_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("chunks.json");
        let error = export_chunks(&path, &[]).unwrap_err();
        assert!(matches!(error, ProcessingError::Io { .. }));
    }
}
