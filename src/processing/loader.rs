//! Plain-text document loading.

use crate::processing::types::ProcessingError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A text document read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path the content was read from.
    pub source: PathBuf,
    /// File content.
    pub content: String,
}

/// Read every `*.txt` file directly inside `dir`, sorted by path.
///
/// A missing directory or one without text files is reported before any external call.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>, ProcessingError> {
    if !dir.is_dir() {
        return Err(ProcessingError::InvalidInput(format!(
            "directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(ProcessingError::InvalidInput(format!(
            "no text files found in {}",
            dir.display()
        )));
    }

    let documents = paths
        .into_iter()
        .map(|path| {
            let content = std::fs::read_to_string(&path).map_err(|source| ProcessingError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(
                source = %path.display(),
                chars = content.chars().count(),
                "Loaded document"
            );
            Ok(Document {
                source: path,
                content,
            })
        })
        .collect::<Result<Vec<_>, ProcessingError>>()?;

    tracing::info!(dir = %dir.display(), documents = documents.len(), "Loaded documents");
    Ok(documents)
}
