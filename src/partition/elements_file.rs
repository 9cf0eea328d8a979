//! Offline partitioner that replays a saved Unstructured element export.

use super::{Element, PartitionError, Partitioner, parse_elements, require_file};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Reads elements from a JSON file instead of calling the partitioning service.
///
/// The document passed to [`Partitioner::partition`] must exist but is only used as the source
/// label; the elements come from the file given at construction.
pub struct ElementsFilePartitioner {
    elements_path: PathBuf,
}

impl ElementsFilePartitioner {
    /// Replay the element array stored at `elements_path`.
    pub fn new(elements_path: impl Into<PathBuf>) -> Self {
        Self {
            elements_path: elements_path.into(),
        }
    }
}

#[async_trait]
impl Partitioner for ElementsFilePartitioner {
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, PartitionError> {
        require_file(path)?;
        require_file(&self.elements_path)?;
        let body = tokio::fs::read_to_string(&self.elements_path)
            .await
            .map_err(|source| PartitionError::Io {
                path: self.elements_path.clone(),
                source,
            })?;
        let elements = parse_elements(&body)?;
        tracing::info!(
            document = %path.display(),
            elements_file = %self.elements_path.display(),
            elements = elements.len(),
            "Loaded saved elements"
        );
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::ElementCategory;

    #[tokio::test]
    async fn replays_saved_elements() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").expect("write pdf");
        let path = dir.path().join("elements.json");
        std::fs::write(
            &path,
            r#"[{"type": "Table", "text": "x", "metadata": {"text_as_html": "<table></table>"}}]"#,
        )
        .expect("write");

        let elements = ElementsFilePartitioner::new(&path)
            .partition(&pdf)
            .await
            .expect("elements");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].category, ElementCategory::Table);
    }

    #[tokio::test]
    async fn missing_export_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").expect("write pdf");
        let missing = dir.path().join("nope.json");

        let error = ElementsFilePartitioner::new(&missing)
            .partition(&pdf)
            .await
            .unwrap_err();
        assert!(matches!(error, PartitionError::MissingInput(path) if path == missing));
    }

    #[tokio::test]
    async fn missing_document_is_reported_even_with_saved_elements() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("elements.json");
        std::fs::write(&path, "[]").expect("write");
        let missing_pdf = dir.path().join("absent.pdf");

        let error = ElementsFilePartitioner::new(&path)
            .partition(&missing_pdf)
            .await
            .unwrap_err();
        assert!(matches!(error, PartitionError::MissingInput(path) if path == missing_pdf));
    }
}
