//! Unstructured API client: `POST {url}/general/v0/general` with a multipart upload.

use super::{Element, PartitionError, Partitioner, parse_elements, require_file};
use crate::config::Config;
use crate::http::{build_client, format_endpoint, normalize_base_url};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::path::Path;

const PARTITION_PATH: &str = "general/v0/general";

/// Connection settings for the Unstructured API.
#[derive(Debug, Clone)]
pub struct UnstructuredSettings {
    /// Service root, e.g. `https://api.unstructuredapp.io`.
    pub api_url: String,
    /// Value of the `unstructured-api-key` header.
    pub api_key: Option<String>,
    /// Partitioning strategy (`hi_res` for layout-aware table and image extraction).
    pub strategy: String,
}

impl UnstructuredSettings {
    /// Settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_url: config.unstructured_api_url.clone(),
            api_key: config.unstructured_api_key.clone(),
            strategy: config.partition_strategy.clone(),
        }
    }
}

/// Partitioner backed by the hosted or self-hosted Unstructured API.
pub struct UnstructuredPartitioner {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    strategy: String,
}

impl UnstructuredPartitioner {
    /// Build a partitioner from explicit settings.
    pub fn new(settings: UnstructuredSettings) -> Result<Self, PartitionError> {
        let base_url =
            normalize_base_url(&settings.api_url).map_err(PartitionError::Configuration)?;
        let client = build_client("partition")?;
        tracing::debug!(
            url = %base_url,
            strategy = %settings.strategy,
            has_api_key = settings.api_key.as_deref().is_some_and(|key| !key.is_empty()),
            "Initialized Unstructured client"
        );
        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key,
            strategy: settings.strategy,
        })
    }

    fn build_form(&self, file_name: String, bytes: Vec<u8>) -> Result<Form, PartitionError> {
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")?;
        Ok(Form::new()
            .part("files", part)
            .text("strategy", self.strategy.clone())
            .text("pdf_infer_table_structure", "true")
            .text("extract_image_block_types", "[\"Image\"]"))
    }
}

#[async_trait]
impl Partitioner for UnstructuredPartitioner {
    async fn partition(&self, path: &Path) -> Result<Vec<Element>, PartitionError> {
        require_file(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| PartitionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        tracing::info!(
            file = %path.display(),
            bytes = bytes.len(),
            strategy = %self.strategy,
            "Partitioning document"
        );

        let mut request = self
            .client
            .post(format_endpoint(&self.base_url, PARTITION_PATH))
            .header("accept", "application/json")
            .multipart(self.build_form(file_name, bytes)?);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.header("unstructured-api-key", api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = PartitionError::UnexpectedStatus { status, body };
            tracing::error!(file = %path.display(), error = %error, "Partitioning failed");
            return Err(error);
        }

        let body = response.text().await?;
        let elements = parse_elements(&body)?;
        tracing::info!(file = %path.display(), elements = elements.len(), "Partitioned document");
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::ElementCategory;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::io::Write;

    fn partitioner(server: &MockServer) -> UnstructuredPartitioner {
        UnstructuredPartitioner::new(UnstructuredSettings {
            api_url: server.base_url(),
            api_key: Some("unstructured-key".into()),
            strategy: "hi_res".into(),
        })
        .expect("partitioner")
    }

    fn sample_pdf() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .expect("temp file");
        file.write_all(b"%PDF-1.4 sample").expect("write");
        file
    }

    #[tokio::test]
    async fn uploads_file_with_hi_res_options() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/general/v0/general")
                    .header("unstructured-api-key", "unstructured-key")
                    .body_contains("hi_res")
                    .body_contains("pdf_infer_table_structure")
                    .body_contains("extract_image_block_types");
                then.status(200).json_body(json!([
                    { "type": "Title", "element_id": "a", "text": "Intro", "metadata": {} },
                    { "type": "NarrativeText", "element_id": "b", "text": "Body", "metadata": {} }
                ]));
            })
            .await;

        let file = sample_pdf();
        let elements = partitioner(&server)
            .partition(file.path())
            .await
            .expect("elements");

        mock.assert_async().await;
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].category, ElementCategory::Title);
        assert_eq!(elements[1].kind, "NarrativeText");
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/general/v0/general");
                then.status(422).body("bad file");
            })
            .await;

        let file = sample_pdf();
        let error = partitioner(&server)
            .partition(file.path())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            PartitionError::UnexpectedStatus { status, .. } if status.as_u16() == 422
        ));
    }

    #[tokio::test]
    async fn missing_file_fails_before_any_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/general/v0/general");
                then.status(200).json_body(json!([]));
            })
            .await;

        let error = partitioner(&server)
            .partition(Path::new("does/not/exist.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(error, PartitionError::MissingInput(_)));
        mock.assert_hits_async(0).await;
    }
}
