//! Separation of a chunk into text, HTML tables, and base64 images.

use crate::partition::ElementCategory;
use crate::processing::title_chunker::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of content present in a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Running text; always present.
    Text,
    /// At least one table.
    Table,
    /// At least one image.
    Image,
}

impl ContentType {
    /// Lowercase label stored in record metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Image => "image",
        }
    }
}

/// Classified content of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBundle {
    /// Full chunk text.
    pub raw_text: String,
    /// HTML for each table, in document order.
    pub tables_html: Vec<String>,
    /// Base64 payload for each image, in document order.
    pub images_base64: Vec<String>,
    /// Content types present; always contains [`ContentType::Text`].
    pub types: BTreeSet<ContentType>,
}

/// Serialized shape stored under `original_content`.
#[derive(Serialize, Deserialize)]
struct OriginalContent {
    raw_text: String,
    tables_html: Vec<String>,
    images_base64: Vec<String>,
}

impl ContentBundle {
    /// Bundle from its parts, deriving `types`.
    pub fn new(raw_text: String, tables_html: Vec<String>, images_base64: Vec<String>) -> Self {
        let mut types = BTreeSet::from([ContentType::Text]);
        if !tables_html.is_empty() {
            types.insert(ContentType::Table);
        }
        if !images_base64.is_empty() {
            types.insert(ContentType::Image);
        }
        Self {
            raw_text,
            tables_html,
            images_base64,
            types,
        }
    }

    /// Whether the bundle needs a model-written description.
    pub fn is_multimodal(&self) -> bool {
        !self.tables_html.is_empty() || !self.images_base64.is_empty()
    }

    /// Labels of [`ContentBundle::types`] in a stable order.
    pub fn type_labels(&self) -> Vec<&'static str> {
        self.types.iter().map(|kind| kind.as_str()).collect()
    }

    /// Encode as the `{raw_text, tables_html, images_base64}` JSON string.
    pub fn to_metadata_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&OriginalContent {
            raw_text: self.raw_text.clone(),
            tables_html: self.tables_html.clone(),
            images_base64: self.images_base64.clone(),
        })
    }

    /// Same shape as [`ContentBundle::to_metadata_json`], as a JSON value for exports.
    pub fn to_metadata_value(&self) -> serde_json::Value {
        serde_json::json!({
            "raw_text": self.raw_text,
            "tables_html": self.tables_html,
            "images_base64": self.images_base64,
        })
    }

    /// Decode a string written by [`ContentBundle::to_metadata_json`].
    pub fn from_metadata_json(json: &str) -> Result<Self, serde_json::Error> {
        let content: OriginalContent = serde_json::from_str(json)?;
        Ok(Self::new(
            content.raw_text,
            content.tables_html,
            content.images_base64,
        ))
    }
}

/// Split a chunk's elements into text, tables, and images.
pub fn classify(chunk: &Chunk) -> ContentBundle {
    let mut tables_html = Vec::new();
    let mut images_base64 = Vec::new();

    for element in &chunk.elements {
        match element.category {
            ElementCategory::Table => {
                let html = element
                    .text_as_html
                    .as_deref()
                    .filter(|html| !html.trim().is_empty())
                    .unwrap_or(&element.text);
                tables_html.push(html.to_string());
            }
            ElementCategory::Image => {
                if let Some(payload) = element.image_base64.as_deref()
                    && !payload.trim().is_empty()
                {
                    images_base64.push(payload.to_string());
                }
            }
            ElementCategory::Title | ElementCategory::Text => {}
        }
    }

    ContentBundle::new(chunk.text.clone(), tables_html, images_base64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Element;
    use proptest::prelude::*;

    fn element(category: ElementCategory, text: &str) -> Element {
        Element {
            id: text.to_string(),
            category,
            kind: format!("{category:?}"),
            text: text.to_string(),
            text_as_html: None,
            image_base64: None,
            image_mime_type: None,
            page_number: Some(1),
            filename: Some("doc.pdf".into()),
        }
    }

    #[test]
    fn text_only_chunk_has_text_type() {
        let chunk = Chunk {
            text: "Plain paragraph".into(),
            elements: vec![element(ElementCategory::Text, "Plain paragraph")],
        };
        let bundle = classify(&chunk);
        assert_eq!(bundle.raw_text, "Plain paragraph");
        assert!(bundle.tables_html.is_empty());
        assert!(bundle.images_base64.is_empty());
        assert_eq!(bundle.type_labels(), vec!["text"]);
        assert!(!bundle.is_multimodal());
    }

    #[test]
    fn tables_and_images_are_collected() {
        let mut table = element(ElementCategory::Table, "a b");
        table.text_as_html = Some("<table><tr><td>a</td><td>b</td></tr></table>".into());
        let bare_table = element(ElementCategory::Table, "c d");
        let mut image = element(ElementCategory::Image, "");
        image.image_base64 = Some("iVBORw0KGgo=".into());
        let empty_image = element(ElementCategory::Image, "caption");

        let chunk = Chunk {
            text: "a b\n\nc d\n\ncaption".into(),
            elements: vec![table, bare_table, image, empty_image],
        };
        let bundle = classify(&chunk);

        assert_eq!(
            bundle.tables_html,
            vec![
                "<table><tr><td>a</td><td>b</td></tr></table>".to_string(),
                "c d".to_string()
            ]
        );
        assert_eq!(bundle.images_base64, vec!["iVBORw0KGgo=".to_string()]);
        assert_eq!(bundle.type_labels(), vec!["text", "table", "image"]);
        assert!(bundle.is_multimodal());
    }

    #[test]
    fn metadata_json_uses_documented_keys() {
        let bundle = ContentBundle::new("t".into(), vec!["<table/>".into()], vec![]);
        let json = bundle.to_metadata_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("value");
        assert_eq!(value["raw_text"], "t");
        assert_eq!(value["tables_html"][0], "<table/>");
        assert!(value["images_base64"].as_array().expect("array").is_empty());
        assert_eq!(value, bundle.to_metadata_value());
    }

    proptest! {
        #[test]
        fn metadata_round_trip_is_exact(
            raw_text in ".*",
            tables in proptest::collection::vec(".*", 0..4),
            images in proptest::collection::vec("[A-Za-z0-9+/]{0,40}={0,2}", 0..4),
        ) {
            let bundle = ContentBundle::new(raw_text, tables, images);
            let json = bundle.to_metadata_json().expect("encode");
            let restored = ContentBundle::from_metadata_json(&json).expect("decode");
            prop_assert_eq!(restored, bundle);
        }
    }
}
