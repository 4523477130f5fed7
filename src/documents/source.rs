//! Documentation inputs handed to the extractor.
//!
//! Parsing PDFs or fetching URLs is the job of an external collaborator;
//! the engine only consumes the already-extracted text and images.

use serde::{Deserialize, Serialize};

/// An image extracted from a document, typically an ERD diagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub page_number: Option<u32>,
    pub data: Vec<u8>,
    /// File format such as `png`, `jpeg`, `gif`.
    pub format: String,
}

impl ExtractedImage {
    /// MIME type for this image, defaulting to PNG for unknown formats.
    pub fn media_type(&self) -> &'static str {
        match self.format.to_lowercase().as_str() {
            "png" => "image/png",
            "jpeg" | "jpg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "bmp" => "image/bmp",
            _ => "image/png",
        }
    }
}

/// A parsed documentation source: free text plus any embedded images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentationSource {
    /// Original file path or URL, used for provenance in logs and results.
    pub source_path: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<ExtractedImage>,
}

impl DocumentationSource {
    pub fn from_text(source_path: impl Into<String>, content: impl Into<String>) -> Self {
        DocumentationSource {
            source_path: source_path.into(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_types() {
        let mut img = ExtractedImage {
            page_number: Some(3),
            data: vec![1, 2, 3],
            format: "JPG".to_string(),
        };
        assert_eq!(img.media_type(), "image/jpeg");
        img.format = "tiff".to_string();
        assert_eq!(img.media_type(), "image/png");
    }
}
