//! Document block feed
//!
//! The external extraction step turns a word-processor document into an
//! ordered list of paragraphs with their formatting and any images anchored
//! to them. The parser consumes nothing else.

use serde::{Deserialize, Serialize};

use super::package::AssetReference;

/// One paragraph-level block of the source document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocBlock {
    /// Paragraph text; soft line breaks are kept as `\n`
    #[serde(default)]
    pub text: String,
    /// Paragraph style name ("Title", "Heading1", "Normal", ...)
    #[serde(default)]
    pub style_id: Option<String>,
    #[serde(default)]
    pub is_bold: bool,
    #[serde(default)]
    pub is_italic: bool,
    /// Font size in points, when known
    #[serde(default)]
    pub font_size: Option<f32>,
    /// Images anchored to this paragraph, already written to the working directory
    #[serde(default)]
    pub assets: Vec<AssetReference>,
}

impl DocBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Block without any visible text
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Block carrying images but no text
    pub fn is_asset_only(&self) -> bool {
        self.is_blank() && !self.assets.is_empty()
    }

    /// True for Title / Heading paragraph styles
    pub fn is_heading_style(&self) -> bool {
        self.style_id.as_deref().map_or(false, |style| {
            let style = style.to_lowercase();
            style == "title"
                || style.starts_with("heading")
                || style.starts_with("заголовок")
        })
    }
}

/// Serialized block feed as written by the extraction step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFeed {
    /// Original document name, used as fallback title
    #[serde(default)]
    pub source_file_name: Option<String>,
    pub blocks: Vec<DocBlock>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_only_detection() {
        let mut block = DocBlock::text("   ");
        assert!(block.is_blank());
        assert!(!block.is_asset_only());

        block.assets.push(AssetReference::new("img1.png", "image/png", 10));
        assert!(block.is_asset_only());
    }

    #[test]
    fn test_heading_styles() {
        let mut block = DocBlock::text("Кубок");
        assert!(!block.is_heading_style());

        for style in ["Title", "Heading1", "heading 2", "Заголовок1"] {
            block.style_id = Some(style.to_string());
            assert!(block.is_heading_style(), "{} should be a heading", style);
        }

        block.style_id = Some("Normal".to_string());
        assert!(!block.is_heading_style());
    }

    #[test]
    fn test_feed_deserializes_camel_case() {
        let json = r#"{
            "sourceFileName": "cup.docx",
            "blocks": [
                {"text": "ТУР 1", "styleId": "Heading1", "isBold": true, "fontSize": 16},
                {"text": "", "assets": [{"fileName": "a.png", "relativeUrl": "assets/a.png", "contentType": "image/png", "sizeBytes": 5}]}
            ]
        }"#;
        let feed: DocumentFeed = serde_json::from_str(json).unwrap();
        assert_eq!(feed.blocks.len(), 2);
        assert!(feed.blocks[0].is_bold);
        assert_eq!(feed.blocks[0].font_size, Some(16.0));
        assert!(feed.blocks[1].is_asset_only());
    }
}
