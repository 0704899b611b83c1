//! Content types for MCP protocol messages

use serde::{Deserialize, Serialize};

/// Content item in a tool result or prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Content {
    /// Text content
    #[serde(rename = "text")]
    Text(TextContent),

    /// Image content
    #[serde(rename = "image")]
    Image(ImageContent),

    /// Embedded resource
    #[serde(rename = "resource")]
    Resource(EmbeddedResource),
}

impl Content {
    /// Text of this item, if it has any
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            Content::Resource(embedded) => embedded.resource.text.as_deref(),
            Content::Image(_) => None,
        }
    }

    /// Concatenate the text of every item, one per line
    pub fn join_text(items: &[Content]) -> String {
        items
            .iter()
            .filter_map(Content::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text content provided to or from an LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

/// Image content, base64 encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub data: String,
    pub mime_type: String,
}

/// Embedded resource in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedResource {
    pub resource: ResourceContents,
}

/// Contents of a read resource; text or binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_text_skips_images() {
        let items: Vec<Content> = serde_json::from_value(json!([
            {"type": "text", "text": "Dolphins live in oceans."},
            {"type": "image", "data": "aGk=", "mimeType": "image/png"},
            {"type": "resource", "resource": {"uri": "animal://dolphin", "text": "Smart."}}
        ]))
        .unwrap();
        assert_eq!(Content::join_text(&items), "Dolphins live in oceans.\nSmart.");
    }
}
