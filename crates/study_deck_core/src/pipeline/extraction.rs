//! Page-by-page text extraction from a source document.

use tracing::{info, warn};

use crate::json::parse_model_json;
use crate::ports::{
    Attachment, MultimodalGenerationService, MultimodalRequest, PortError, PortResult,
};

const EXTRACTION_PROMPT: &str = "Extract the text content from this document PAGE BY PAGE.\n\
This is a lecture slide deck or other educational material.\n\n\
IMPORTANT: Return the content as a JSON array where each element is the MARKDOWN-formatted content of ONE page.\n\
Format: [\"# Page 1 Title\\n\\nContent...\", \"# Page 2 Title\\n\\nContent...\", ...]\n\n\
For each page:\n\
- Use Markdown formatting (# headings, - bullet points, **bold**)\n\
- Use LaTeX for ALL mathematical expressions: $inline$ and $$block$$\n\
- Include all headings, bullet points and key concepts from that page\n\
- Keep the content concise but complete\n\n\
Return ONLY the JSON array, no markdown code blocks around it.";

/// Builds the single multimodal request carrying the document inline.
pub fn extraction_request(document: &[u8], mime_type: &str) -> MultimodalRequest {
    MultimodalRequest {
        prompt: EXTRACTION_PROMPT.to_string(),
        attachments: vec![Attachment::from_bytes(mime_type, document)],
        wants_image: false,
    }
}

/// Parses the model's page list.
///
/// Non-string entries are kept as their JSON text. Output that is not a JSON
/// array becomes a single page holding the raw response.
pub fn parse_pages(raw: &str) -> Vec<String> {
    match parse_model_json::<Vec<serde_json::Value>>(raw) {
        Ok(entries) => entries
            .into_iter()
            .map(|entry| match entry {
                serde_json::Value::String(page) => page,
                other => other.to_string(),
            })
            .collect(),
        Err(e) => {
            warn!("[Extract] Failed to parse pages JSON, falling back to a single chunk: {}", e);
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                vec![raw.to_string()]
            }
        }
    }
}

/// Runs extraction and returns the ordered page texts. An extraction with
/// no pages is an error.
pub async fn extract_pages(
    multimodal: &dyn MultimodalGenerationService,
    document: &[u8],
    mime_type: &str,
) -> PortResult<Vec<String>> {
    let response = multimodal
        .generate_multimodal(extraction_request(document, mime_type))
        .await?;
    info!("[Extract] Model response length: {}", response.text.len());

    let pages = parse_pages(&response.text);
    if pages.is_empty() {
        return Err(PortError::Unexpected(
            "No content could be extracted from the document".to_string(),
        ));
    }
    info!("[Extract] Parsed {} pages", pages.len());
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_page_arrays() {
        let raw = "```json\n[\"# One\", \"# Two\", {\"table\": 1}]\n```";
        assert_eq!(parse_pages(raw), vec!["# One", "# Two", "{\"table\":1}"]);
    }

    #[test]
    fn unparseable_output_becomes_one_page() {
        let raw = "Page one text. Page two text.";
        assert_eq!(parse_pages(raw), vec![raw.to_string()]);
    }

    #[test]
    fn blank_output_yields_no_pages() {
        assert!(parse_pages("  ").is_empty());
        assert!(parse_pages("[]").is_empty());
    }

    #[test]
    fn request_carries_the_document_inline() {
        let request = extraction_request(b"%PDF-1.7", "application/pdf");
        assert_eq!(request.attachments.len(), 1);
        assert_eq!(request.attachments[0].data_base64, "JVBERi0xLjc=");
        assert!(!request.wants_image);
    }
}
