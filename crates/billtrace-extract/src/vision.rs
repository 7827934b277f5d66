//! Vision extractor boundary and HTTP backend.
//!
//! The pipeline treats the vision model as an opaque, possibly slow,
//! possibly failing external call. A single failure propagates as
//! [`billtrace_core::Error::Extraction`]; there is no retry layer here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use billtrace_core::{defaults, Error, QuickExtraction, Result};

use crate::prompts::{BILL_EXTRACTION_PROMPT, MULTI_PAGE_NOTE, QUICK_SCAN_PROMPT};
use crate::raster::PageImage;

/// Backend for extracting bill data from rendered page images.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    /// Extract only invoice/account number and confidence from one page.
    async fn quick_extract(&self, image: &PageImage) -> Result<QuickExtraction>;

    /// Extract the full bill payload from all pages. Returns the raw JSON;
    /// the validator turns it into a typed result.
    async fn full_extract(&self, images: &[PageImage]) -> Result<serde_json::Value>;

    /// Check if the vision backend is available.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// HTTP vision backend speaking the local-inference generate API.
pub struct HttpVisionExtractor {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpVisionExtractor {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
            timeout_secs: 120,
        }
    }

    /// Create from environment variables.
    /// Returns None if the model variable is not set.
    pub fn from_env() -> Option<Self> {
        let model = std::env::var(defaults::ENV_VISION_MODEL).ok()?;
        if model.is_empty() {
            return None;
        }
        let base_url = std::env::var(defaults::ENV_VISION_BASE_URL)
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        Some(Self::new(base_url, model))
    }

    async fn generate(&self, prompt: String, images: &[PageImage]) -> Result<String> {
        use base64::Engine;

        let encoded: Vec<String> = images
            .iter()
            .map(|img| base64::engine::general_purpose::STANDARD.encode(&img.data))
            .collect();

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            images: encoded,
            stream: false,
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("Vision request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "Vision API returned {}: {}",
                status, body
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to parse vision response: {}", e)))?;

        Ok(result.response)
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    images: Vec<String>, // base64 encoded
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Quick-scan wire shape returned by the model.
#[derive(Deserialize)]
struct QuickScanWire {
    #[serde(rename = "invoiceNumber")]
    invoice_number: String,
    #[serde(rename = "accountNumber")]
    account_number: String,
    confidence: i32,
}

#[async_trait]
impl VisionExtractor for HttpVisionExtractor {
    async fn quick_extract(&self, image: &PageImage) -> Result<QuickExtraction> {
        let reply = self
            .generate(QUICK_SCAN_PROMPT.to_string(), std::slice::from_ref(image))
            .await?;

        let json = strip_code_fences(&reply);
        let wire: QuickScanWire = serde_json::from_str(json)
            .map_err(|e| Error::Extraction(format!("Malformed quick-scan reply: {}", e)))?;

        debug!(
            subsystem = "extract",
            component = "vision",
            op = "quick_extract",
            invoice_number = %wire.invoice_number,
            confidence = wire.confidence,
            "Quick extraction complete"
        );

        Ok(QuickExtraction {
            invoice_number: wire.invoice_number,
            account_number: wire.account_number,
            confidence: wire.confidence,
        })
    }

    async fn full_extract(&self, images: &[PageImage]) -> Result<serde_json::Value> {
        let prompt = if images.len() > 1 {
            format!("{}{}", BILL_EXTRACTION_PROMPT, MULTI_PAGE_NOTE)
        } else {
            BILL_EXTRACTION_PROMPT.to_string()
        };

        let reply = self.generate(prompt, images).await?;
        let json = strip_code_fences(&reply);

        serde_json::from_str(json)
            .map_err(|e| Error::Extraction(format!("Malformed extraction reply: {}", e)))
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Strip markdown code fences models wrap around JSON replies.
pub(crate) fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_start_matches(['\r', '\n'])
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(data: &[u8]) -> PageImage {
        PageImage {
            data: data.to_vec(),
            mime_type: "image/png".to_string(),
            page: 1,
        }
    }

    #[test]
    fn test_strip_code_fences_plain() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fences_json_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fences_bare_fence() {
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fences_whitespace() {
        assert_eq!(strip_code_fences("  \n{\"a\": 1}\n  "), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_quick_extract_against_wiremock() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "```json\n{\"invoiceNumber\": \"B1-176644802\", \"accountNumber\": \"BA11639924\", \"confidence\": 88}\n```"
            })))
            .mount(&server)
            .await;

        let extractor = HttpVisionExtractor::new(server.uri(), "test-vision".to_string());
        let result = extractor.quick_extract(&page(b"png-bytes")).await.unwrap();

        assert_eq!(result.invoice_number, "B1-176644802");
        assert_eq!(result.account_number, "BA11639924");
        assert_eq!(result.confidence, 88);
    }

    #[tokio::test]
    async fn test_full_extract_propagates_server_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let extractor = HttpVisionExtractor::new(server.uri(), "test-vision".to_string());
        let err = extractor
            .full_extract(&[page(b"png-bytes")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "extraction");
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_full_extract_rejects_non_json_reply() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "I could not read this document, sorry."
            })))
            .mount(&server)
            .await;

        let extractor = HttpVisionExtractor::new(server.uri(), "test-vision".to_string());
        let err = extractor
            .full_extract(&[page(b"png-bytes")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "extraction");
    }
}
