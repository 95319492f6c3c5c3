//! Mistral OCR provider (uses Mistral's OCR API).

use super::{OcrPage, OcrProvider, OcrResult};
use crate::extractor::ExtractionSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MISTRAL_API_URL: &str = "https://api.mistral.ai/v1";
const OCR_MODEL: &str = "mistral-ocr-latest";

pub struct MistralOcrProvider {
    api_key: String,
    client: reqwest::Client,
}

impl MistralOcrProvider {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self { api_key, client }
    }
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: DocumentSource,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "file")]
    File { file_id: String },
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<MistralPage>,
}

#[derive(Deserialize)]
struct MistralPage {
    index: u32,
    markdown: String,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

impl From<OcrResponse> for OcrResult {
    fn from(ocr: OcrResponse) -> Self {
        OcrResult {
            pages: ocr
                .pages
                .into_iter()
                .map(|p| OcrPage {
                    page_num: p.index + 1, // Normalize 0-indexed → 1-indexed
                    text: p.markdown,
                })
                .collect(),
        }
    }
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &str {
        "mistral_ocr"
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::MistralOcr
    }

    async fn process(&self, filename: &str, data: &[u8]) -> anyhow::Result<OcrResult> {
        let file_id = self.upload_file(filename, data).await?;

        let body = OcrRequest {
            model: OCR_MODEL,
            document: DocumentSource::File { file_id },
        };

        info!("MistralOcrProvider: calling OCR API for {}", filename);

        let resp = self
            .client
            .post(format!("{MISTRAL_API_URL}/ocr"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mistral OCR API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "MistralOcrProvider: raw response ({} bytes)",
            raw_text.len()
        );
        let ocr: OcrResponse = serde_json::from_str(&raw_text)?;
        Ok(ocr.into())
    }
}

impl MistralOcrProvider {
    /// Upload raw bytes to Mistral Files API, return the file_id.
    async fn upload_file(&self, filename: &str, data: &[u8]) -> anyhow::Result<String> {
        use reqwest::multipart::{Form, Part};

        info!(
            "MistralOcrProvider: uploading {} ({} bytes) to Files API",
            filename,
            data.len()
        );

        let part = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;

        let form = Form::new().part("file", part).text("purpose", "ocr");

        let resp = self
            .client
            .post(format!("{MISTRAL_API_URL}/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mistral Files API error ({}): {}", status, text);
        }

        let upload: FileUploadResponse = resp.json().await?;
        debug!("MistralOcrProvider: uploaded file_id={}", upload.id);
        Ok(upload.id)
    }
}
