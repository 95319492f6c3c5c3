//! LandingAI agentic document analysis provider.

use super::{OcrPage, OcrProvider, OcrResult};
use crate::extractor::ExtractionSource;
use serde::Deserialize;
use tracing::info;

const LANDING_AI_URL: &str = "https://api.va.landing.ai/v1/tools/agentic-document-analysis";

pub struct LandingAiProvider {
    api_key: String,
    client: reqwest::Client,
}

impl LandingAiProvider {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self { api_key, client }
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    data: AnalysisData,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisData {
    #[serde(default)]
    markdown: String,
}

impl From<AnalysisResponse> for OcrResult {
    /// The API returns one markdown document for the whole file.
    fn from(resp: AnalysisResponse) -> Self {
        OcrResult {
            pages: vec![OcrPage {
                page_num: 1,
                text: resp.data.markdown,
            }],
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for LandingAiProvider {
    fn name(&self) -> &str {
        "landing_ai"
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::LandingAi
    }

    async fn process(&self, filename: &str, data: &[u8]) -> anyhow::Result<OcrResult> {
        use reqwest::multipart::{Form, Part};

        info!(
            "LandingAiProvider: analysing {} ({} bytes)",
            filename,
            data.len()
        );

        let part = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;

        let form = Form::new()
            .part("pdf", part)
            .text("include_marginalia", "true")
            .text("include_metadata_in_markdown", "true");

        let resp = self
            .client
            .post(LANDING_AI_URL)
            .header("Authorization", format!("Basic {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("LandingAI API error ({}): {}", status, text);
        }

        let analysis: AnalysisResponse = resp.json().await?;
        Ok(analysis.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_is_read_from_data() {
        let resp: AnalysisResponse = serde_json::from_str(
            r###"{"data":{"markdown":"## CBC\nHemoglobin 13.5","chunks":[]},"errors":[]}"###,
        )
        .unwrap();
        let result: OcrResult = resp.into();
        assert_eq!(result.text(), "## CBC\nHemoglobin 13.5");
    }

    #[test]
    fn test_missing_data_is_blank() {
        let resp: AnalysisResponse = serde_json::from_str(r#"{"errors":["bad file"]}"#).unwrap();
        let result: OcrResult = resp.into();
        assert!(result.text().is_empty());
    }
}
