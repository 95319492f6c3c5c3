//! Hosted OCR backends, tried before local PDF extraction when configured.
//!
//! Defines the [`OcrProvider`] trait so backends can be swapped through
//! `OCR_BACKEND`. A failing or blank OCR pass never fails an upload: the
//! extractor falls back to reading the PDF text layer itself.

pub mod landing_ai;
pub mod mistral;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Settings;
use crate::extractor::ExtractionSource;

/// Per-page OCR output (always 1-indexed).
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub page_num: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct OcrResult {
    pub pages: Vec<OcrPage>,
}

impl OcrResult {
    /// Page text concatenated in page order with no separator.
    pub fn text(&self) -> String {
        let mut pages: Vec<&OcrPage> = self.pages.iter().collect();
        pages.sort_by_key(|p| p.page_num);
        pages.into_iter().map(|p| p.text.as_str()).collect()
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    fn source(&self) -> ExtractionSource;
    async fn process(&self, filename: &str, data: &[u8]) -> anyhow::Result<OcrResult>;
}

/// Known provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    MistralOcr,
    LandingAi,
}

impl OcrProviderKind {
    /// Parse an `OCR_BACKEND` value. `Ok(None)` means OCR is switched off.
    pub fn parse(s: &str) -> Result<Option<Self>, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(None),
            "mistral" | "mistral_ocr" => Ok(Some(Self::MistralOcr)),
            "landing_ai" | "landingai" => Ok(Some(Self::LandingAi)),
            other => Err(format!(
                "unknown OCR backend '{other}' (expected none, mistral or landing_ai)"
            )),
        }
    }
}

/// Build the configured provider. A backend without credentials is logged
/// and left disabled rather than failing startup.
pub fn build_provider(settings: &Settings, client: reqwest::Client) -> Option<Arc<dyn OcrProvider>> {
    let kind = settings.ocr_backend?;
    let provider: Arc<dyn OcrProvider> = match kind {
        OcrProviderKind::MistralOcr => match &settings.mistral_api_key {
            Some(key) => Arc::new(mistral::MistralOcrProvider::new(key.clone(), client)),
            None => {
                warn!("OCR_BACKEND=mistral but MISTRAL_API_KEY is not set; OCR disabled");
                return None;
            }
        },
        OcrProviderKind::LandingAi => match &settings.landing_ai_api_key {
            Some(key) => Arc::new(landing_ai::LandingAiProvider::new(key.clone(), client)),
            None => {
                warn!("OCR_BACKEND=landing_ai but LANDINGAI_API_KEY is not set; OCR disabled");
                return None;
            }
        },
    };
    info!("OCR provider enabled: {}", provider.name());
    Some(provider)
}
