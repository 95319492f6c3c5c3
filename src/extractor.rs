//! Text extraction for uploaded reports, with an optional hosted OCR pass.

use std::fmt::Display;
use std::io::Cursor;
use std::sync::Arc;

use lopdf::Document;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ReportError;
use crate::ocr::OcrProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl DocumentFormat {
    /// Detect from the filename suffix, then the declared media type.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Result<Self, ReportError> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            return Ok(Self::Pdf);
        }
        if lower.ends_with(".txt") {
            return Ok(Self::PlainText);
        }

        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_lowercase());
        match media_type.as_deref() {
            Some("application/pdf") => Ok(Self::Pdf),
            Some("text/plain") => Ok(Self::PlainText),
            _ => Err(ReportError::UnsupportedFormat {
                extension: lower
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_string())
                    .unwrap_or_default(),
            }),
        }
    }
}

/// Which backend produced a report's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    PlainText,
    Pdf,
    MistralOcr,
    LandingAi,
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub source: ExtractionSource,
}

/// Turns uploaded bytes into report text.
pub struct TextExtractor {
    ocr: Option<Arc<dyn OcrProvider>>,
}

impl TextExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrProvider>>) -> Self {
        Self { ocr }
    }

    /// Extract text, rejecting results that are empty or whitespace-only.
    pub async fn extract(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> Result<Extracted, ReportError> {
        let format = DocumentFormat::detect(filename, content_type)?;

        let extracted = match format {
            DocumentFormat::PlainText => Extracted {
                text: String::from_utf8(data)?,
                source: ExtractionSource::PlainText,
            },
            DocumentFormat::Pdf => self.extract_pdf(filename, data).await?,
        };

        if extracted.text.trim().is_empty() {
            return Err(ReportError::EmptyExtraction);
        }

        info!(
            "Extracted {} chars from {} via {:?}",
            extracted.text.chars().count(),
            filename,
            extracted.source
        );
        Ok(extracted)
    }

    async fn extract_pdf(&self, filename: &str, data: Vec<u8>) -> Result<Extracted, ReportError> {
        if let Some(ocr) = &self.ocr {
            match ocr.process(filename, &data).await {
                Ok(result) if !result.text().trim().is_empty() => {
                    return Ok(Extracted {
                        text: result.text(),
                        source: ocr.source(),
                    });
                }
                Ok(_) => warn!(
                    "{} returned no text for {}, falling back to local extraction",
                    ocr.name(),
                    filename
                ),
                Err(e) => warn!(
                    "{} failed for {}: {:#}, falling back to local extraction",
                    ocr.name(),
                    filename,
                    e
                ),
            }
        }

        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&data))
            .await
            .map_err(|e| ReportError::ExtractionFailed(format!("PDF worker failed: {e}")))??;

        Ok(Extracted {
            text,
            source: ExtractionSource::Pdf,
        })
    }
}

/// Extract text from every page of a PDF, in page order, using lopdf.
pub fn extract_pdf_text(data: &[u8]) -> Result<String, ReportError> {
    let doc = Document::load_from(Cursor::new(data))
        .map_err(|e| ReportError::ExtractionFailed(format!("Failed to load PDF: {e}")))?;

    let pages = doc.get_pages();
    debug!("PDF has {} pages", pages.len());

    Ok(concat_pages(
        pages
            .into_keys()
            .map(|page_num| (page_num, doc.extract_text(&[page_num]))),
    ))
}

/// Join per-page text with no separator; a failed page contributes nothing.
fn concat_pages<E: Display>(pages: impl IntoIterator<Item = (u32, Result<String, E>)>) -> String {
    let mut text = String::new();
    for (page_num, page) in pages {
        match page {
            Ok(content) => text.push_str(&content),
            Err(e) => debug!("Page {} yielded no text: {}", page_num, e),
        }
    }
    text
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ocr::{OcrPage, OcrResult};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build a PDF with one page per entry; an empty entry is a page with no text.
    pub(crate) fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    struct StubOcr {
        reply: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl OcrProvider for StubOcr {
        fn name(&self) -> &str {
            "stub_ocr"
        }

        fn source(&self) -> ExtractionSource {
            ExtractionSource::MistralOcr
        }

        async fn process(&self, _filename: &str, _data: &[u8]) -> anyhow::Result<OcrResult> {
            match self.reply {
                Some(text) => Ok(OcrResult {
                    pages: vec![OcrPage {
                        page_num: 1,
                        text: text.to_string(),
                    }],
                }),
                None => anyhow::bail!("OCR API error (503): unavailable"),
            }
        }
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            DocumentFormat::detect("report.PDF", None).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::detect("notes.txt", None).unwrap(),
            DocumentFormat::PlainText
        );
        assert_eq!(
            DocumentFormat::detect("scan", Some("application/pdf")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::detect("blob", Some("text/plain; charset=utf-8")).unwrap(),
            DocumentFormat::PlainText
        );
        assert!(matches!(
            DocumentFormat::detect("scan.docx", Some("application/octet-stream")),
            Err(ReportError::UnsupportedFormat { extension }) if extension == "docx"
        ));
    }

    #[test]
    fn test_concat_pages_skips_failed_pages() {
        let pages: Vec<(u32, Result<String, String>)> = vec![
            (1, Ok("Hemoglobin 13.5 g/dL".to_string())),
            (2, Err("unsupported filter".to_string())),
            (3, Ok(String::new())),
            (4, Ok("WBC 6.1".to_string())),
        ];
        assert_eq!(concat_pages(pages), "Hemoglobin 13.5 g/dLWBC 6.1");
    }

    #[test]
    fn test_pdf_pages_in_order() {
        let pdf = pdf_with_pages(&["Alpha", "", "Bravo"]);
        let text = extract_pdf_text(&pdf).unwrap();

        let alpha = text.find("Alpha").unwrap();
        let bravo = text.find("Bravo").unwrap();
        assert!(alpha < bravo);
    }

    #[test]
    fn test_invalid_pdf_fails() {
        assert!(matches!(
            extract_pdf_text(b"not a pdf"),
            Err(ReportError::ExtractionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_text_is_exact_utf8() {
        let extractor = TextExtractor::new(None);
        let body = "Patient has mild hypertension.\nरक्तचाप 150/95\n";
        let extracted = extractor
            .extract("report.txt", Some("text/plain"), body.as_bytes().to_vec())
            .await
            .unwrap();
        assert_eq!(extracted.text, body);
        assert_eq!(extracted.source, ExtractionSource::PlainText);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decode_failure() {
        let extractor = TextExtractor::new(None);
        let result = extractor
            .extract("report.txt", None, vec![0x66, 0x6f, 0xff, 0xfe])
            .await;
        assert!(matches!(result, Err(ReportError::DecodeFailure(_))));
    }

    #[tokio::test]
    async fn test_blank_results_are_rejected() {
        let extractor = TextExtractor::new(None);
        let result = extractor
            .extract("blank.txt", None, b"  \n\t ".to_vec())
            .await;
        assert!(matches!(result, Err(ReportError::EmptyExtraction)));

        let result = extractor
            .extract("blank.pdf", None, pdf_with_pages(&["", ""]))
            .await;
        assert!(matches!(result, Err(ReportError::EmptyExtraction)));
    }

    #[tokio::test]
    async fn test_ocr_text_is_preferred() {
        let extractor = TextExtractor::new(Some(Arc::new(StubOcr {
            reply: Some("# Lipid panel"),
        })));
        let extracted = extractor
            .extract("labs.pdf", None, pdf_with_pages(&["Local"]))
            .await
            .unwrap();
        assert_eq!(extracted.text, "# Lipid panel");
        assert_eq!(extracted.source, ExtractionSource::MistralOcr);
    }

    #[tokio::test]
    async fn test_ocr_failure_falls_back_to_local() {
        for reply in [None, Some("   ")] {
            let extractor = TextExtractor::new(Some(Arc::new(StubOcr { reply })));
            let extracted = extractor
                .extract("labs.pdf", None, pdf_with_pages(&["Local"]))
                .await
                .unwrap();
            assert!(extracted.text.contains("Local"));
            assert_eq!(extracted.source, ExtractionSource::Pdf);
        }
    }

    #[tokio::test]
    async fn test_ocr_not_used_for_plain_text() {
        let extractor = TextExtractor::new(Some(Arc::new(StubOcr {
            reply: Some("from ocr"),
        })));
        let extracted = extractor
            .extract("notes.txt", None, b"from file".to_vec())
            .await
            .unwrap();
        assert_eq!(extracted.text, "from file");
    }
}
