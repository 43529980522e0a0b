//! Documents loaded for reading and the checks applied to uploads.
//!
//! Text extraction itself is an external collaborator behind
//! [`TextExtractor`] and [`PageTextSource`]; this module validates what goes
//! in and what comes out and keeps track of the page being read.

use crate::config::DocumentsConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, info, warn};

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Word,
    Manual,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Word => "Word",
            DocumentKind::Manual => "text",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("file is too large ({size}); the maximum is {max_mb} MB")]
    TooLarge { size: String, max_mb: u64 },
    #[error("unsupported file format for {name}; use PDF or Word (.docx, .doc)")]
    UnsupportedFormat { name: String },
    #[error("PDF has too many pages ({pages}); the maximum is {max}")]
    TooManyPages { pages: usize, max: usize },
    #[error("Word document is too long (about {estimated_pages} pages); the maximum is {max}")]
    TooLong { estimated_pages: usize, max: usize },
    #[error("no text could be extracted from the document")]
    EmptyText,
    #[error("text extraction failed: {0}")]
    Extraction(String),
    #[error("no extractor available for {0} documents")]
    ExtractorUnavailable(DocumentKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLimits {
    pub max_file_size_bytes: u64,
    pub max_pdf_pages: usize,
    pub max_word_pages: usize,
    pub chars_per_page_estimate: usize,
}

impl Default for DocumentLimits {
    fn default() -> Self {
        Self::from(&DocumentsConfig::default())
    }
}

impl From<&DocumentsConfig> for DocumentLimits {
    fn from(config: &DocumentsConfig) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_mb.saturating_mul(BYTES_PER_MB),
            max_pdf_pages: config.max_pdf_pages,
            max_word_pages: config.max_word_pages,
            chars_per_page_estimate: config.chars_per_page_estimate.max(1),
        }
    }
}

/// Output of a text extractor: the raw text and how many pages it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: usize,
}

pub trait TextExtractor {
    fn kind(&self) -> DocumentKind;
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, DocumentError>;
}

/// Page-addressable text, e.g. an open PDF. Pages are numbered from 1.
pub trait PageTextSource {
    fn page_count(&self) -> usize;
    fn page_text(&self, page: usize) -> anyhow::Result<String>;
}

/// Treats the input bytes as UTF-8 text on a single page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Manual
    }

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, DocumentError> {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        if text.is_empty() {
            return Err(DocumentError::EmptyText);
        }
        Ok(ExtractedDocument {
            text,
            page_count: 1,
        })
    }
}

/// Human-readable size using binary units, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

/// Check an upload's size and format before extraction.
pub fn validate_upload(
    name: &str,
    mime: &str,
    size_bytes: u64,
    limits: &DocumentLimits,
) -> Result<DocumentKind, DocumentError> {
    if size_bytes > limits.max_file_size_bytes {
        return Err(DocumentError::TooLarge {
            size: format_file_size(size_bytes),
            max_mb: limits.max_file_size_bytes / BYTES_PER_MB,
        });
    }

    let lower = name.to_lowercase();
    if mime == PDF_MIME || lower.ends_with(".pdf") {
        return Ok(DocumentKind::Pdf);
    }
    if mime == DOCX_MIME || lower.ends_with(".docx") || lower.ends_with(".doc") {
        return Ok(DocumentKind::Word);
    }
    Err(DocumentError::UnsupportedFormat {
        name: name.to_string(),
    })
}

/// Check extracted content against the per-format limits.
pub fn check_extracted(
    kind: DocumentKind,
    extracted: &ExtractedDocument,
    limits: &DocumentLimits,
) -> Result<(), DocumentError> {
    match kind {
        DocumentKind::Pdf => {
            if extracted.page_count > limits.max_pdf_pages {
                return Err(DocumentError::TooManyPages {
                    pages: extracted.page_count,
                    max: limits.max_pdf_pages,
                });
            }
        }
        DocumentKind::Word => {
            let chars = extracted.text.trim().chars().count();
            if chars == 0 {
                return Err(DocumentError::EmptyText);
            }
            let estimated_pages = chars.div_ceil(limits.chars_per_page_estimate);
            if estimated_pages > limits.max_word_pages {
                return Err(DocumentError::TooLong {
                    estimated_pages,
                    max: limits.max_word_pages,
                });
            }
        }
        DocumentKind::Manual => {}
    }
    Ok(())
}

/// Validate, extract, and check an upload in one go.
pub fn import_document(
    name: &str,
    mime: &str,
    bytes: &[u8],
    extractor: &dyn TextExtractor,
    limits: &DocumentLimits,
) -> Result<Document, DocumentError> {
    let kind = validate_upload(name, mime, bytes.len() as u64, limits)?;
    if extractor.kind() != kind {
        return Err(DocumentError::ExtractorUnavailable(kind));
    }
    let extracted = extractor.extract(bytes)?;
    check_extracted(kind, &extracted, limits)?;
    info!(
        name,
        %kind,
        pages = extracted.page_count,
        chars = extracted.text.chars().count(),
        size = %format_file_size(bytes.len() as u64),
        "Document loaded"
    );
    Ok(Document::from_extracted(name, kind, extracted))
}

fn document_id(title: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct Document {
    id: String,
    title: String,
    kind: DocumentKind,
    text: String,
    page_count: usize,
    current_page: usize,
    source: Option<Box<dyn PageTextSource>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("kind", &self.kind)
            .field("chars", &self.text.chars().count())
            .field("page_count", &self.page_count)
            .field("current_page", &self.current_page)
            .field("paged", &self.source.is_some())
            .finish()
    }
}

impl Document {
    /// Text typed or pasted by the user.
    pub fn manual(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::from_extracted(
            title,
            DocumentKind::Manual,
            ExtractedDocument {
                text: text.into(),
                page_count: 1,
            },
        )
    }

    pub fn from_extracted(
        title: impl Into<String>,
        kind: DocumentKind,
        extracted: ExtractedDocument,
    ) -> Self {
        let title = title.into();
        Self {
            id: document_id(&title, &extracted.text),
            title,
            kind,
            text: extracted.text,
            page_count: extracted.page_count.max(1),
            current_page: 1,
            source: None,
        }
    }

    /// Open a paged PDF, loading only `initial_page` (clamped to range).
    pub fn from_pages(
        title: impl Into<String>,
        source: Box<dyn PageTextSource>,
        initial_page: usize,
        limits: &DocumentLimits,
    ) -> Result<Self, DocumentError> {
        let page_count = source.page_count();
        if page_count == 0 {
            return Err(DocumentError::EmptyText);
        }
        if page_count > limits.max_pdf_pages {
            return Err(DocumentError::TooManyPages {
                pages: page_count,
                max: limits.max_pdf_pages,
            });
        }
        let page = initial_page.clamp(1, page_count);
        let text = load_page(source.as_ref(), page)?;
        let title = title.into();
        Ok(Self {
            id: document_id(&title, &text),
            title,
            kind: DocumentKind::Pdf,
            text,
            page_count,
            current_page: page,
            source: Some(source),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn is_paged(&self) -> bool {
        self.source.is_some()
    }

    /// Replace the current text with `page`. Returns whether the page changed.
    pub fn go_to_page(&mut self, page: usize) -> Result<bool, DocumentError> {
        let Some(source) = self.source.as_deref() else {
            debug!(page, "Document has no page source; ignoring page change");
            return Ok(false);
        };
        if page < 1 || page > self.page_count {
            warn!(page, page_count = self.page_count, "Page out of range");
            return Ok(false);
        }
        if page == self.current_page {
            return Ok(false);
        }
        self.text = load_page(source, page)?;
        self.current_page = page;
        debug!(page, chars = self.text.chars().count(), "Loaded page");
        Ok(true)
    }

    pub fn next_page(&mut self) -> Result<bool, DocumentError> {
        self.go_to_page(self.current_page + 1)
    }

    pub fn prev_page(&mut self) -> Result<bool, DocumentError> {
        match self.current_page.checked_sub(1) {
            Some(page) if page >= 1 => self.go_to_page(page),
            _ => Ok(false),
        }
    }
}

fn load_page(source: &dyn PageTextSource, page: usize) -> Result<String, DocumentError> {
    source
        .page_text(page)
        .map(|text| text.trim().to_string())
        .map_err(|err| DocumentError::Extraction(format!("page {page}: {err:#}")))
}
