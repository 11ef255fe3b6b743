//! Document parsing: bytes + declared media type in, text + page structure out.
//!
//! Validation order matches the error taxonomy: size bound first, then the
//! binary signature against the declared media type, then extraction.
//! Extraction is side-effect-free and never touches the index.
//!
//! Page boundaries are preserved as character spans so passages can report
//! page provenance. Form feeds (`\f`) in extracted text are treated as page
//! separators and stripped from the text the rest of the pipeline sees.

use std::io::Read;

use crate::error::ParseError;
use crate::models::{DocStructure, PageSpan, ParsedDocument};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// What the binary signature says the content is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectedKind {
    Pdf,
    Zip,
    Text,
    Unknown,
}

impl DetectedKind {
    fn label(self) -> &'static str {
        match self {
            DetectedKind::Pdf => "pdf",
            DetectedKind::Zip => "zip archive",
            DetectedKind::Text => "plain text",
            DetectedKind::Unknown => "unknown binary",
        }
    }
}

fn sniff(bytes: &[u8]) -> DetectedKind {
    if bytes.starts_with(b"%PDF-") {
        DetectedKind::Pdf
    } else if bytes.starts_with(b"PK\x03\x04") {
        DetectedKind::Zip
    } else if std::str::from_utf8(bytes).is_ok() {
        DetectedKind::Text
    } else {
        DetectedKind::Unknown
    }
}

/// Validate the cheap, synchronously checkable properties of a document:
/// size bound and declared-type/signature agreement. Runs on the request
/// path before the async pipeline starts.
pub fn validate(bytes: &[u8], media_type: &str, max_bytes: usize) -> Result<(), ParseError> {
    if bytes.len() > max_bytes {
        return Err(ParseError::TooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }

    let detected = sniff(bytes);
    let expected = match media_type {
        MIME_PDF => DetectedKind::Pdf,
        MIME_DOCX => DetectedKind::Zip,
        MIME_TEXT | MIME_MARKDOWN => DetectedKind::Text,
        other => return Err(ParseError::UnsupportedMediaType(other.to_string())),
    };

    if detected != expected {
        return Err(ParseError::FormatMismatch {
            declared: media_type.to_string(),
            detected: detected.label().to_string(),
        });
    }

    Ok(())
}

/// Extract plain text and page structure from a validated document.
///
/// Rejects documents that yield no extractable text — an empty corpus has
/// nothing to index or cite.
pub fn parse(bytes: &[u8], media_type: &str, max_bytes: usize) -> Result<ParsedDocument, ParseError> {
    validate(bytes, media_type, max_bytes)?;

    let raw = match media_type {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_DOCX => extract_docx(bytes)?,
        MIME_TEXT | MIME_MARKDOWN => std::str::from_utf8(bytes)
            .map_err(|e| ParseError::CorruptDocument(format!("invalid UTF-8: {}", e)))?
            .to_string(),
        other => return Err(ParseError::UnsupportedMediaType(other.to_string())),
    };

    let parsed = paginate(&raw);
    if parsed.text.trim().is_empty() {
        return Err(ParseError::CorruptDocument(
            "document contains no extractable text".to_string(),
        ));
    }
    Ok(parsed)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ParseError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ParseError::CorruptDocument(format!("PDF extraction failed: {}", e)))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ParseError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ParseError::CorruptDocument(format!("not a readable archive: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ParseError::CorruptDocument("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ParseError::CorruptDocument(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ParseError::CorruptDocument(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_w_t_elements(&doc_xml)
}

/// Walk `<w:t>` text runs, inserting line breaks at paragraph ends and page
/// separators at explicit page breaks (`<w:br w:type="page"/>`).
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ParseError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"br" {
                    let is_page_break = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| {
                                a.key.local_name().as_ref() == b"type"
                                    && a.value.as_ref() == b"page"
                            })
                            .unwrap_or(false)
                    });
                    out.push(if is_page_break { '\u{c}' } else { '\n' });
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ParseError::CorruptDocument(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Split extracted text on form feeds into page spans, stripping the form
/// feeds from the returned text. Offsets are character offsets into the
/// cleaned text. Text without form feeds becomes a single page.
fn paginate(raw: &str) -> ParsedDocument {
    if !raw.contains('\u{c}') {
        let char_len = raw.chars().count();
        return ParsedDocument {
            text: raw.to_string(),
            structure: DocStructure::single_page(char_len),
        };
    }

    let mut text = String::with_capacity(raw.len());
    let mut pages = Vec::new();
    let mut page_no: u32 = 1;
    let mut page_start: usize = 0;
    let mut offset: usize = 0;

    for ch in raw.chars() {
        if ch == '\u{c}' {
            pages.push(PageSpan {
                page: page_no,
                start: page_start,
                end: offset,
            });
            page_no += 1;
            page_start = offset;
        } else {
            text.push(ch);
            offset += 1;
        }
    }
    pages.push(PageSpan {
        page: page_no,
        start: page_start,
        end: offset,
    });

    ParsedDocument {
        text,
        structure: DocStructure { pages },
    }
}
