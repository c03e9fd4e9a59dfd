//! Per-format text extraction.
//!
//! [`ExtractorRegistry`] is a fixed table from normalized file extension to an
//! [`Extractor`]. The loader consults it once per file; supporting a new
//! format means registering another entry. Extractors receive raw bytes and
//! return plain UTF-8 text, one [`ExtractedText`] per page for paginated
//! formats.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use quick_xml::events::Event;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Shortest run of printable characters kept when scanning legacy `.doc` bytes.
const DOC_MIN_RUN_CHARS: usize = 4;

/// Extraction error. The loader logs it and skips the file.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("file is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("legacy Word extraction failed: {0}")]
    Doc(String),
}

/// One unit of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    /// 1-based page number, for paginated formats.
    pub page: Option<u32>,
}

impl ExtractedText {
    fn whole(text: String) -> Vec<ExtractedText> {
        vec![ExtractedText { text, page: None }]
    }
}

/// A format-specific text extractor.
pub trait Extractor: Send + Sync {
    /// Short format name recorded in document metadata.
    fn format(&self) -> &'static str;
    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedText>, ExtractError>;
}

/// Extension → extractor table.
#[derive(Clone)]
pub struct ExtractorRegistry {
    table: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register `extractor` for `extension` (case-insensitive, leading dot optional).
    pub fn register(&mut self, extension: &str, extractor: Arc<dyn Extractor>) {
        self.table.insert(normalize_extension(extension), extractor);
    }

    pub fn lookup(&self, extension: &str) -> Option<Arc<dyn Extractor>> {
        self.table.get(&normalize_extension(extension)).cloned()
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.table.contains_key(&normalize_extension(extension))
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.table.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for ExtractorRegistry {
    /// `.txt`, `.md`/`.markdown`, `.pdf`, `.doc` and `.docx`.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("txt", Arc::new(PlainTextExtractor));
        let markdown: Arc<dyn Extractor> = Arc::new(MarkdownExtractor);
        registry.register("md", markdown.clone());
        registry.register("markdown", markdown);
        registry.register("pdf", Arc::new(PdfExtractor));
        registry.register("docx", Arc::new(DocxExtractor));
        registry.register("doc", Arc::new(LegacyDocExtractor));
        registry
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

fn decode_utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| ExtractError::Encoding(e.to_string()))
}

// ============ Plain text ============

pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn format(&self) -> &'static str {
        "text"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedText>, ExtractError> {
        Ok(ExtractedText::whole(decode_utf8(bytes)?))
    }
}

// ============ Markdown ============

/// Markdown with the syntax lightly stripped so chunks carry prose, not markup.
pub struct MarkdownExtractor;

impl Extractor for MarkdownExtractor {
    fn format(&self) -> &'static str {
        "markdown"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedText>, ExtractError> {
        Ok(ExtractedText::whole(strip_markdown(&decode_utf8(bytes)?)))
    }
}

/// Remove heading markers, fence lines, emphasis markers and link targets.
pub fn strip_markdown(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for line in src.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }
        let body = if trimmed.starts_with('#') {
            trimmed.trim_start_matches('#').trim_start()
        } else {
            line
        };
        out.push_str(&strip_inline(body));
        out.push('\n');
    }
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

fn strip_inline(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' | '_' | '`' => {}
            // `[label](target)` keeps the label only.
            ']' if chars.peek() == Some(&'(') => {
                for skipped in chars.by_ref() {
                    if skipped == ')' {
                        break;
                    }
                }
            }
            '[' => {}
            '!' if chars.peek() == Some(&'[') => {}
            _ => out.push(c),
        }
    }
    out
}

// ============ PDF ============

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn format(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedText>, ExtractError> {
        // pdf-extract panics on some malformed inputs.
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| ExtractError::Pdf("parser panicked".into()))?
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| ExtractedText {
                text,
                page: Some(i as u32 + 1),
            })
            .collect())
    }
}

// ============ DOCX ============

pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn format(&self) -> &'static str {
        "docx"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedText>, ExtractError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
        Ok(ExtractedText::whole(docx_paragraph_text(&doc_xml)?))
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Concatenate `w:t` runs; each `w:p` paragraph ends with a newline.
fn docx_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

// ============ Legacy .doc ============

/// Best-effort text recovery from binary Word 97-2003 files.
///
/// The OLE container is not parsed; instead the bytes are scanned for runs of
/// printable text, both UTF-16LE (Word's "complex" storage) and 8-bit. The
/// encoding that recovers more characters wins.
pub struct LegacyDocExtractor;

const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

impl Extractor for LegacyDocExtractor {
    fn format(&self) -> &'static str {
        "doc"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedText>, ExtractError> {
        if !bytes.starts_with(OLE_MAGIC) {
            return Err(ExtractError::Doc("missing OLE compound file header".into()));
        }
        let wide = utf16_runs(bytes);
        let narrow = ascii_runs(bytes);
        let best = if wide.chars().count() >= narrow.chars().count() {
            wide
        } else {
            narrow
        };
        if best.trim().is_empty() {
            return Err(ExtractError::Doc("no text runs found".into()));
        }
        Ok(ExtractedText::whole(best))
    }
}

fn is_doc_text_char(c: char) -> bool {
    let cp = c as u32;
    if (0xE000..=0xF8FF).contains(&cp) || cp >= 0xFFF0 {
        return false;
    }
    !c.is_control() || c == '\r' || c == '\n' || c == '\t'
}

fn push_run(out: &mut String, run: &mut String) {
    if run.trim().chars().count() >= DOC_MIN_RUN_CHARS {
        if !out.is_empty() {
            out.push('\n');
        }
        // Word uses `\r` as its paragraph mark.
        out.push_str(run.replace('\r', "\n").trim());
    }
    run.clear();
}

fn utf16_runs(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut run = String::new();
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    for decoded in char::decode_utf16(units) {
        match decoded {
            Ok(c) if is_doc_text_char(c) => run.push(c),
            _ => push_run(&mut out, &mut run),
        }
    }
    push_run(&mut out, &mut run);
    out
}

fn ascii_runs(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut run = String::new();
    for &b in bytes {
        let c = b as char;
        if b.is_ascii() && is_doc_text_char(c) {
            run.push(c);
        } else {
            push_run(&mut out, &mut run);
        }
    }
    push_run(&mut out, &mut run);
    out
}
