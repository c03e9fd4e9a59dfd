//! Multi-format extraction through the document loader.
//!
//! Fixtures are built in code: a minimal PDF with a correct xref table and a
//! minimal DOCX (ZIP with `word/document.xml`).

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rag_index::config::Config;
use rag_index::extract::{ExtractError, ExtractedText, Extractor, ExtractorRegistry};
use rag_index::loader::DocumentLoader;
use rag_index::IndexError;
use tempfile::TempDir;

/// Minimal valid PDF whose single page reads "quarterly audit phrase".
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    let content = b"BT /F1 12 Tf 100 700 Td (quarterly audit phrase) Tj ET";
    out.extend_from_slice(format!("4 0 obj << /Length {} >> stream\n", content.len()).as_bytes());
    out.extend_from_slice(content);
    out.extend_from_slice(b"\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn minimal_docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn setup() -> (TempDir, std::path::PathBuf, Config) {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let mut config = Config::minimal(tmp.path().join("store"));
    config.corpus.root = docs.clone();
    (tmp, docs, config)
}

fn loader(config: &Config) -> DocumentLoader {
    DocumentLoader::new(config, ExtractorRegistry::default()).unwrap()
}

fn write(dir: &Path, name: &str, bytes: &[u8]) {
    fs::write(dir.join(name), bytes).unwrap();
}

#[tokio::test]
async fn pdf_pages_are_extracted_with_page_numbers() {
    let (_tmp, docs, config) = setup();
    write(&docs, "report.pdf", &minimal_pdf_with_phrase());

    let documents = loader(&config).scan(&docs).await.unwrap();
    assert_eq!(documents.len(), 1);
    let doc = &documents[0];
    assert_eq!(doc.source, "report.pdf");
    assert_eq!(doc.metadata.format, "pdf");
    assert_eq!(doc.metadata.page, Some(1));
    assert!(doc.text.contains("quarterly audit phrase"), "got {:?}", doc.text);
}

#[tokio::test]
async fn docx_paragraphs_become_lines() {
    let (_tmp, docs, config) = setup();
    write(
        &docs,
        "memo.docx",
        &minimal_docx_with_paragraphs(&["First paragraph", "Second &amp; last"]),
    );

    let documents = loader(&config).scan(&docs).await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].metadata.format, "docx");
    assert_eq!(documents[0].metadata.page, None);
    assert_eq!(documents[0].text, "First paragraph\nSecond & last");
}

#[tokio::test]
async fn markdown_and_text_are_read_as_utf8() {
    let (_tmp, docs, config) = setup();
    write(&docs, "notes.md", "# Heading\n\nSome **bold** prose.\n".as_bytes());
    write(&docs, "plain.TXT", "Grüße aus Köln".as_bytes());

    let documents = loader(&config).scan(&docs).await.unwrap();
    let sources: Vec<&str> = documents.iter().map(|d| d.source.as_str()).collect();
    assert_eq!(sources, vec!["notes.md", "plain.TXT"]);
    assert!(documents[0].text.contains("Heading"));
    assert!(documents[0].text.contains("bold"));
    assert_eq!(documents[1].text, "Grüße aus Köln");
}

#[tokio::test]
async fn corrupt_and_unsupported_files_are_skipped() {
    let (_tmp, docs, config) = setup();
    write(&docs, "good.txt", b"keep me");
    write(&docs, "broken.pdf", b"%PDF-1.4 this is not really a pdf");
    write(&docs, "broken.docx", b"PK not a zip archive");
    write(&docs, "latin1.txt", &[0x66, 0x6f, 0xff, 0xfe]);
    write(&docs, "image.png", &[0x89, 0x50, 0x4e, 0x47]);
    write(&docs, "blank.md", b"   \n\n  ");

    let files = loader(&config).scan_files(&docs).await.unwrap();
    let sources: Vec<&str> = files.iter().map(|f| f.source.as_str()).collect();
    assert_eq!(sources, vec!["good.txt"]);
}

#[tokio::test]
async fn only_unreadable_files_is_empty_corpus() {
    let (_tmp, docs, config) = setup();
    write(&docs, "broken.pdf", b"not a pdf");

    let err = loader(&config).scan(&docs).await.unwrap_err();
    assert!(matches!(err, IndexError::EmptyCorpus { .. }));
}

#[tokio::test]
async fn digest_tracks_file_bytes() {
    let (_tmp, docs, config) = setup();
    write(&docs, "a.docx", &minimal_docx_with_paragraphs(&["same"]));
    write(&docs, "b.txt", b"version one");
    let loader = loader(&config);

    let first = loader.scan_files(&docs).await.unwrap();
    let again = loader.scan_files(&docs).await.unwrap();
    assert_eq!(first[0].digest, again[0].digest);
    assert_eq!(first[1].digest, again[1].digest);

    write(&docs, "b.txt", b"version two");
    let changed = loader.scan_files(&docs).await.unwrap();
    assert_eq!(first[0].digest, changed[0].digest);
    assert_ne!(first[1].digest, changed[1].digest);
}

struct CsvExtractor;

impl Extractor for CsvExtractor {
    fn format(&self) -> &'static str {
        "csv"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Vec<ExtractedText>, ExtractError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractError::Encoding(e.to_string()))?
            .replace(',', " ");
        Ok(vec![ExtractedText { text, page: None }])
    }
}

#[tokio::test]
async fn registering_an_extractor_adds_a_format() {
    let (_tmp, docs, config) = setup();
    write(&docs, "table.csv", b"name,team\nada,compilers\n");

    let err = loader(&config).scan(&docs).await.unwrap_err();
    assert!(matches!(err, IndexError::EmptyCorpus { .. }));

    let mut registry = ExtractorRegistry::default();
    registry.register(".CSV", Arc::new(CsvExtractor));
    let loader = DocumentLoader::new(&config, registry).unwrap();
    assert!(loader.registry().supports("csv"));

    let documents = loader.scan(&docs).await.unwrap();
    assert_eq!(documents[0].metadata.format, "csv");
    assert_eq!(documents[0].text, "name team\nada compilers\n");
}
