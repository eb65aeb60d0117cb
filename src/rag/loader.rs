//! Document loading for ingestion.
//!
//! Walks a folder for `.txt`, `.md`, `.docx` and `.pdf` files and extracts
//! their plain text. A file that cannot be parsed is reported and skipped;
//! only a missing folder fails the whole load.

use crate::types::{AppError, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Source format of a loaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Plain text or markdown
    Text,
    /// Office Open XML word document
    Word,
    Pdf,
}

impl DocumentFormat {
    /// Format for a path, judged by extension. `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(DocumentFormat::Text),
            "docx" => Some(DocumentFormat::Word),
            "pdf" => Some(DocumentFormat::Pdf),
            _ => None,
        }
    }
}

/// Raw text of one source file. Discarded once chunked.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
    pub format: DocumentFormat,
}

/// A file skipped during ingestion.
#[derive(Debug, Clone)]
pub struct IngestionError {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for IngestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Outcome of loading a folder.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub errors: Vec<IngestionError>,
}

/// Load every supported file under `folder`, in sorted path order.
///
/// Blocking; call through `spawn_blocking` from async code.
pub fn load_folder(folder: &Path) -> Result<LoadReport> {
    if !folder.is_dir() {
        return Err(AppError::Ingestion(format!(
            "Folder not found: {}",
            folder.display()
        )));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    let mut report = LoadReport::default();

    for entry in WalkDir::new(folder).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                if DocumentFormat::from_path(entry.path()).is_some() {
                    paths.push(entry.into_path());
                }
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                warn!(path = ?path, error = %e, "Skipping unreadable entry");
                report.errors.push(IngestionError {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }
    paths.sort();

    for path in paths {
        match load_file(&path) {
            Ok(doc) => {
                debug!(path = ?doc.path, chars = doc.text.chars().count(), "Loaded document");
                report.documents.push(doc);
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Skipping document");
                report.errors.push(IngestionError {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        folder = ?folder,
        documents = report.documents.len(),
        skipped = report.errors.len(),
        "Loaded folder"
    );
    Ok(report)
}

/// Load a single supported file.
pub fn load_file(path: &Path) -> Result<Document> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        AppError::Ingestion(format!("Unsupported file type: {}", path.display()))
    })?;

    let text = match format {
        DocumentFormat::Text => {
            let bytes = fs::read(path)?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        DocumentFormat::Word => read_docx(path)?,
        DocumentFormat::Pdf => read_pdf(path)?,
    };

    Ok(Document {
        path: path.to_path_buf(),
        text,
        format,
    })
}

fn read_docx(path: &Path) -> Result<String> {
    let file = fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| AppError::Ingestion(format!("Not a valid docx archive: {}", e)))?;
    let mut part = archive
        .by_name("word/document.xml")
        .map_err(|e| AppError::Ingestion(format!("Missing document body: {}", e)))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(docx_xml_to_text(&xml))
}

static PARAGRAPH_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</w:p>|<w:br\s*/>|<w:cr\s*/>").expect("valid regex"));
static TAB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<w:tab\s*/>").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Plain text of a `word/document.xml` body: paragraphs and breaks become
/// newlines, tabs stay tabs, every other tag is dropped.
pub fn docx_xml_to_text(xml: &str) -> String {
    let text = PARAGRAPH_END.replace_all(xml, "\n");
    let text = TAB.replace_all(&text, "\t");
    let text = TAG.replace_all(&text, "");
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    text.trim_end().to_string()
}

fn read_pdf(path: &Path) -> Result<String> {
    // pdf-extract panics on some malformed files instead of returning an error
    let owned = path.to_path_buf();
    let result = std::panic::catch_unwind(move || pdf_extract::extract_text(&owned));

    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(AppError::Ingestion(format!("PDF parse failed: {}", e))),
        Err(_) => Err(AppError::Ingestion("PDF parser panicked".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/notes.MD")),
            Some(DocumentFormat::Text)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("report.docx")),
            Some(DocumentFormat::Word)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("paper.pdf")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("image.png")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_load_folder_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();
        fs::write(dir.path().join("a.md"), "first").unwrap();
        fs::write(dir.path().join("sub").join("c.txt"), "third").unwrap();
        fs::write(dir.path().join("ignored.png"), [0u8, 1, 2]).unwrap();

        let report = load_folder(dir.path()).unwrap();
        let texts: Vec<_> = report.documents.iter().map(|d| d.text.as_str()).collect();

        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_broken_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.txt"), "fine").unwrap();
        fs::write(dir.path().join("broken.docx"), "not a zip").unwrap();

        let report = load_folder(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].path.ends_with("broken.docx"));
    }

    #[test]
    fn test_missing_folder_is_fatal() {
        let result = load_folder(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(AppError::Ingestion(_))));
    }

    #[test]
    fn test_docx_xml_to_text() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:tab/><w:t>world &amp; co</w:t></w:r></w:p><w:p><w:r><w:t>Line two</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(docx_xml_to_text(xml), "Hello\tworld & co\nLine two");
    }

    #[test]
    fn test_read_docx_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.docx");

        let file = fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(b"<w:document><w:p><w:t>From word</w:t></w:p></w:document>")
            .unwrap();
        writer.finish().unwrap();

        let doc = load_file(&path).unwrap();
        assert_eq!(doc.format, DocumentFormat::Word);
        assert_eq!(doc.text, "From word");
    }
}
