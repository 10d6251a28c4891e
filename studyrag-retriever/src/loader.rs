//! Raw text extraction from source documents.
//!
//! The loader dispatches on file extension (case-insensitive):
//!
//! | Extension     | Handling                                              |
//! |---------------|-------------------------------------------------------|
//! | `.txt`, `.md` | read as UTF-8, invalid byte sequences dropped         |
//! | `.pdf`        | text extracted page by page, pages joined with `"\n"` |
//!
//! Anything else fails with [`RetrieverError::UnsupportedFileType`].

use crate::error::{Result, RetrieverError};
use lopdf::Document;
use std::path::Path;
use studyrag_context::decode_utf8_dropping_invalid;
use tracing::{debug, warn};

/// Extensions (without the dot) the loader accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// Kinds of documents the loader can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Markdown,
    Pdf,
}

impl DocumentKind {
    /// Classify `path` by its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match dotted_extension(path).as_str() {
            ".txt" => Ok(Self::Text),
            ".md" => Ok(Self::Markdown),
            ".pdf" => Ok(Self::Pdf),
            other => Err(RetrieverError::UnsupportedFileType {
                extension: other.to_string(),
            }),
        }
    }
}

/// Whether the loader can read `path`, judged by extension alone.
pub fn is_supported(path: &Path) -> bool {
    DocumentKind::from_path(path).is_ok()
}

/// Lower-cased extension with its leading dot, or `""` when there is none.
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Extract the raw text of the document at `path`.
pub async fn load_document(path: &Path) -> Result<String> {
    let kind = DocumentKind::from_path(path)?;

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RetrieverError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    debug!("Loading {:?} document {} ({} bytes)", kind, path.display(), bytes.len());

    match kind {
        DocumentKind::Text | DocumentKind::Markdown => Ok(decode_utf8_dropping_invalid(&bytes)),
        DocumentKind::Pdf => {
            let owned_path = path.to_path_buf();
            tokio::task::spawn_blocking(move || extract_pdf_text(&owned_path, &bytes))
                .await
                .map_err(|e| RetrieverError::PdfExtraction {
                    path: path.to_path_buf(),
                    reason: format!("extraction task failed: {e}"),
                })?
        }
    }
}

/// Concatenate the text of every page, in page order. A page that yields no
/// text contributes an empty string.
fn extract_pdf_text(path: &Path, bytes: &[u8]) -> Result<String> {
    let doc = Document::load_mem(bytes).map_err(|e| RetrieverError::PdfExtraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let pages = doc.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => texts.push(text),
            Err(e) => {
                warn!(
                    "No text extracted from page {} of {}: {}",
                    page_number,
                    path.display(),
                    e
                );
                texts.push(String::new());
            }
        }
    }

    debug!("Extracted {} pages from {}", texts.len(), path.display());
    Ok(texts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// Build a PDF with one text line per page.
    fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            // An empty string gives a page with no content operations
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
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
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
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
        doc.save(path).unwrap();
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            DocumentKind::from_path(Path::new("a/notes.TXT")).unwrap(),
            DocumentKind::Text
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("README.Md")).unwrap(),
            DocumentKind::Markdown
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("paper.pdf")).unwrap(),
            DocumentKind::Pdf
        );
        assert!(is_supported(Path::new("x.md")));
        assert!(!is_supported(Path::new("x.rs")));
    }

    #[test]
    fn test_unsupported_extension_is_dotted_and_lowercased() {
        match DocumentKind::from_path(Path::new("notes.DOCX")) {
            Err(RetrieverError::UnsupportedFileType { extension }) => {
                assert_eq!(extension, ".docx")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match DocumentKind::from_path(Path::new("Makefile")) {
            Err(RetrieverError::UnsupportedFileType { extension }) => assert_eq!(extension, ""),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_drops_invalid_utf8() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello \xff\xfeworld").await.unwrap();

        assert_eq!(load_document(&path).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load_document(&temp_dir.path().join("gone.md"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "path_not_found");
    }

    #[tokio::test]
    async fn test_pdf_pages_joined_in_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("paper.pdf");
        write_pdf(&path, &["First page", "Second page"]);

        let text = load_document(&path).await.unwrap();
        let first = text.find("First").unwrap();
        let second = text.find("Second").unwrap();
        assert!(first < second);
        assert!(text[first..second].contains('\n'));
    }

    #[tokio::test]
    async fn test_blank_page_contributes_empty_text() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("scanned.pdf");
        write_pdf(&path, &["First page", "", "Third page"]);

        let text = load_document(&path).await.unwrap();
        let first_end = text.find("First page").unwrap() + "First page".len();
        let third = text.find("Third page").unwrap();
        let between = &text[first_end..third];
        assert!(between.chars().all(|c| c == '\n'), "unexpected text {between:?}");
        assert!(between.matches('\n').count() >= 2);
    }

    #[tokio::test]
    async fn test_unparseable_pdf() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.pdf");
        tokio::fs::write(&path, b"this is not a pdf").await.unwrap();

        let err = load_document(&path).await.unwrap_err();
        assert_eq!(err.kind(), "pdf_extraction");
    }
}
