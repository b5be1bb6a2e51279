//! Documents and their read-only segments.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::segment::{Page, SegmentError, SegmentationConfig, merge_pages, split_pages, split_text};

/// Failures while turning a file into segments.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a readable PDF.
    #[error("Failed to parse PDF {path}: {reason}")]
    Pdf {
        /// File that failed.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Invalid window sizes.
    #[error(transparent)]
    Segment(#[from] SegmentError),
}

/// How the content was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Plain text file.
    Text,
    /// PDF, one page per entry.
    Pdf,
    /// A single image.
    Image,
    /// No reader for this file type.
    Unsupported,
}

/// A bounded slice of a document, as handed to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Text content, if any.
    pub text: Option<String>,
    /// Images as `data:` URIs.
    pub images: Vec<String>,
    /// Zero-based position.
    pub index: usize,
    /// Number of segments in the document.
    pub total: usize,
}

impl Segment {
    /// One-based position, as shown to the model.
    #[must_use]
    pub const fn number(&self) -> usize {
        self.index + 1
    }

    /// Whether no segment follows this one.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// A source file and its segments.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    kind: DocumentKind,
    segments: Vec<Segment>,
}

impl Document {
    /// Segments plain text.
    ///
    /// # Errors
    /// Returns an error when the text window is invalid.
    pub fn from_text(
        path: impl Into<PathBuf>,
        text: &str,
        config: &SegmentationConfig,
    ) -> Result<Self, DocumentError> {
        let chunks = if config.enabled {
            split_text(text, config.max_text_length, config.text_overlap)?
        } else {
            vec![text.to_string()]
        };
        let segments = chunks
            .into_iter()
            .map(|t| Page {
                text: Some(t),
                images: Vec::new(),
            })
            .collect();
        Ok(Self::assemble(path.into(), DocumentKind::Text, segments))
    }

    /// Segments a page list produced by a reader.
    ///
    /// # Errors
    /// Returns an error when the page window is invalid.
    pub fn from_pages(
        path: impl Into<PathBuf>,
        kind: DocumentKind,
        pages: &[Page],
        config: &SegmentationConfig,
    ) -> Result<Self, DocumentError> {
        let chunks = if config.enabled {
            split_pages(pages, config.max_pages, config.page_overlap)?
        } else {
            vec![merge_pages(pages)]
        };
        Ok(Self::assemble(path.into(), kind, chunks))
    }

    /// A document no reader understood. It has no segments.
    #[must_use]
    pub fn unsupported(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: DocumentKind::Unsupported,
            segments: Vec::new(),
        }
    }

    fn assemble(path: PathBuf, kind: DocumentKind, chunks: Vec<Page>) -> Self {
        let total = chunks.len();
        let segments = chunks
            .into_iter()
            .enumerate()
            .map(|(index, page)| Segment {
                text: page.text,
                images: page.images,
                index,
                total,
            })
            .collect();
        Self {
            path,
            kind,
            segments,
        }
    }

    /// Source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content kind.
    #[must_use]
    pub const fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Segments in order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// File name shown to the model and used in log lines.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }

    /// File name without extension; prefix of every output file.
    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map_or_else(|| "document".to_string(), |s| s.to_string_lossy().into_owned())
    }
}

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "xml", "html", "htm", "log"];

/// MIME type for an image extension, `application/octet-stream` if unknown.
#[must_use]
pub fn image_mime(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn is_image(extension: &str) -> bool {
    image_mime(extension) != "application/octet-stream"
}

/// Encodes bytes as a base64 `data:` URI.
#[must_use]
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Reads a PDF into one [`Page`] per PDF page, in page order.
///
/// Pages keep their extracted text (`None` when the page has none) and any
/// embedded JPEG images as `data:` URIs. Images in other encodings are
/// skipped with a warning.
///
/// # Errors
/// Returns the parser error when `bytes` are not a readable PDF.
pub fn read_pdf_pages(bytes: &[u8]) -> Result<Vec<Page>, lopdf::Error> {
    let pdf = lopdf::Document::load_mem(bytes)?;

    let mut pages = Vec::new();
    for (number, page_id) in pdf.get_pages() {
        let text = match pdf.extract_text(&[number]) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(event = "pdf_page_text_failed", page = number, error = %e);
                None
            }
        };

        let mut images = Vec::new();
        match pdf.get_page_images(page_id) {
            Ok(found) => {
                for image in found {
                    let jpeg = image
                        .filters
                        .as_ref()
                        .is_some_and(|f| f.iter().any(|name| name == "DCTDecode"));
                    if jpeg {
                        images.push(data_uri("image/jpeg", image.content));
                    } else {
                        tracing::warn!(
                            event = "pdf_image_skipped",
                            page = number,
                            filters = ?image.filters,
                        );
                    }
                }
            }
            Err(e) => tracing::warn!(event = "pdf_page_images_failed", page = number, error = %e),
        }

        pages.push(Page { text, images });
    }
    Ok(pages)
}

/// Reads a file from disk and segments it.
///
/// Text files are decoded as UTF-8, falling back to Latin-1. PDFs are read
/// page by page and segmented as a page list. Images become a single page.
/// Anything else is returned as [`DocumentKind::Unsupported`].
///
/// # Errors
/// Returns an error when the file cannot be read or parsed, or the windows
/// are invalid.
pub fn load_document(path: &Path, config: &SegmentationConfig) -> Result<Document, DocumentError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let read = || {
        std::fs::read(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })
    };

    if extension == "pdf" {
        let pages = read_pdf_pages(&read()?).map_err(|e| DocumentError::Pdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::debug!(event = "pdf_loaded", path = %path.display(), pages = pages.len());
        return Document::from_pages(path, DocumentKind::Pdf, &pages, config);
    }

    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        let bytes = read()?;
        let text = String::from_utf8(bytes)
            .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| char::from(b)).collect());
        return Document::from_text(path, &text, config);
    }

    if is_image(&extension) {
        let bytes = read()?;
        let page = Page {
            text: None,
            images: vec![data_uri(image_mime(&extension), &bytes)],
        };
        return Document::from_pages(path, DocumentKind::Image, &[page], config);
    }

    tracing::warn!(
        event = "unsupported_document",
        path = %path.display(),
        extension = %extension,
    );
    Ok(Document::unsupported(path))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn small_windows() -> SegmentationConfig {
        SegmentationConfig {
            enabled: true,
            max_text_length: 4,
            text_overlap: 1,
            max_pages: 1,
            page_overlap: 0,
        }
    }

    #[test]
    fn test_from_text_positions() {
        let doc = Document::from_text("notes/a.txt", "abcdefghij", &small_windows()).unwrap();
        let segs = doc.segments();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].text.as_deref(), Some("abcd"));
        assert_eq!((segs[2].number(), segs[2].total), (3, 3));
        assert!(segs[2].is_last());
        assert!(!segs[0].is_last());
        assert_eq!(doc.stem(), "a");
        assert_eq!(doc.display_name(), "a.txt");
    }

    #[test]
    fn test_disabled_segmentation_is_single_segment() {
        let config = SegmentationConfig {
            enabled: false,
            ..small_windows()
        };
        let doc = Document::from_text("a.txt", "abcdefghij", &config).unwrap();
        assert_eq!(doc.segments().len(), 1);
        assert_eq!(doc.segments()[0].text.as_deref(), Some("abcdefghij"));
    }

    #[test]
    fn test_load_latin1_text() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(&[b'c', b'a', b'f', 0xE9]).unwrap();

        let doc = load_document(file.path(), &SegmentationConfig::default()).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Text);
        assert_eq!(doc.segments()[0].text.as_deref(), Some("café"));
    }

    #[test]
    fn test_load_image_as_data_uri() {
        let mut file = tempfile::Builder::new().suffix(".PNG").tempfile().unwrap();
        file.write_all(b"\x89PNG").unwrap();

        let doc = load_document(file.path(), &SegmentationConfig::default()).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Image);
        let seg = &doc.segments()[0];
        assert_eq!(seg.text, None);
        assert_eq!(seg.images, vec!["data:image/png;base64,iVBORw==".to_string()]);
    }

    fn write_pdf(path: &Path, page_texts: &[&str]) {
        use lopdf::content::{Content, Operation};
        use lopdf::{Object, Stream, dictionary};

        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font_id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = pdf.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = pdf.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = pdf.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = i64::try_from(kids.len()).unwrap();
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        pdf.trailer.set("Root", catalog_id);
        pdf.save(path).unwrap();
    }

    #[test]
    fn test_pdf_pages_become_page_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        write_pdf(&path, &["Invoice 17", "Total 42"]);

        let doc = load_document(&path, &small_windows()).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Pdf);
        assert_eq!(doc.segments().len(), 2);
        assert!(doc.segments()[0].text.as_deref().unwrap().contains("Invoice 17"));
        assert!(doc.segments()[1].text.as_deref().unwrap().contains("Total 42"));
        assert!(doc.segments()[0].images.is_empty());
    }

    #[test]
    fn test_corrupt_pdf_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"not a pdf at all").unwrap();
        let err = load_document(file.path(), &SegmentationConfig::default());
        assert!(matches!(err, Err(DocumentError::Pdf { .. })));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        let doc = load_document(file.path(), &SegmentationConfig::default()).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Unsupported);
        assert!(doc.segments().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = load_document(Path::new("/no/such/file.txt"), &SegmentationConfig::default());
        assert!(matches!(err, Err(DocumentError::Read { .. })));
    }
}
