//! Document loading: files on disk to [`RawDocument`]s.
//!
//! The format is detected from the file extension (case-insensitive):
//!
//! | Extension | Format | Extraction |
//! |---|---|---|
//! | `.txt` | [`DocumentFormat::Txt`] | strict UTF-8 (a leading BOM is dropped) |
//! | `.pdf` | [`DocumentFormat::Pdf`] | text layer via `pdf-extract` |
//! | `.docx` | [`DocumentFormat::Docx`] | `word/document.xml` runs, see [`docx`] |
//!
//! Anything else is [`LoadError::UnsupportedFormat`]. The path string as given
//! by the caller becomes the document's `source_id`.

pub mod docx;

use crate::error::LoadError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Txt,
    Docx,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Extensions accepted by [`FileLoader`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "docx"];

/// Full text of one source document. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub source_id: String,
    pub text: String,
    pub format: DocumentFormat,
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Whether `load` would attempt this path at all.
    fn can_load(&self, path: &Path) -> bool;

    async fn load(&self, path: &Path) -> Result<RawDocument, LoadError>;
}

/// Loads `.txt`, `.pdf` and `.docx` files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

#[async_trait]
impl DocumentLoader for FileLoader {
    fn can_load(&self, path: &Path) -> bool {
        DocumentFormat::from_path(path).is_some()
    }

    async fn load(&self, path: &Path) -> Result<RawDocument, LoadError> {
        load(path).await
    }
}

/// Load a single file, dispatching on its extension.
pub async fn load(path: &Path) -> Result<RawDocument, LoadError> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| LoadError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    let bytes = tokio::fs::read(path).await.map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    let owned_path = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || extract_text(&owned_path, format, bytes))
        .await
        // pdf-extract panics on some malformed files; the panic surfaces here
        .map_err(|e| LoadError::corrupt(path, format!("extraction aborted: {e}")))??;

    Ok(RawDocument {
        source_id: path.to_string_lossy().to_string(),
        text,
        format,
    })
}

/// Extract text from file bytes already in memory.
pub fn extract_text(
    path: &Path,
    format: DocumentFormat,
    bytes: Vec<u8>,
) -> Result<String, LoadError> {
    match format {
        DocumentFormat::Txt => {
            let text = String::from_utf8(bytes).map_err(|source| LoadError::Encoding {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(match text.strip_prefix('\u{feff}') {
                Some(stripped) => stripped.to_string(),
                None => text,
            })
        }
        DocumentFormat::Pdf => {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| LoadError::corrupt(path, e))
        }
        DocumentFormat::Docx => {
            docx::extract_text(&bytes).map_err(|e| LoadError::corrupt(path, e))
        }
    }
}
