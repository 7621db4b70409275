//! NERA Parser - Text source adaptation
//!
//! Normalizes a single input unit into a [`RawDocument`]:
//! - Raw strings submitted inline
//! - Uploaded file content (bytes)
//! - Files discovered under a directory, filtered by extension
//!
//! Decoding is UTF-8 with a best-effort lossy fallback; it never fails.
//! Empty input is rejected as a validation failure that the batch driver
//! records and skips.

use std::path::{Path, PathBuf};

use nera_core::{NeraError, Result};
use tracing::{debug, warn};

// ============================================================================
// File Types
// ============================================================================

/// Text file types accepted as input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    PlainText,
    Markdown,
    Csv,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "txt" | "text" => Self::PlainText,
            "md" | "markdown" => Self::Markdown,
            "csv" => Self::Csv,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Get MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Csv => "text/csv",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Whether content of this type can be analysed as text
    pub fn is_text(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlainText => write!(f, "text"),
            Self::Markdown => write!(f, "markdown"),
            Self::Csv => write!(f, "csv"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Raw Documents
// ============================================================================

/// A decoded, validated input ready for extraction
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Source identifier (path or generated id)
    pub source_id: String,

    /// Decoded text
    pub text: String,

    /// Whether invalid UTF-8 sequences were replaced while decoding
    pub lossy: bool,
}

/// Decode a payload into a [`RawDocument`]
///
/// Invalid UTF-8 is replaced with U+FFFD. Text that is empty or only
/// whitespace is a [`NeraError::Validation`].
pub fn adapt(source_id: impl Into<String>, bytes: Vec<u8>) -> Result<RawDocument> {
    let source_id = source_id.into();

    let (text, lossy) = match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(err) => {
            warn!(source_id = %source_id, "input is not valid UTF-8, decoding lossily");
            (String::from_utf8_lossy(err.as_bytes()).into_owned(), true)
        }
    };

    adapt_text(source_id, text).map(|mut doc| {
        doc.lossy = lossy;
        doc
    })
}

/// Validate an already-decoded string
pub fn adapt_text(source_id: impl Into<String>, text: impl Into<String>) -> Result<RawDocument> {
    let text = text.into();
    if text.trim().is_empty() {
        return Err(NeraError::empty_input());
    }

    Ok(RawDocument {
        source_id: source_id.into(),
        text,
        lossy: false,
    })
}

/// Read a file and adapt its content
pub fn read_source(path: &Path) -> Result<RawDocument> {
    let bytes = std::fs::read(path).map_err(|e| NeraError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    adapt(path.display().to_string(), bytes)
}

// ============================================================================
// Input Sets
// ============================================================================

/// One unit of batch input, not yet read or decoded
#[derive(Debug, Clone)]
pub enum InputItem {
    /// Inline text with a generated id
    Text { source_id: String, text: String },
    /// Uploaded content
    Bytes { source_id: String, bytes: Vec<u8> },
    /// File on disk; read lazily by the worker that processes it
    File { path: PathBuf, size: u64 },
}

impl InputItem {
    /// Source identifier used for ordering and reporting
    pub fn source_id(&self) -> String {
        match self {
            Self::Text { source_id, .. } | Self::Bytes { source_id, .. } => source_id.clone(),
            Self::File { path, .. } => path.display().to_string(),
        }
    }

    /// Size in bytes, used to enforce batch byte limits
    pub fn byte_len(&self) -> u64 {
        match self {
            Self::Text { text, .. } => text.len() as u64,
            Self::Bytes { bytes, .. } => bytes.len() as u64,
            Self::File { size, .. } => *size,
        }
    }

    /// Load and adapt this item
    pub fn load(self) -> Result<RawDocument> {
        match self {
            Self::Text { source_id, text } => adapt_text(source_id, text),
            Self::Bytes { source_id, bytes } => adapt(source_id, bytes),
            Self::File { path, .. } => read_source(&path),
        }
    }
}

/// Generate the id for the n-th inline text (zero-based)
///
/// Ids are zero-padded so that lexicographic order matches submission order.
pub fn text_id(index: usize) -> String {
    format!("text-{:06}", index + 1)
}

/// An unordered collection of inputs
#[derive(Debug, Clone, Default)]
pub struct InputSet {
    pub items: Vec<InputItem>,
}

impl InputSet {
    /// Build an input set from inline texts
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| InputItem::Text {
                source_id: text_id(i),
                text: text.into(),
            })
            .collect();
        Self { items }
    }

    /// Build an input set from a file or a directory
    pub fn from_path(root: &Path, extensions: &[String], recursive: bool) -> Result<Self> {
        let paths = discover(root, extensions, recursive)?;
        let mut items = Vec::with_capacity(paths.len());

        for path in paths {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            items.push(InputItem::File { path, size });
        }

        Ok(Self { items })
    }

    /// Add a single item
    pub fn push(&mut self, item: InputItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Check a path against an extension allow-list (case-insensitive)
///
/// Entries may be written with or without the leading dot.
pub fn extension_allowed(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').to_lowercase() == ext)
}

/// Find input files under `root`
///
/// A file root is returned as-is regardless of extension. A directory is
/// walked and filtered by `extensions`. The result is sorted.
pub fn discover(root: &Path, extensions: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(root).map_err(|e| NeraError::Io {
        path: root.display().to_string(),
        source: e,
    })?;

    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let entries = std::fs::read_dir(root).map_err(|e| NeraError::Io {
        path: root.display().to_string(),
        source: e,
    })?;

    let mut found = Vec::new();
    walk(root, entries, extensions, recursive, &mut found);
    found.sort();

    debug!(root = %root.display(), count = found.len(), "discovered input files");
    Ok(found)
}

/// Collect matching files from an open directory
///
/// Symlinked directories are not followed. Unreadable sub-directories are
/// skipped with a warning.
fn walk(
    dir: &Path,
    entries: std::fs::ReadDir,
    extensions: &[String],
    recursive: bool,
    out: &mut Vec<PathBuf>,
) {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping entry with unknown type");
                continue;
            }
        };

        if file_type.is_dir() {
            if !recursive {
                continue;
            }
            match std::fs::read_dir(&path) {
                Ok(children) => walk(&path, children, extensions, recursive, out),
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "skipping unreadable directory");
                }
            }
        } else if file_type.is_symlink() {
            // Only links to regular files are followed
            if path.is_file() && extension_allowed(&path, extensions) {
                out.push(path);
            } else {
                debug!(path = %path.display(), "skipping symlink");
            }
        } else if file_type.is_file() && extension_allowed(&path, extensions) {
            out.push(path);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
