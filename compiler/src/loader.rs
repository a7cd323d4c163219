// loader.rs — Component document loading
//
// Materializes a factory from one of four document sources: inline text, a
// local file, a URL, or an archive wrapping a single document. Exactly one
// source must be given per load. Archive detection keys off the leading
// bytes, so zipped documents work transparently from files and URLs alike.
//
// Preconditions: exactly one source populated.
// Postconditions: on success the returned factory passed full spec
//                 validation and signature synthesis.
// Failure modes: zero or multiple sources, I/O and transport failures,
//                malformed archives, and every compile-time error.
// Side effects: file reads and HTTP GETs as directed by the source.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::factory::{CompileError, TaskFactory};
use crate::spec::ComponentSpec;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum LoadError {
    /// Zero sources, or more than one.
    InvalidSource { given: usize },
    /// Reading a local file failed.
    File { path: PathBuf, err: std::io::Error },
    /// Fetching a URL failed.
    Url { url: String, err: Box<ureq::Error> },
    /// Reading the response body failed.
    Transport { url: String, err: std::io::Error },
    /// The payload looked like an archive but could not be unwrapped.
    Archive { detail: String },
    /// The document bytes were not valid UTF-8.
    Encoding,
    /// The document parsed but failed compilation.
    Compile(CompileError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::InvalidSource { given } => {
                write!(f, "exactly one source required, {} given", given)
            }
            LoadError::File { path, err } => {
                write!(f, "cannot read '{}': {}", path.display(), err)
            }
            LoadError::Url { url, err } => write!(f, "cannot fetch '{}': {}", url, err),
            LoadError::Transport { url, err } => {
                write!(f, "cannot read response from '{}': {}", url, err)
            }
            LoadError::Archive { detail } => write!(f, "bad archive: {}", detail),
            LoadError::Encoding => write!(f, "document is not valid UTF-8"),
            LoadError::Compile(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::File { err, .. } => Some(err),
            LoadError::Url { err, .. } => Some(err),
            LoadError::Transport { err, .. } => Some(err),
            LoadError::Compile(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CompileError> for LoadError {
    fn from(err: CompileError) -> Self {
        LoadError::Compile(err)
    }
}

// ── Source selection ─────────────────────────────────────────────────────

/// Where a component document comes from. Build with the constructors or
/// field syntax; `load_component` rejects anything other than exactly one
/// populated field.
#[derive(Debug, Default)]
pub struct ComponentSource {
    pub text: Option<String>,
    pub file: Option<PathBuf>,
    pub url: Option<String>,
}

impl ComponentSource {
    pub fn text(text: impl Into<String>) -> Self {
        ComponentSource {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ComponentSource {
            file: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ComponentSource {
            url: Some(url.into()),
            ..Default::default()
        }
    }
}

/// Load a component document from exactly one source and compile it.
pub fn load_component(source: ComponentSource) -> Result<TaskFactory, LoadError> {
    let given = source.text.is_some() as usize
        + source.file.is_some() as usize
        + source.url.is_some() as usize;
    if given != 1 {
        return Err(LoadError::InvalidSource { given });
    }

    if let Some(text) = source.text {
        return load_component_from_text(&text);
    }
    if let Some(path) = source.file {
        return load_component_from_file(&path);
    }
    // Exactly one source, and it was not text or file.
    let url = source.url.expect("internal: source accounting");
    load_component_from_url(&url)
}

/// Compile a factory from an in-memory document.
pub fn load_component_from_text(text: &str) -> Result<TaskFactory, LoadError> {
    let spec = ComponentSpec::from_text(text).map_err(CompileError::from)?;
    Ok(TaskFactory::compile(spec)?)
}

/// Compile a factory from a local file, unwrapping archives.
pub fn load_component_from_file(path: &Path) -> Result<TaskFactory, LoadError> {
    log::debug!("loading component from file '{}'", path.display());
    let bytes = std::fs::read(path).map_err(|err| LoadError::File {
        path: path.to_path_buf(),
        err,
    })?;
    load_component_from_bytes(bytes)
}

/// Compile a factory fetched over HTTP, unwrapping archives.
pub fn load_component_from_url(url: &str) -> Result<TaskFactory, LoadError> {
    log::debug!("loading component from url '{}'", url);
    let response = ureq::get(url).call().map_err(|err| LoadError::Url {
        url: url.to_string(),
        err: Box::new(err),
    })?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|err| LoadError::Transport {
            url: url.to_string(),
            err,
        })?;
    load_component_from_bytes(bytes)
}

fn load_component_from_bytes(bytes: Vec<u8>) -> Result<TaskFactory, LoadError> {
    let bytes = if bytes.starts_with(&ZIP_MAGIC) {
        unwrap_archive(&bytes)?
    } else {
        bytes
    };
    let text = String::from_utf8(bytes).map_err(|_| LoadError::Encoding)?;
    load_component_from_text(&text)
}

/// Extract the single document from a zip payload. Archives with no file
/// entries, or with more than one, are rejected.
fn unwrap_archive(bytes: &[u8]) -> Result<Vec<u8>, LoadError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|err| LoadError::Archive {
        detail: err.to_string(),
    })?;

    let mut document = None;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| LoadError::Archive {
            detail: err.to_string(),
        })?;
        if entry.is_dir() {
            continue;
        }
        if document.is_some() {
            return Err(LoadError::Archive {
                detail: "archive contains more than one document".to_string(),
            });
        }
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|err| LoadError::Archive {
                detail: err.to_string(),
            })?;
        document = Some(contents);
    }

    document.ok_or_else(|| LoadError::Archive {
        detail: "archive contains no document".to_string(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────
