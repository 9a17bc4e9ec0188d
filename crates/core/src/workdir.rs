//! Work-directory handling.
//!
//! The root is resolved once and passed in explicitly. Each request gets a
//! fresh subdirectory; file names derived from user text go through
//! [`slug`] and [`WorkDir::file_path`], which refuse to leave that
//! subdirectory.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Longest slug produced by [`slug`].
const MAX_SLUG_CHARS: usize = 60;

/// Resolved root of all per-request output directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Create the root if needed and resolve it to an absolute path.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "work directory {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the isolated directory for one request.
    pub fn request_dir(&self, request_id: Uuid) -> Result<RequestDir> {
        let path = self.root.join(request_id.simple().to_string());
        std::fs::create_dir_all(&path)?;
        log::debug!("Created request directory {}", path.display());
        Ok(RequestDir {
            id: request_id,
            path,
        })
    }
}

/// Output directory of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDir {
    id: Uuid,
    path: PathBuf,
}

impl RequestDir {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short form of the request id used to disambiguate file names.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// Join a file name onto this directory, rejecting anything that is not
    /// a plain single-component name.
    pub fn file_path(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None)
                if !name.contains(['/', '\\', '\0']) && part == name =>
            {
                Ok(self.path.join(part))
            }
            _ => Err(Error::UnsafePath(
                "file name must be a single plain component".into(),
            )),
        }
    }
}

/// ASCII file-name slug of a title.
///
/// Accents are folded through NFKD; anything other than ASCII letters and
/// digits becomes a single `-`. Falls back to `deck` when nothing is left.
pub fn slug(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in title.nfkd() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if !c.is_ascii() && unicode_normalization::char::is_combining_mark(c) {
            continue;
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_CHARS {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "deck".to_string()
    } else {
        slug.to_string()
    }
}

/// Shared cancellation flag for one request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
