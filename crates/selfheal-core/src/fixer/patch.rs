//! Typed source-file patches
//!
//! A [`PatchTarget`] names a file, an optional sentinel marking an applied
//! patch, and the edit to perform. Rendering is pure; applying writes the
//! result through a temporary file in the same directory.

use crate::error::FixError;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Content transformation for [`PatchEdit::Rewrite`]
pub type RewriteFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Edit performed on the file content
#[derive(Clone)]
pub enum PatchEdit {
    /// Add text at the end of the file
    Append(String),
    /// Add text before the first occurrence of `anchor`, or append
    InsertBefore { anchor: String, text: String },
    /// Replace the whole content with a function of it
    Rewrite(RewriteFn),
}

impl fmt::Debug for PatchEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append(text) => f.debug_tuple("Append").field(&text.len()).finish(),
            Self::InsertBefore { anchor, .. } => {
                f.debug_struct("InsertBefore").field("anchor", anchor).finish()
            }
            Self::Rewrite(_) => f.write_str("Rewrite(..)"),
        }
    }
}

/// Result of applying a patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// File content changed
    Applied { path: PathBuf },
    /// Sentinel already present
    AlreadyApplied { path: PathBuf },
    /// Edit produced identical content
    Unchanged { path: PathBuf },
    /// Rendered only; nothing written
    DryRun { path: PathBuf, preview: String },
}

impl PatchOutcome {
    /// Check if the file on disk changed
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Short action description
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Applied { path } => format!("patched {}", path.display()),
            Self::AlreadyApplied { path } => format!("{} already patched", path.display()),
            Self::Unchanged { path } => format!("{} already up to date", path.display()),
            Self::DryRun { path, .. } => format!("would patch {} (dry run)", path.display()),
        }
    }
}

/// A file plus the edit that heals it
#[derive(Debug, Clone)]
pub struct PatchTarget {
    path: PathBuf,
    sentinel: Option<String>,
    edit: PatchEdit,
}

impl PatchTarget {
    /// Create target with an edit
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, edit: PatchEdit) -> Self {
        Self {
            path: path.into(),
            sentinel: None,
            edit,
        }
    }

    /// With sentinel marking the patch as applied
    #[must_use]
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = Some(sentinel.into());
        self
    }

    /// Target file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if `content` already carries the sentinel
    #[must_use]
    pub fn is_applied(&self, content: &str) -> bool {
        self.sentinel
            .as_deref()
            .is_some_and(|sentinel| content.contains(sentinel))
    }

    /// Patched content, or `None` if nothing would change
    #[must_use]
    pub fn render(&self, content: &str) -> Option<String> {
        if self.is_applied(content) {
            return None;
        }
        let patched = match &self.edit {
            PatchEdit::Append(text) => append(content, text),
            PatchEdit::InsertBefore { anchor, text } => match content.find(anchor.as_str()) {
                Some(at) => {
                    let mut out = String::with_capacity(content.len() + text.len() + 1);
                    out.push_str(&content[..at]);
                    out.push_str(text);
                    if !text.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(&content[at..]);
                    out
                }
                None => append(content, text),
            },
            PatchEdit::Rewrite(rewrite) => rewrite(content),
        };
        (patched != content).then_some(patched)
    }

    /// Read, render and write the file
    ///
    /// The temp-file write and rename run on the blocking pool.
    ///
    /// # Errors
    /// `FixError::Io` if the file cannot be read or written.
    pub async fn apply(&self, dry_run: bool) -> Result<PatchOutcome, FixError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FixError::io(&self.path, &e))?;
        let path = self.path.clone();

        if self.is_applied(&content) {
            return Ok(PatchOutcome::AlreadyApplied { path });
        }
        let Some(patched) = self.render(&content) else {
            return Ok(PatchOutcome::Unchanged { path });
        };
        if dry_run {
            return Ok(PatchOutcome::DryRun {
                path,
                preview: patched,
            });
        }

        let dest = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dest, &patched))
            .await
            .map_err(|e| FixError::Aborted(format!("patch writer for {}: {e}", path.display())))??;
        Ok(PatchOutcome::Applied { path })
    }
}

fn append(content: &str, text: &str) -> String {
    let mut out = String::with_capacity(content.len() + text.len() + 1);
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(text);
    out
}

fn write_atomic(path: &Path, content: &str) -> Result<(), FixError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| FixError::io(dir, &e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| FixError::io(tmp.path(), &e))?;
    tmp.persist(path).map_err(|e| FixError::io(path, &e.error))?;
    Ok(())
}
