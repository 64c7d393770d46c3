//! Puppetfile reading and editing.
//!
//! The manifest is kept as text. Parsing records, for each `mod` entry, the
//! byte span of its ref value, and edits splice only that span: every other
//! byte of the file (comments, forge entries, layout) survives unchanged.
//!
//! Entries are looked up by exact module name or exact source URL. Lookups
//! never match on prefixes, so `apache` can't be confused with `apache_ext`.

mod parser;

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::spool::fsync::write_atomic;

/// Errors from manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to access manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no manifest entry for {0}")]
    EntryNotFound(ModuleAnchor),

    #[error("manifest entry {0} has no :ref or :branch option")]
    MissingRef(String),

    #[error("invalid {field} {value:?}: quotes, backslashes and line breaks are not allowed")]
    InvalidValue { field: &'static str, value: String },

    #[error("manifest syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// How a module is identified in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleAnchor {
    /// The entry name, or the repository name at the end of its `:git` URL.
    Name(String),
    /// The exact `:git` URL.
    SourceUrl(String),
}

impl fmt::Display for ModuleAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleAnchor::Name(name) => write!(f, "module {name}"),
            ModuleAnchor::SourceUrl(url) => write!(f, "source {url}"),
        }
    }
}

/// One `mod` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub git: Option<String>,
    /// Value of `:ref` (or `:branch` when there is no `:ref`).
    pub git_ref: Option<String>,
    /// 1-based line of the `mod` keyword.
    pub line: usize,
    ref_span: Option<Range<usize>>,
}

impl ManifestEntry {
    /// Repository name from the `:git` URL, without any `.git` suffix.
    fn repository_name(&self) -> Option<&str> {
        let url = self.git.as_deref()?.trim_end_matches('/');
        let last = url.rsplit(['/', ':']).next()?;
        let name = last.strip_suffix(".git").unwrap_or(last);
        (!name.is_empty()).then_some(name)
    }

    pub fn matches(&self, anchor: &ModuleAnchor) -> bool {
        match anchor {
            ModuleAnchor::Name(name) => {
                self.name == *name || self.repository_name() == Some(name.as_str())
            }
            ModuleAnchor::SourceUrl(url) => self.git.as_deref() == Some(url.as_str()),
        }
    }
}

/// Rejects values that can't be written inside a quoted Puppetfile string.
fn validate(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(['"', '\'', '\\', '\n', '\r']) {
        return Err(ManifestError::InvalidValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// A parsed Puppetfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puppetfile {
    text: String,
    entries: Vec<ManifestEntry>,
}

impl Puppetfile {
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let entries = parser::parse_entries(&text)?;
        Ok(Puppetfile { text, entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(text)
    }

    /// Writes the manifest through a temporary file and a rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.text.as_bytes()).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Entries in file order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Entry addressed by `anchor`. A name matches the entry name exactly
    /// before it is tried against `:git` URL basenames.
    fn find(&self, anchor: &ModuleAnchor) -> Option<&ManifestEntry> {
        if let ModuleAnchor::Name(name) = anchor
            && let Some(entry) = self.entries.iter().find(|e| e.name == *name)
        {
            return Some(entry);
        }
        self.entries.iter().find(|e| e.matches(anchor))
    }

    /// Chooses how to address a module: by URL when an entry carries it,
    /// else by name. `None` when the module is absent.
    pub fn locate(&self, name: &str, url: &str) -> Option<ModuleAnchor> {
        [
            ModuleAnchor::SourceUrl(url.to_string()),
            ModuleAnchor::Name(name.to_string()),
        ]
        .into_iter()
        .find(|anchor| self.find(anchor).is_some())
    }

    /// Current ref of a module, if the module has one.
    pub fn find_ref(&self, anchor: &ModuleAnchor) -> Option<&str> {
        self.find(anchor)?.git_ref.as_deref()
    }

    /// Sets the ref of a module. Returns `false` when it already had that ref.
    pub fn replace_ref(&mut self, anchor: &ModuleAnchor, new_ref: &str) -> Result<bool> {
        validate("ref", new_ref)?;
        let entry = self
            .find(anchor)
            .ok_or_else(|| ManifestError::EntryNotFound(anchor.clone()))?;
        let span = entry
            .ref_span
            .clone()
            .ok_or_else(|| ManifestError::MissingRef(entry.name.clone()))?;

        if entry.git_ref.as_deref() == Some(new_ref) {
            return Ok(false);
        }

        let mut text = std::mem::take(&mut self.text);
        text.replace_range(span, new_ref);
        *self = Self::parse(text)?;
        Ok(true)
    }

    /// Appends a git entry at the end of the file.
    pub fn append(&mut self, name: &str, url: &str, git_ref: &str) -> Result<()> {
        validate("module name", name)?;
        validate("url", url)?;
        validate("ref", git_ref)?;

        let mut text = std::mem::take(&mut self.text);
        text.push_str(&format!(
            "\nmod \"{name}\",\n  :git => \"{url}\",\n  :ref => \"{git_ref}\"\n"
        ));
        *self = Self::parse(text)?;
        Ok(())
    }

    /// Names of the modules whose ref is `branch`, in file order, leaving
    /// out the module `excluding`.
    pub fn modules_referencing_branch(&self, branch: &str, excluding: &str) -> Vec<&str> {
        let excluded = self.find(&ModuleAnchor::Name(excluding.to_string()));
        self.entries
            .iter()
            .filter(|e| e.git_ref.as_deref() == Some(branch))
            .filter(|e| !excluded.is_some_and(|x| std::ptr::eq(x, *e)))
            .map(|e| e.name.as_str())
            .collect()
    }
}
