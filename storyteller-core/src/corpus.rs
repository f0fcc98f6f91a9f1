//! Example story corpora.
//!
//! Each genre has a directory of markdown example stories under a corpus
//! root. The corpus is read fresh on every generation so edits to the
//! examples take effect without restarting a session.

use crate::genre::Genre;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Errors reading a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read corpus path {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One loaded example story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    /// File name without extension.
    pub name: String,
    pub content: String,
}

/// Read-only access to the per-genre example directories.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    root: PathBuf,
}

impl CorpusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn genre_dir(&self, genre: Genre) -> PathBuf {
        self.root.join(genre.corpus_dir())
    }

    /// Load a genre's examples, sorted by file name.
    ///
    /// A missing genre directory is an empty corpus, not an error.
    pub async fn entries(&self, genre: Genre) -> Result<Vec<CorpusEntry>, CorpusError> {
        let dir = self.genre_dir(genre);
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(genre = %genre, dir = %dir.display(), "corpus directory missing, using no examples");
                return Ok(Vec::new());
            }
            Err(source) => return Err(CorpusError::Io { path: dir, source }),
        };

        let mut paths = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|source| CorpusError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|source| CorpusError::Io {
                    path: path.clone(),
                    source,
                })?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push(CorpusEntry { name, content });
        }

        debug!(genre = %genre, examples = entries.len(), "corpus loaded");
        Ok(entries)
    }

    /// Load a genre's examples as one labelled block for a writer prompt.
    pub async fn load(&self, genre: Genre) -> Result<String, CorpusError> {
        Ok(render_examples(&self.entries(genre).await?))
    }
}

/// Concatenate examples, each under an `### Example from <name>:` label.
pub fn render_examples(entries: &[CorpusEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("### Example from {}:\n{}\n", e.name, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}
