//! Offline ingestion: documents on disk → chunks → embeddings → store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex_lite::Regex;
use supportdesk_config::AppConfig;
use supportdesk_core::error::KnowledgeError;
use supportdesk_core::knowledge::{Embedder, KnowledgeChunk};
use tracing::{debug, info, warn};

use crate::chunker::TextSplitter;
use crate::store::KnowledgeStore;

/// File extensions picked up by ingestion.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "json", "csv", "log", "html", "htm", "xml"];

const EMBED_BATCH: usize = 32;

/// What an ingestion run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Chunks whose content was already stored
    pub duplicates: usize,
    /// Files that could not be read or held no text
    pub skipped: Vec<PathBuf>,
}

pub struct Ingestor {
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
}

impl Ingestor {
    pub fn new(splitter: TextSplitter, embedder: Arc<dyn Embedder>) -> Self {
        Self { splitter, embedder }
    }

    pub fn from_config(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Self, KnowledgeError> {
        let splitter = TextSplitter::new(config.retrieval.chunk_size, config.retrieval.chunk_overlap)?;
        Ok(Self::new(splitter, embedder))
    }

    /// Build a store from a file or a directory tree.
    pub async fn ingest(&self, root: &Path) -> Result<(KnowledgeStore, IngestReport), KnowledgeError> {
        let files = collect_documents(root)?;
        if files.is_empty() {
            return Err(KnowledgeError::Ingestion(format!(
                "no supported documents ({}) under {}",
                SUPPORTED_EXTENSIONS.join(", "),
                root.display()
            )));
        }

        let mut report = IngestReport::default();
        let mut pending: Vec<(String, usize, String)> = Vec::new();

        for file in &files {
            let text = match load_text(file) {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    warn!(path = %file.display(), "Skipping empty document");
                    report.skipped.push(file.clone());
                    continue;
                }
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "Skipping unreadable document");
                    report.skipped.push(file.clone());
                    continue;
                }
            };

            let source = source_name(root, file);
            let pieces = self.splitter.split(&text);
            debug!(source = %source, chunks = pieces.len(), "Document split");
            report.documents += 1;
            pending.extend(pieces.into_iter().enumerate().map(|(i, t)| (source.clone(), i, t)));
        }

        let mut store = KnowledgeStore::new(self.embedder.id(), self.embedder.dimension());
        for batch in pending.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|(_, _, t)| t.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| KnowledgeError::Ingestion(e.to_string()))?;

            for ((source, index, text), vector) in batch.iter().zip(vectors) {
                if store.insert(KnowledgeChunk::new(source.clone(), *index, text.clone(), vector))? {
                    report.chunks += 1;
                } else {
                    report.duplicates += 1;
                }
            }
        }

        info!(
            documents = report.documents,
            chunks = report.chunks,
            duplicates = report.duplicates,
            skipped = report.skipped.len(),
            embedder = %store.embedder(),
            "Ingestion complete"
        );
        Ok((store, report))
    }
}

/// Supported files under `root`, sorted for a stable chunk order.
pub fn collect_documents(root: &Path) -> Result<Vec<PathBuf>, KnowledgeError> {
    let read_err = |path: &Path, e: std::io::Error| KnowledgeError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    if root.is_file() {
        return Ok(if is_supported(root) { vec![root.to_path_buf()] } else { Vec::new() });
    }

    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        for entry in std::fs::read_dir(&dir).map_err(|e| read_err(&dir, e))? {
            let path = entry.map_err(|e| read_err(&dir, e))?.path();
            if path.is_dir() {
                dirs.push(path);
            } else if is_supported(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn source_name(root: &Path, file: &Path) -> String {
    let relative = if root.is_file() {
        file.file_name().map(PathBuf::from).unwrap_or_else(|| file.to_path_buf())
    } else {
        file.strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| file.to_path_buf())
    };
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read a document as plain text; markup files lose their tags.
pub fn load_text(path: &Path) -> Result<String, KnowledgeError> {
    let bytes = std::fs::read(path).map_err(|e| KnowledgeError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let is_markup = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "html" | "htm" | "xml"));

    Ok(if is_markup { strip_markup(&text) } else { text })
}

struct MarkupPatterns {
    hidden: Regex,
    tag: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

fn markup_patterns() -> Option<&'static MarkupPatterns> {
    static PATTERNS: OnceLock<Option<MarkupPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(MarkupPatterns {
                hidden: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").ok()?,
                tag: Regex::new(r"(?s)<[^>]*>").ok()?,
                spaces: Regex::new(r"[ \t\r]+").ok()?,
                blank_lines: Regex::new(r"\n[ \t]*(\n[ \t]*)+").ok()?,
            })
        })
        .as_ref()
}

fn strip_markup(text: &str) -> String {
    let Some(p) = markup_patterns() else {
        return text.to_string();
    };
    let text = p.hidden.replace_all(text, " ");
    let text = p.tag.replace_all(&text, "\n");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = p.spaces.replace_all(&text, " ");
    let text = p.blank_lines.replace_all(&text, "\n\n");
    text.lines().map(str::trim).collect::<Vec<_>>().join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn ingestor(size: usize, overlap: usize) -> Ingestor {
        Ingestor::new(
            TextSplitter::new(size, overlap).unwrap(),
            Arc::new(HashingEmbedder::new(64)),
        )
    }

    #[test]
    fn markup_is_stripped() {
        let html = "<html><head><style>p { color: red; }</style></head>\
                    <body><h1>Reset</h1><p>Use the&nbsp;link &amp; check email.</p></body></html>";
        let text = strip_markup(html);
        assert!(text.contains("Reset"));
        assert!(text.contains("Use the link & check email."));
        assert!(!text.contains("color"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn only_supported_files_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.PDF"), "binary").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.txt"), "gamma").unwrap();

        let files = collect_documents(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|f| source_name(dir.path(), f)).collect();
        assert_eq!(names, vec!["a.md", "sub/c.txt"]);
    }

    #[tokio::test]
    async fn ingest_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manual.txt"),
            "Password resets are done from the login page.\n\nBilling runs monthly.",
        )
        .unwrap();
        std::fs::write(dir.path().join("faq.md"), "Billing runs monthly.").unwrap();
        std::fs::write(dir.path().join("empty.log"), "   ").unwrap();

        let (store, report) = ingestor(50, 10).ingest(dir.path()).await.unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(store.len(), 3);
        assert_eq!(report.chunks, 3);
        assert_eq!(store.embedder(), "hashing-64");
        assert!(store.chunks().iter().all(|c| c.embedding.len() == 64));
    }

    #[tokio::test]
    async fn identical_content_in_one_document_is_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dup.txt"), "Same paragraph.\n\nSame paragraph.").unwrap();
        let (store, report) = ingestor(20, 5).ingest(dir.path()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(report.duplicates, 1);
    }

    #[tokio::test]
    async fn single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nebula_manual.txt");
        std::fs::write(&file, "NebulaSoft manual.").unwrap();
        let (store, _) = ingestor(500, 100).ingest(&file).await.unwrap();
        assert_eq!(store.chunks()[0].source_document, "nebula_manual.txt");
    }

    #[tokio::test]
    async fn no_documents_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ingestor(500, 100).ingest(dir.path()).await,
            Err(KnowledgeError::Ingestion(_))
        ));
    }
}
