//! `supportdesk ingest`: Build the knowledge store from documents on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use supportdesk_config::AppConfig;
use supportdesk_core::provider::Provider;
use supportdesk_knowledge::{IngestReport, Ingestor, embedder};
use supportdesk_providers::OpenAiCompatProvider;

pub async fn run(
    config_path: Option<&Path>,
    source: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(output) = output {
        config.retrieval.index_path = output;
    }

    println!("📚 Ingesting {}", source.display());
    let report = ingest(&config, source).await?;

    println!("   Documents: {}", report.documents);
    println!("   Chunks:    {}", report.chunks);
    if report.duplicates > 0 {
        println!("   Duplicate chunks skipped: {}", report.duplicates);
    }
    for path in &report.skipped {
        println!("   ⚠️  Skipped {}", path.display());
    }
    println!("   Store:     {}", config.retrieval.index_path.display());
    Ok(())
}

/// Ingest `source` and write the store to `config.retrieval.index_path`.
pub async fn ingest(
    config: &AppConfig,
    source: &Path,
) -> Result<IngestReport, Box<dyn std::error::Error>> {
    // Only the provider embedder needs a key; hashing runs offline.
    let provider = OpenAiCompatProvider::from_config(config)
        .ok()
        .map(|p| Arc::new(p) as Arc<dyn Provider>);
    let embedder = embedder::from_config(config, provider)?;

    let (store, report) = Ingestor::from_config(config, embedder)?.ingest(source).await?;
    store.save(&config.retrieval.index_path)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use supportdesk_knowledge::KnowledgeStore;

    #[tokio::test]
    async fn ingest_writes_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("faq.md"), "Billing runs on the first of the month.").unwrap();

        let mut config = AppConfig::default();
        config.retrieval.index_path = dir.path().join("out").join("index.json");

        let report = ingest(&config, &docs).await.unwrap();
        assert_eq!(report.documents, 1);

        let store = KnowledgeStore::load(&config.retrieval.index_path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.sources(), vec!["faq.md"]);
    }

    #[tokio::test]
    async fn empty_directory_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.retrieval.index_path = dir.path().join("index.json");

        assert!(ingest(&config, dir.path()).await.is_err());
        assert!(!config.retrieval.index_path.exists());
    }
}
