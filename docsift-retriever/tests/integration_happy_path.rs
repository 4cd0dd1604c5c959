//! Integration tests for the ingest and query pipeline
//!
//! These tests run the whole engine with the hash embedder, so no model download
//! is needed:
//! - Ingesting paged documents and citing results
//! - Query variants from a synonym expander
//! - Incremental ingestion and persistence across reopen
//! - Concurrent queries while a new snapshot is published

use anyhow::Result;
use docsift_embed::{EmbeddingProvider, HashEmbedder};
use docsift_retriever::retrieval::expansion::SynonymExpander;
use docsift_retriever::storage::SqliteSnapshotStore;
use docsift_retriever::{
    DocumentText, IngestStatus, QueryRequest, RetrievalEngine, RetrieverConfig, RetrieverError,
};
use std::sync::Arc;
use tempfile::tempdir;

const KIDNEY_REPORT: &str = "Kidney stones are hard deposits of minerals.\n\n\
    Pink urine can be a sign of hematuria.\u{c}\
    Patients with pyrexia should drink fluids.\n\n\
    Flank pain often comes in waves.";

fn embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashEmbedder::default())
}

async fn memory_engine(config: RetrieverConfig) -> Result<RetrievalEngine> {
    let store = SqliteSnapshotStore::open_memory().await?;
    Ok(RetrievalEngine::new(config, embedder(), Arc::new(store)))
}

/// Ingest a two page document and check the citations of every chunk
#[tokio::test]
async fn test_paged_document_citations() -> Result<()> {
    let engine = memory_engine(RetrieverConfig::default()).await?;
    let summary = engine
        .ingest(vec![DocumentText::from_form_feeds("report.pdf", KIDNEY_REPORT)])
        .await?;

    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.results[0].num_chunks, 4);
    assert!(summary.results[0]
        .extracted_text_preview
        .starts_with("Kidney stones"));

    let citations: Vec<String> = citations_of(&engine, 4).await?;
    assert_eq!(
        citations,
        vec![
            "Page 1, Para 1, Sent 1",
            "Page 1, Para 2, Sent 1",
            "Page 2, Para 1, Sent 1",
            "Page 2, Para 2, Sent 1",
        ]
    );
    Ok(())
}

async fn citations_of(engine: &RetrievalEngine, n: usize) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for position in 0..n {
        let view = engine.get(position).await?.expect("chunk exists");
        out.push(view.citation.to_string());
    }
    Ok(out)
}

/// A query phrased with a synonym finds the chunk that uses the other word
#[tokio::test]
async fn test_synonym_variants_reach_matching_chunk() -> Result<()> {
    let engine = memory_engine(RetrieverConfig::default())
        .await?
        .with_expander(Arc::new(SynonymExpander::default()));
    engine
        .ingest(vec![DocumentText::from_form_feeds("report.pdf", KIDNEY_REPORT)])
        .await?;

    let response = engine
        .query(&QueryRequest::new("fever").with_min_score(0.0))
        .await?;

    assert!(response.variants.iter().any(|v| v.contains("pyrexia")));
    assert_eq!(response.variants[0], "fever");

    let top = &response.results[0];
    assert!(top.chunk.text.contains("pyrexia"));
    assert_eq!(top.citation.page, 2);

    let positions: Vec<usize> = response.results.iter().map(|r| r.position).collect();
    let mut unique = positions.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(positions.len(), unique.len());
    Ok(())
}

/// The results table truncates long answers and keeps short ones
#[tokio::test]
async fn test_result_rows() -> Result<()> {
    let engine = memory_engine(RetrieverConfig::default()).await?;
    let long_sentence = format!("Hematuria {}", "details ".repeat(45));
    engine
        .ingest(vec![
            DocumentText::single("long.txt", long_sentence.trim()),
            DocumentText::single("short.txt", "Hematuria is blood in urine."),
        ])
        .await?;

    let response = engine
        .query(&QueryRequest::new("hematuria").with_min_score(0.0))
        .await?;
    let rows = response.rows();
    assert_eq!(rows.len(), 2);

    for row in &rows {
        match row.document.as_str() {
            "long.txt" => {
                assert!(row.extracted_answer.ends_with("..."));
                assert_eq!(row.extracted_answer.chars().count(), 303);
            }
            "short.txt" => assert_eq!(row.extracted_answer, "Hematuria is blood in urine."),
            other => panic!("unexpected document {other}"),
        }
        assert_eq!(row.citation, "Page 1, Para 1, Sent 1");
    }
    Ok(())
}

/// Re-ingesting adds to the index and the combined snapshot survives a reopen
#[tokio::test]
async fn test_incremental_ingest_persists() -> Result<()> {
    let dir = tempdir()?;

    let engine = RetrievalEngine::open(dir.path(), RetrieverConfig::default(), embedder()).await?;
    engine
        .ingest(vec![DocumentText::from_form_feeds("report.pdf", KIDNEY_REPORT)])
        .await?;
    let second = engine
        .ingest(vec![
            DocumentText::single("empty.txt", ""),
            DocumentText::single("rash.txt", "A rash is an eruption of the skin."),
        ])
        .await?;

    assert_eq!(second.total_files, 2);
    assert_eq!(second.files_processed, 1);
    assert_eq!(second.results[0].status, IngestStatus::Error);
    assert_eq!(second.stats.entries, 5);
    drop(engine);

    let reopened =
        RetrievalEngine::open(dir.path(), RetrieverConfig::default(), embedder()).await?;
    let stats = reopened.stats().await.expect("index was persisted");
    assert_eq!(stats.entries, 5);
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.version, second.stats.version);

    let response = reopened
        .query(&QueryRequest::new("A rash is an eruption of the skin."))
        .await?;
    assert_eq!(response.results[0].position, 4);
    assert_eq!(response.results[0].chunk.document_id, "rash.txt");
    Ok(())
}

/// Queries running during an ingest see either the old or the new snapshot
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_during_ingest() -> Result<()> {
    let engine = Arc::new(memory_engine(RetrieverConfig::default()).await?);
    engine
        .ingest(vec![DocumentText::from_form_feeds("report.pdf", KIDNEY_REPORT)])
        .await?;

    let mut readers = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        readers.push(tokio::spawn(async move {
            let response = engine
                .query(&QueryRequest::new("kidney stones").with_min_score(0.0))
                .await?;
            let entries = engine.stats().await.map(|s| s.entries).unwrap_or(0);
            Ok::<_, RetrieverError>((response.total_matches, entries))
        }));
    }

    engine
        .ingest(vec![DocumentText::single("extra.txt", "Stones may pass on their own.")])
        .await?;

    for reader in readers {
        let (matches, entries) = reader.await??;
        assert!(matches >= 1);
        assert!(entries == 4 || entries == 5);
    }
    assert_eq!(engine.stats().await.map(|s| s.entries), Some(5));
    Ok(())
}

/// Every operation that needs an index reports its absence the same way
#[tokio::test]
async fn test_no_index_everywhere() -> Result<()> {
    let engine = memory_engine(RetrieverConfig::default()).await?;

    let err = engine.query(&QueryRequest::new("anything")).await.unwrap_err();
    assert_eq!(err.to_string(), "No index available. Upload documents first");

    engine
        .ingest(vec![DocumentText::single("a.txt", "Some text.")])
        .await?;
    engine.clear().await?;
    assert!(matches!(
        engine.get(0).await.unwrap_err(),
        RetrieverError::IndexNotFound
    ));
    Ok(())
}

/// Settings from docsift.toml reach the engine
#[tokio::test]
async fn test_config_file_drives_defaults() -> Result<()> {
    let dir = tempdir()?;
    std::fs::write(
        dir.path().join("docsift.toml"),
        "[retrieval]\ntop_k = 1\nmin_score = 0.0\ncontext_window = 0\n\n\
         [embedding]\nprovider = \"hash\"\ndimension = 64\n",
    )?;

    let config = RetrieverConfig::load(dir.path())?;
    let provider = config.embedding.create_provider().await?;
    assert_eq!(provider.embedding_dimension(), 64);

    let engine = RetrievalEngine::open(dir.path(), config, provider).await?;
    engine
        .ingest(vec![DocumentText::from_form_feeds("report.pdf", KIDNEY_REPORT)])
        .await?;

    let response = engine.query(&engine.request("flank pain")).await?;
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].context, response.results[0].chunk.text);
    Ok(())
}
