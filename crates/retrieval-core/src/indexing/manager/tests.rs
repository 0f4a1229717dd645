use super::*;
use crate::chunking::PageSpan;
use crate::search::{QueryRequest, RetrievalPipeline, SearchMode};
use crate::storage::InMemoryChunkStore;
use crate::test_utils::{FailingEmbedder, FlakyChunkStore, HashingEmbedder, SlowScanChunkStore};

const DIM: usize = 32;
const THREE_SENTENCES: &str = "One fish. Two fish. Red fish.";

async fn manager_with(store: Arc<dyn ChunkStore>) -> IndexManager {
    IndexManager::load(
        store,
        Arc::new(HashingEmbedder::new(DIM)),
        RetrievalConfig::default(),
    )
    .await
    .unwrap()
}

async fn manager() -> IndexManager {
    manager_with(Arc::new(InMemoryChunkStore::new())).await
}

fn sentences_request() -> AddTextRequest {
    AddTextRequest::new(THREE_SENTENCES)
        .with_strategy(ChunkingStrategy::Semantic)
        .with_chunk_size(10)
}

#[tokio::test]
async fn test_add_text_indexes_every_chunk() {
    let manager = manager().await;
    let response = manager.add_text(sentences_request()).await.unwrap();

    assert!(response.is_complete());
    assert_eq!(response.chunks_created, 3);
    assert_eq!(response.ids.len(), 3);
    for id in &response.ids {
        assert!(manager.vector().contains(*id));
        assert!(manager.keyword().contains(*id));
    }

    let report = manager.consistency_report().await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.stored_chunks, 3);
}

#[tokio::test]
async fn test_chunk_metadata_carries_document_and_source() {
    let manager = manager().await;
    let response = manager.add_text(sentences_request()).await.unwrap();
    let document = response.document.unwrap();

    let chunk = manager
        .store()
        .get_chunk(response.ids[1])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunk.text, "Two fish.");
    assert_eq!(chunk.sequence, 1);
    assert_eq!(chunk.document_id, document.id);
    assert_eq!(chunk.metadata["source"], "direct_text");
    assert_eq!(chunk.metadata["format"], "text");
    assert_eq!(chunk.metadata["chunking_strategy"], "semantic");
    assert_eq!(chunk.metadata["total_chunks"], "3");
    assert_eq!(
        chunk.metadata["document_id"],
        document.id.as_u64().to_string()
    );

    let custom = manager
        .add_text(AddTextRequest::new("notes").with_metadata("source", "clipboard"))
        .await
        .unwrap();
    let chunk = manager
        .store()
        .get_chunk(custom.ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunk.metadata["source"], "clipboard");
}

#[tokio::test]
async fn test_unchunked_text_is_one_chunk() {
    let manager = manager().await;
    let long = "word ".repeat(500);
    let response = manager
        .add_text(AddTextRequest::new(long.clone()).whole().with_chunk_size(1))
        .await
        .unwrap();

    assert_eq!(response.chunks_created, 1);
    let chunk = manager
        .store()
        .get_chunk(response.ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunk.text, long);
}

#[tokio::test]
async fn test_blank_text_is_a_no_op() {
    let manager = manager().await;
    for request in [AddTextRequest::new("   \n"), AddTextRequest::new("").whole()] {
        let response = manager.add_text(request).await.unwrap();
        assert_eq!(response.chunks_created, 0);
        assert!(response.document.is_none());
    }
    assert!(manager.store().iter_document_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_chunking_mutates_nothing() {
    let manager = manager().await;
    let err = manager
        .add_text(
            AddTextRequest::new(THREE_SENTENCES)
                .with_chunk_size(10)
                .with_overlap(10),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RetrievalError::InvalidConfig(_)));
    assert_eq!(manager.store().chunk_count().await.unwrap(), 0);
    assert!(manager.store().iter_document_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_small_chunk_size_scales_default_overlap() {
    let manager = manager().await;
    // default overlap is 200, which would exceed a chunk size of 50
    let response = manager
        .add_text(AddTextRequest::new("alpha beta gamma ".repeat(20)).with_chunk_size(50))
        .await
        .unwrap();
    assert!(response.chunks_created > 1);
}

#[tokio::test]
async fn test_embedding_failure_stores_nothing() {
    let store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::new());
    let manager = IndexManager::load(
        store.clone(),
        Arc::new(FailingEmbedder::new(DIM)),
        RetrievalConfig::default(),
    )
    .await
    .unwrap();

    let err = manager.add_text(sentences_request()).await.unwrap_err();
    assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    assert!(err.is_fatal());
    assert_eq!(store.chunk_count().await.unwrap(), 0);
    assert!(store.iter_document_ids().await.unwrap().is_empty());
    assert!(manager.vector().is_empty());
}

#[tokio::test]
async fn test_store_failure_reports_partial_and_keeps_stored_chunks() {
    let manager = manager_with(Arc::new(FlakyChunkStore::failing_after(1))).await;
    let response = manager.add_text(sentences_request()).await.unwrap();

    assert_eq!(response.chunks_created, 1);
    assert!(matches!(
        &response.status,
        IngestStatus::Partial {
            rebuild_required: false,
            reason,
        } if reason.contains("disk full")
    ));

    // what was stored is fully indexed
    let id = response.ids[0];
    assert!(manager.vector().contains(id));
    assert!(manager.keyword().contains(id));
    assert!(manager.consistency_report().await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_keyword_failure_requires_rebuild_and_hides_chunks() {
    let manager = Arc::new(manager().await);
    manager.keyword().set_reject_writes(true);

    let response = manager.add_text(sentences_request()).await.unwrap();
    assert_eq!(response.chunks_created, 3);
    assert!(matches!(
        &response.status,
        IngestStatus::Partial {
            rebuild_required: true,
            reason,
        } if reason.contains("keyword index")
    ));
    for id in &response.ids {
        assert!(manager.store().get_chunk(*id).await.unwrap().is_some());
        assert!(manager.vector().contains(*id));
        assert!(!manager.keyword().contains(*id));
    }

    let pipeline = RetrievalPipeline::new(manager.clone(), None, RetrievalConfig::default());
    let request = QueryRequest::new("Red fish.")
        .with_mode(SearchMode::Vector)
        .with_rerank(false);
    let hidden = pipeline.query(&request).await.unwrap();
    assert!(hidden.sources.is_empty());
    assert!(hidden.warnings.iter().any(|w| matches!(
        w,
        RetrievalError::IndexInconsistency {
            stored_chunks: 3,
            vector_entries: 3,
            keyword_entries: 0,
        }
    )));

    manager.keyword().set_reject_writes(false);
    assert_eq!(manager.rebuild_keyword_index().await.unwrap().rebuilt_entries, 3);
    let visible = pipeline.query(&request).await.unwrap();
    let mut found: Vec<ChunkId> = visible.sources.iter().map(|s| s.chunk_id).collect();
    found.sort();
    assert_eq!(found, response.ids);
    assert!(visible.warnings.is_empty());
}

#[tokio::test]
async fn test_add_document_defaults_to_page_aware() {
    let manager = manager().await;
    let page_one = "First page text.";
    let page_two = "Second page text.";
    let text = format!("{}{}", page_one, page_two);
    let pages = vec![
        PageSpan {
            page_number: 1,
            start: 0,
            end: page_one.len(),
        },
        PageSpan {
            page_number: 2,
            start: page_one.len(),
            end: text.len(),
        },
    ];

    let response = manager
        .add_document(AddDocumentRequest::new(text, DocumentFormat::Pdf).with_pages(pages))
        .await
        .unwrap();

    let document = response.document.unwrap();
    assert_eq!(document.page_count, Some(2));
    assert_eq!(document.format, DocumentFormat::Pdf);

    let chunks = manager
        .store()
        .get_chunks_batch(&response.ids)
        .await
        .unwrap();
    let pages: Vec<Option<u32>> = chunks.iter().map(|c| c.page_number).collect();
    assert_eq!(pages, vec![Some(1), Some(2)]);
    assert_eq!(chunks[1].text, page_two);
    assert_eq!(chunks[1].metadata["chunking_strategy"], "pdf_page_aware");
    assert_eq!(chunks[1].metadata["format"], "pdf");
}

#[tokio::test]
async fn test_add_document_rejects_bad_page_span() {
    let manager = manager().await;
    let err = manager
        .add_document(
            AddDocumentRequest::new("short", DocumentFormat::Pdf).with_pages(vec![PageSpan {
                page_number: 1,
                start: 0,
                end: 100,
            }]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidConfig(msg) if msg.contains("page")));
}

#[tokio::test]
async fn test_load_restores_indices_and_id_counters() {
    let store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::new());
    let first = manager_with(store.clone()).await;
    let earlier = first.add_text(sentences_request()).await.unwrap();

    let second = manager_with(store).await;
    assert_eq!(second.vector().len(), 3);
    assert_eq!(second.keyword().len(), 3);

    let later = second
        .add_text(AddTextRequest::new("Blue fish."))
        .await
        .unwrap();
    let last_earlier = earlier.ids.iter().max().unwrap();
    assert!(later.ids[0] > *last_earlier);
    assert!(later.document.unwrap().id > earlier.document.unwrap().id);
}

#[tokio::test]
async fn test_reload_skips_orphan_and_misshapen_embeddings() {
    let store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::new());
    let manager = manager_with(store.clone()).await;
    let response = manager.add_text(sentences_request()).await.unwrap();

    store
        .put_embedding(ChunkId::from_u64(500), &[1.0; DIM])
        .await
        .unwrap();
    store.put_embedding(response.ids[0], &[1.0; 3]).await.unwrap();

    let report = manager.reload().await.unwrap();
    assert_eq!(report.skipped_embeddings, 2);
    assert_eq!(report.stored_chunks, 3);
    assert_eq!(report.vector_entries, 2);
    assert_eq!(report.keyword_entries, 3);
    assert!(!manager.consistency_report().await.unwrap().is_consistent());

    // orphan ids are never reused
    let next = manager.add_text(AddTextRequest::new("Blue fish.")).await.unwrap();
    assert!(next.ids[0] > ChunkId::from_u64(500));
}

#[tokio::test]
async fn test_rebuild_keyword_index_counts_store() {
    let manager = manager().await;
    manager.add_text(sentences_request()).await.unwrap();

    let response = manager.rebuild_keyword_index().await.unwrap();
    assert_eq!(response.rebuilt_entries, 3);
    assert!(manager.consistency_report().await.unwrap().is_consistent());
}

#[tokio::test(start_paused = true)]
async fn test_reload_does_not_drop_concurrent_ingestion() {
    let store = Arc::new(SlowScanChunkStore::new(Duration::from_secs(5)));
    let manager = Arc::new(manager_with(store).await);

    let reload = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reload().await }
    });
    // let the reload take its snapshot and block on the embedding scan
    tokio::task::yield_now().await;

    let response = manager.add_text(sentences_request()).await.unwrap();
    reload.await.unwrap().unwrap();

    for id in &response.ids {
        assert!(manager.vector().contains(*id));
        assert!(manager.keyword().contains(*id));
    }
    assert!(manager.consistency_report().await.unwrap().is_consistent());
}
