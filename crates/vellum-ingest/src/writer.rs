//! Builds the parent/child record set for a file and submits it to the
//! index store.

use std::sync::Arc;

use chrono::NaiveDate;
use vellum_core::config::ChunkingConfig;
use vellum_core::types::{Chunk, ChunkId, KbId, SourceBlock};
use vellum_index::{ChunkRecord, IndexStore};
use vellum_llm::{EmbeddingProvider, LlmError};

use crate::chunker::{ChunkMode, Chunker};
use crate::error::IngestError;
use crate::normalize::normalize;

/// Blocks shorter than this after cleaning are extraction noise.
const MIN_BLOCK_CHARS: usize = 5;

pub struct IndexWriter<E> {
    store: Arc<dyn IndexStore>,
    embedder: Arc<E>,
    chunker: Chunker,
}

impl<E: EmbeddingProvider> IndexWriter<E> {
    pub fn new(store: Arc<dyn IndexStore>, embedder: Arc<E>, chunking: ChunkingConfig) -> Self {
        Self {
            store,
            embedder,
            chunker: Chunker::new(chunking),
        }
    }

    /// Normalize and chunk every block, then persist one parent chunk per
    /// block plus its child fragments, embedding all texts in batched calls.
    ///
    /// The parent is the unit returned for small-to-big expansion and is
    /// persisted unconditionally; when a block chunks into a single fragment
    /// identical to the cleaned text, no child is stored for it.
    ///
    /// Returns the number of chunks written.
    ///
    /// # Errors
    ///
    /// Returns an error if chunk embedding or the index store upsert fails.
    pub async fn write(
        &self,
        kb: &KbId,
        blocks: &[SourceBlock],
        source_file: &str,
        file_type: &str,
        upload_date: NaiveDate,
    ) -> Result<usize, IngestError> {
        let mut chunks: Vec<Chunk> = Vec::new();

        for block in blocks {
            let cleaned = normalize(&block.text);
            if cleaned.chars().count() < MIN_BLOCK_CHARS {
                tracing::debug!(
                    source_file,
                    page = block.page,
                    "skipping block below minimum length"
                );
                continue;
            }

            let fragments = self
                .chunker
                .chunk(&cleaned, ChunkMode::Semantic, self.embedder.as_ref())
                .await;

            let parent_id = ChunkId::generate();
            chunks.push(Chunk {
                id: parent_id,
                text: cleaned.clone(),
                source_file: source_file.to_owned(),
                file_type: file_type.to_owned(),
                upload_date,
                page: block.page,
                is_parent: true,
                parent_id: None,
                tags: Vec::new(),
                image_ref: block.image_ref.clone(),
            });

            let single_identical = fragments.len() == 1 && fragments[0] == cleaned;
            if !single_identical {
                for fragment in fragments {
                    chunks.push(Chunk {
                        id: ChunkId::generate(),
                        text: fragment,
                        source_file: source_file.to_owned(),
                        file_type: file_type.to_owned(),
                        upload_date,
                        page: block.page,
                        is_parent: false,
                        parent_id: Some(parent_id),
                        tags: Vec::new(),
                        image_ref: block.image_ref.clone(),
                    });
                }
            }
        }

        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_all(&texts).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord { chunk, vector })
            .collect();
        let written = records.len();

        self.store.ensure_kb(kb).await?;
        self.store.upsert_batch(kb, records).await?;
        tracing::info!(%kb, source_file, chunks = written, "indexed file");
        Ok(written)
    }

    /// One embedding request per `batch_limit` texts, to bound request count
    /// per file.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embedder.batch_limit()) {
            vectors.extend(self.embedder.embed_batch(batch).await?);
        }
        if vectors.len() != texts.len() {
            return Err(IngestError::Embed(LlmError::EmbedCountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            }));
        }
        Ok(vectors)
    }
}
