//! Qdrant-backed [`IndexStore`].
//!
//! One collection per knowledge base (`kb_<id>`), carrying a named dense
//! vector and a named sparse `keywords` vector. The sparse side holds
//! client-computed term frequencies over the unigram-spaced keyword tokens,
//! with hashed term ids; qdrant applies its IDF modifier server-side, which
//! yields BM25-style keyword scoring. The two legs are searched separately
//! and fused client-side with the same relative-score formula the in-memory
//! store uses.

use std::collections::{BTreeMap, HashMap};

use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, GetPointsBuilder,
    Modifier, NamedVectors, PointId, PointStruct, Query, QueryPointsBuilder, ScrollPointsBuilder,
    SetPayloadPointsBuilder, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Vector, VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use vellum_core::types::{Chunk, ChunkId, KbId, RetrievalHit};

use crate::error::IndexError;
use crate::fusion::fuse;
use crate::store::{BoxFuture, ChunkRecord, HybridQuery, IndexStore};
use crate::tokenize::keyword_tokens;

const DENSE_VECTOR: &str = "dense";
const SPARSE_VECTOR: &str = "keywords";
const KB_PREFIX: &str = "kb_";
const SCROLL_PAGE: u32 = 256;

pub struct QdrantIndex {
    client: Qdrant,
    dense_dims: u64,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("dense_dims", &self.dense_dims)
            .finish_non_exhaustive()
    }
}

impl QdrantIndex {
    /// Connect to a qdrant instance. `dense_dims` must match the embedding
    /// provider's vector size.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed.
    pub fn new(url: &str, dense_dims: u64) -> Result<Self, IndexError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(Self { client, dense_dims })
    }

    async fn ensure_collection(&self, kb: &KbId) -> Result<String, IndexError> {
        let name = collection_name(kb);
        let exists = self
            .client
            .collection_exists(&name)
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        if exists {
            return Ok(name);
        }

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            DENSE_VECTOR,
            VectorParamsBuilder::new(self.dense_dims, Distance::Cosine),
        );
        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(
            SPARSE_VECTOR,
            SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&name)
                    .vectors_config(vectors)
                    .sparse_vectors_config(sparse),
            )
            .await
            .map_err(|e| IndexError::Collection(e.to_string()))?;
        tracing::info!(collection = %name, "created knowledge base collection");
        Ok(name)
    }

    async fn count_where_source(
        &self,
        collection: &str,
        source_file: &str,
    ) -> Result<u64, IndexError> {
        let filter = source_filter(source_file);
        let mut count = 0;
        let mut offset = None;
        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .filter(filter.clone())
                .limit(SCROLL_PAGE)
                .with_payload(false);
            if let Some(o) = offset {
                builder = builder.offset(o);
            }
            let page = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| IndexError::Aggregate(e.to_string()))?;
            count += page.result.len() as u64;
            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(count)
    }
}

fn collection_name(kb: &KbId) -> String {
    format!("{KB_PREFIX}{kb}")
}

fn source_filter(source_file: &str) -> Filter {
    Filter::must([Condition::matches("source_file", source_file.to_owned())])
}

/// Client-side sparse representation of the keyword tokens: hashed term id
/// per token, term frequency as the value.
fn sparse_terms(text: &str) -> (Vec<u32>, Vec<f32>) {
    let mut tf: HashMap<u32, f32> = HashMap::new();
    for token in keyword_tokens(text) {
        *tf.entry(term_id(&token)).or_default() += 1.0;
    }
    let mut pairs: Vec<(u32, f32)> = tf.into_iter().collect();
    pairs.sort_unstable_by_key(|(i, _)| *i);
    pairs.into_iter().unzip()
}

fn term_id(token: &str) -> u32 {
    let hash = blake3::hash(token.as_bytes());
    let b = hash.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn chunk_to_payload(chunk: &Chunk) -> Result<Payload, IndexError> {
    let value = serde_json::to_value(chunk).map_err(|e| IndexError::Payload(e.to_string()))?;
    Payload::try_from(value).map_err(|e| IndexError::Payload(e.to_string()))
}

fn chunk_from_payload(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> Result<Chunk, IndexError> {
    let value = serde_json::to_value(payload).map_err(|e| IndexError::Payload(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| IndexError::Payload(e.to_string()))
}

impl IndexStore for QdrantIndex {
    fn ensure_kb(&self, kb: &KbId) -> BoxFuture<'_, Result<(), IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            self.ensure_collection(&kb).await?;
            Ok(())
        })
    }

    fn delete_kb(&self, kb: &KbId) -> BoxFuture<'_, Result<(), IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            self.client
                .delete_collection(collection_name(&kb))
                .await
                .map_err(|e| IndexError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn list_kbs(&self) -> BoxFuture<'_, Result<Vec<KbId>, IndexError>> {
        Box::pin(async move {
            let response = self
                .client
                .list_collections()
                .await
                .map_err(|e| IndexError::Unavailable(e.to_string()))?;
            let mut kbs: Vec<KbId> = response
                .collections
                .into_iter()
                .filter_map(|c| {
                    c.name
                        .strip_prefix(KB_PREFIX)
                        .map(|id| KbId::new(id.to_owned()))
                })
                .collect();
            kbs.sort();
            Ok(kbs)
        })
    }

    fn upsert_batch(
        &self,
        kb: &KbId,
        records: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, Result<(), IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }
            let collection = self.ensure_collection(&kb).await?;

            let mut points = Vec::with_capacity(records.len());
            for record in records {
                let (indices, values) = sparse_terms(&record.chunk.text);
                let vectors = NamedVectors::default()
                    .add_vector(DENSE_VECTOR, Vector::new_dense(record.vector))
                    .add_vector(SPARSE_VECTOR, Vector::new_sparse(indices, values));
                let payload = chunk_to_payload(&record.chunk)?;
                points.push(PointStruct::new(
                    record.chunk.id.to_string(),
                    vectors,
                    payload,
                ));
            }

            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points))
                .await
                .map_err(|e| IndexError::Upsert(e.to_string()))?;
            Ok(())
        })
    }

    fn hybrid_query(
        &self,
        kb: &KbId,
        query: HybridQuery,
    ) -> BoxFuture<'_, Result<Vec<RetrievalHit>, IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let collection = collection_name(&kb);
            let limit = query.limit as u64;

            let mut chunks: HashMap<ChunkId, Chunk> = HashMap::new();
            let mut dense_leg: Vec<(ChunkId, f32)> = Vec::new();
            let mut keyword_leg: Vec<(ChunkId, f32)> = Vec::new();

            if query.alpha > 0.0
                && let Some(vector) = query.vector
            {
                let response = self
                    .client
                    .query(
                        QueryPointsBuilder::new(&collection)
                            .query(Query::new_nearest(vector))
                            .using(DENSE_VECTOR)
                            .limit(limit)
                            .with_payload(true),
                    )
                    .await
                    .map_err(|e| IndexError::Search(e.to_string()))?;
                for point in response.result {
                    let chunk = chunk_from_payload(&point.payload)?;
                    dense_leg.push((chunk.id, point.score));
                    chunks.insert(chunk.id, chunk);
                }
            }

            if query.alpha < 1.0 {
                let (indices, values) = sparse_terms(&query.keyword_text);
                if !indices.is_empty() {
                    let response = self
                        .client
                        .query(
                            QueryPointsBuilder::new(&collection)
                                .query(Query::new_nearest(VectorInput::new_sparse(
                                    indices, values,
                                )))
                                .using(SPARSE_VECTOR)
                                .limit(limit)
                                .with_payload(true),
                        )
                        .await
                        .map_err(|e| IndexError::Search(e.to_string()))?;
                    for point in response.result {
                        let chunk = chunk_from_payload(&point.payload)?;
                        keyword_leg.push((chunk.id, point.score));
                        chunks.insert(chunk.id, chunk);
                    }
                }
            }

            let fused = fuse(&dense_leg, &keyword_leg, query.alpha, query.limit);
            Ok(fused
                .into_iter()
                .filter_map(|(id, score)| {
                    chunks.get(&id).map(|chunk| ChunkRecord::to_hit(chunk, score))
                })
                .collect())
        })
    }

    fn fetch_by_id(
        &self,
        kb: &KbId,
        id: ChunkId,
    ) -> BoxFuture<'_, Result<Option<Chunk>, IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let ids = vec![PointId::from(id.to_string())];
            let response = self
                .client
                .get_points(GetPointsBuilder::new(collection_name(&kb), ids).with_payload(true))
                .await
                .map_err(|e| IndexError::Fetch(e.to_string()))?;
            match response.result.first() {
                Some(point) => Ok(Some(chunk_from_payload(&point.payload)?)),
                None => Ok(None),
            }
        })
    }

    fn delete_where_source(
        &self,
        kb: &KbId,
        source_file: &str,
    ) -> BoxFuture<'_, Result<u64, IndexError>> {
        let kb = kb.clone();
        let source_file = source_file.to_owned();
        Box::pin(async move {
            let collection = collection_name(&kb);
            let count = self.count_where_source(&collection, &source_file).await?;
            if count == 0 {
                return Ok(0);
            }
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection)
                        .points(source_filter(&source_file))
                        .wait(true),
                )
                .await
                .map_err(|e| IndexError::Delete(e.to_string()))?;
            tracing::debug!(%kb, source_file, count, "deleted chunks for source file");
            Ok(count)
        })
    }

    fn aggregate_count_by_source(
        &self,
        kb: &KbId,
    ) -> BoxFuture<'_, Result<BTreeMap<String, u64>, IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let collection = collection_name(&kb);
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            let mut offset = None;
            loop {
                let mut builder = ScrollPointsBuilder::new(&collection)
                    .limit(SCROLL_PAGE)
                    .with_payload(true);
                if let Some(o) = offset {
                    builder = builder.offset(o);
                }
                let page = self
                    .client
                    .scroll(builder)
                    .await
                    .map_err(|e| IndexError::Aggregate(e.to_string()))?;
                for point in &page.result {
                    if let Some(source) = point.payload.get("source_file").and_then(|v| v.as_str())
                    {
                        *counts.entry(source.to_owned()).or_default() += 1;
                    }
                }
                match page.next_page_offset {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }
            Ok(counts)
        })
    }

    fn update_tags(
        &self,
        kb: &KbId,
        source_file: &str,
        tags: Vec<String>,
    ) -> BoxFuture<'_, Result<u64, IndexError>> {
        let kb = kb.clone();
        let source_file = source_file.to_owned();
        Box::pin(async move {
            let collection = collection_name(&kb);
            let count = self.count_where_source(&collection, &source_file).await?;
            if count == 0 {
                return Ok(0);
            }
            let payload = Payload::try_from(serde_json::json!({ "tags": tags }))
                .map_err(|e| IndexError::Payload(e.to_string()))?;
            self.client
                .set_payload(
                    SetPayloadPointsBuilder::new(collection, payload)
                        .points_selector(source_filter(&source_file))
                        .wait(true),
                )
                .await
                .map_err(|e| IndexError::Upsert(e.to_string()))?;
            Ok(count)
        })
    }
}
