//! In-memory reference implementation of [`IndexStore`].
//!
//! Serves as the standard harness for pipeline tests and documents the
//! hybrid scoring contract: cosine similarity on the dense leg, query-token
//! frequency on the keyword leg, fused by relative-score fusion.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use vellum_core::types::{Chunk, ChunkId, KbId, RetrievalHit};

use crate::error::IndexError;
use crate::fusion::fuse;
use crate::store::{BoxFuture, ChunkRecord, HybridQuery, IndexStore};
use crate::tokenize::keyword_tokens;

struct StoredRecord {
    chunk: Chunk,
    vector: Vec<f32>,
    tokens: Vec<String>,
}

pub struct InMemoryIndex {
    kbs: RwLock<HashMap<KbId, HashMap<ChunkId, StoredRecord>>>,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kbs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Term-frequency overlap of the query tokens against one document.
fn keyword_score(query_tokens: &[String], doc_tokens: &[String]) -> f32 {
    if query_tokens.is_empty() || doc_tokens.is_empty() {
        return 0.0;
    }
    let mut tf: HashMap<&str, usize> = HashMap::new();
    for t in doc_tokens {
        *tf.entry(t.as_str()).or_default() += 1;
    }
    let matched: usize = query_tokens
        .iter()
        .map(|t| tf.get(t.as_str()).copied().unwrap_or(0))
        .sum();
    #[expect(clippy::cast_precision_loss)]
    let score = matched as f32 / doc_tokens.len() as f32;
    score
}

impl IndexStore for InMemoryIndex {
    fn ensure_kb(&self, kb: &KbId) -> BoxFuture<'_, Result<(), IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let mut kbs = self
                .kbs
                .write()
                .map_err(|e| IndexError::Collection(e.to_string()))?;
            kbs.entry(kb).or_default();
            Ok(())
        })
    }

    fn delete_kb(&self, kb: &KbId) -> BoxFuture<'_, Result<(), IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let mut kbs = self
                .kbs
                .write()
                .map_err(|e| IndexError::Delete(e.to_string()))?;
            kbs.remove(&kb);
            Ok(())
        })
    }

    fn list_kbs(&self) -> BoxFuture<'_, Result<Vec<KbId>, IndexError>> {
        Box::pin(async move {
            let kbs = self
                .kbs
                .read()
                .map_err(|e| IndexError::Collection(e.to_string()))?;
            let mut ids: Vec<KbId> = kbs.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn upsert_batch(
        &self,
        kb: &KbId,
        records: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, Result<(), IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let mut kbs = self
                .kbs
                .write()
                .map_err(|e| IndexError::Upsert(e.to_string()))?;
            let col = kbs.entry(kb).or_default();
            for record in records {
                let tokens = keyword_tokens(&record.chunk.text);
                col.insert(
                    record.chunk.id,
                    StoredRecord {
                        chunk: record.chunk,
                        vector: record.vector,
                        tokens,
                    },
                );
            }
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
            let kbs = self
                .kbs
                .read()
                .map_err(|e| IndexError::Search(e.to_string()))?;
            let Some(col) = kbs.get(&kb) else {
                return Ok(Vec::new());
            };

            let query_tokens = keyword_tokens(&query.keyword_text);
            let keyword_leg: Vec<(ChunkId, f32)> = col
                .values()
                .filter_map(|r| {
                    let s = keyword_score(&query_tokens, &r.tokens);
                    (s > 0.0).then_some((r.chunk.id, s))
                })
                .collect();

            let dense_leg: Vec<(ChunkId, f32)> = match &query.vector {
                Some(v) if query.alpha > 0.0 => col
                    .values()
                    .map(|r| (r.chunk.id, cosine_similarity(v, &r.vector)))
                    .collect(),
                _ => Vec::new(),
            };

            let fused = fuse(&dense_leg, &keyword_leg, query.alpha, query.limit);
            let hits = fused
                .into_iter()
                .filter_map(|(id, score)| {
                    col.get(&id).map(|r| ChunkRecord::to_hit(&r.chunk, score))
                })
                .collect();
            Ok(hits)
        })
    }

    fn fetch_by_id(
        &self,
        kb: &KbId,
        id: ChunkId,
    ) -> BoxFuture<'_, Result<Option<Chunk>, IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let kbs = self
                .kbs
                .read()
                .map_err(|e| IndexError::Fetch(e.to_string()))?;
            Ok(kbs
                .get(&kb)
                .and_then(|col| col.get(&id))
                .map(|r| r.chunk.clone()))
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
            let mut kbs = self
                .kbs
                .write()
                .map_err(|e| IndexError::Delete(e.to_string()))?;
            let Some(col) = kbs.get_mut(&kb) else {
                return Ok(0);
            };
            let before = col.len();
            col.retain(|_, r| r.chunk.source_file != source_file);
            Ok((before - col.len()) as u64)
        })
    }

    fn aggregate_count_by_source(
        &self,
        kb: &KbId,
    ) -> BoxFuture<'_, Result<BTreeMap<String, u64>, IndexError>> {
        let kb = kb.clone();
        Box::pin(async move {
            let kbs = self
                .kbs
                .read()
                .map_err(|e| IndexError::Aggregate(e.to_string()))?;
            let mut counts = BTreeMap::new();
            if let Some(col) = kbs.get(&kb) {
                for r in col.values() {
                    *counts.entry(r.chunk.source_file.clone()).or_default() += 1;
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
            let mut kbs = self
                .kbs
                .write()
                .map_err(|e| IndexError::Upsert(e.to_string()))?;
            let Some(col) = kbs.get_mut(&kb) else {
                return Ok(0);
            };
            let mut touched = 0;
            for r in col.values_mut() {
                if r.chunk.source_file == source_file {
                    r.chunk.tags = tags.clone();
                    touched += 1;
                }
            }
            Ok(touched)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn chunk(text: &str, source: &str, parent: Option<ChunkId>) -> Chunk {
        Chunk {
            id: ChunkId::generate(),
            text: text.into(),
            source_file: source.into(),
            file_type: "text".into(),
            upload_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            page: 1,
            is_parent: parent.is_none(),
            parent_id: parent,
            tags: Vec::new(),
            image_ref: None,
        }
    }

    fn record(text: &str, source: &str, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            chunk: chunk(text, source, None),
            vector,
        }
    }

    async fn seeded() -> (InMemoryIndex, KbId) {
        let store = InMemoryIndex::new();
        let kb = KbId::default_kb();
        store.ensure_kb(&kb).await.unwrap();
        store
            .upsert_batch(
                &kb,
                vec![
                    record("alpha report on revenue", "a.txt", vec![1.0, 0.0]),
                    record("beta memo on staffing", "b.txt", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        (store, kb)
    }

    #[tokio::test]
    async fn keyword_only_query_matches_terms() {
        let (store, kb) = seeded().await;
        let hits = store
            .hybrid_query(
                &kb,
                HybridQuery {
                    keyword_text: "revenue".into(),
                    vector: None,
                    alpha: 0.0,
                    limit: 10,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_file, "a.txt");
    }

    #[tokio::test]
    async fn vector_only_query_ranks_by_cosine() {
        let (store, kb) = seeded().await;
        let hits = store
            .hybrid_query(
                &kb,
                HybridQuery {
                    keyword_text: "unrelated".into(),
                    vector: Some(vec![0.0, 1.0]),
                    alpha: 1.0,
                    limit: 10,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].source_file, "b.txt");
    }

    #[tokio::test]
    async fn cjk_query_matches_via_unigrams() {
        let store = InMemoryIndex::new();
        let kb = KbId::default_kb();
        store
            .upsert_batch(&kb, vec![record("这是年度报告", "年报.pdf", vec![0.5, 0.5])])
            .await
            .unwrap();
        let hits = store
            .hybrid_query(
                &kb,
                HybridQuery {
                    keyword_text: cjk_unigrams_for_test("报告"),
                    vector: None,
                    alpha: 0.0,
                    limit: 5,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    fn cjk_unigrams_for_test(text: &str) -> String {
        crate::tokenize::cjk_unigrams(text)
    }

    #[tokio::test]
    async fn kb_isolation() {
        let store = InMemoryIndex::new();
        let kb_a = KbId::new("finance");
        let kb_b = KbId::new("legal");
        store
            .upsert_batch(&kb_a, vec![record("budget numbers", "x.txt", vec![1.0])])
            .await
            .unwrap();
        store.ensure_kb(&kb_b).await.unwrap();

        let hits = store
            .hybrid_query(
                &kb_b,
                HybridQuery {
                    keyword_text: "budget".into(),
                    vector: None,
                    alpha: 0.0,
                    limit: 5,
                },
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn fetch_by_id_roundtrip() {
        let store = InMemoryIndex::new();
        let kb = KbId::default_kb();
        let rec = record("fetch me", "c.txt", vec![1.0]);
        let id = rec.chunk.id;
        store.upsert_batch(&kb, vec![rec]).await.unwrap();

        let fetched = store.fetch_by_id(&kb, id).await.unwrap().unwrap();
        assert_eq!(fetched.text, "fetch me");
        assert!(
            store
                .fetch_by_id(&kb, ChunkId::generate())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_where_source_counts() {
        let (store, kb) = seeded().await;
        assert_eq!(store.delete_where_source(&kb, "a.txt").await.unwrap(), 1);
        assert_eq!(store.delete_where_source(&kb, "a.txt").await.unwrap(), 0);
        let counts = store.aggregate_count_by_source(&kb).await.unwrap();
        assert!(!counts.contains_key("a.txt"));
        assert_eq!(counts["b.txt"], 1);
    }

    #[tokio::test]
    async fn aggregate_is_sorted_by_filename() {
        let (store, kb) = seeded().await;
        let counts = store.aggregate_count_by_source(&kb).await.unwrap();
        let files: Vec<&String> = counts.keys().collect();
        assert_eq!(files, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn update_tags_touches_all_chunks_of_file() {
        let store = InMemoryIndex::new();
        let kb = KbId::default_kb();
        store
            .upsert_batch(
                &kb,
                vec![
                    record("part one", "doc.pdf", vec![1.0]),
                    record("part two", "doc.pdf", vec![1.0]),
                    record("other", "misc.txt", vec![1.0]),
                ],
            )
            .await
            .unwrap();

        let touched = store
            .update_tags(&kb, "doc.pdf", vec!["finance".into()])
            .await
            .unwrap();
        assert_eq!(touched, 2);
    }

    #[tokio::test]
    async fn list_kbs_sorted() {
        let store = InMemoryIndex::new();
        store.ensure_kb(&KbId::new("zeta")).await.unwrap();
        store.ensure_kb(&KbId::new("alpha")).await.unwrap();
        let kbs = store.list_kbs().await.unwrap();
        assert_eq!(kbs, vec![KbId::new("alpha"), KbId::new("zeta")]);
    }

    #[tokio::test]
    async fn limit_respected() {
        let store = InMemoryIndex::new();
        let kb = KbId::default_kb();
        let records: Vec<ChunkRecord> = (0..10)
            .map(|i| record(&format!("report number {i}"), "r.txt", vec![1.0, 0.0]))
            .collect();
        store.upsert_batch(&kb, records).await.unwrap();

        let hits = store
            .hybrid_query(
                &kb,
                HybridQuery {
                    keyword_text: "report".into(),
                    vector: Some(vec![1.0, 0.0]),
                    alpha: 0.5,
                    limit: 3,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert!((cosine_similarity(&[0.0, 0.0], &[1.0, 0.0])).abs() < f32::EPSILON);
    }
}
