//! Expands, deduplicates, reranks, and citation-tags retrieval hits.

use std::collections::HashSet;
use std::sync::Arc;

use vellum_core::types::{Citation, KbId, RetrievalHit};
use vellum_index::IndexStore;
use vellum_llm::RerankProvider;

/// The assembled grounding for one answer: ordered context blocks and the
/// citations to stream ahead of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub context_blocks: Vec<String>,
    pub sources: Vec<Citation>,
}

pub struct ContextAssembler<R> {
    store: Arc<dyn IndexStore>,
    reranker: Arc<R>,
}

impl<R: RerankProvider> ContextAssembler<R> {
    pub fn new(store: Arc<dyn IndexStore>, reranker: Arc<R>) -> Self {
        Self { store, reranker }
    }

    /// Small-to-big assembly:
    /// 1. child hits are substituted with their parent's full text;
    /// 2. hits expanding to the same parent collapse to the first occurrence;
    /// 3. the survivors are reranked (first-N order on rerank failure);
    /// 4. each retained hit becomes a `[source: …]` context block;
    /// 5. citations deduplicate on `(name, page)` in first-seen order.
    pub async fn assemble(
        &self,
        kb: &KbId,
        search_query: &str,
        hits: Vec<RetrievalHit>,
        rerank_top_n: usize,
    ) -> Assembly {
        let expanded = self.expand_parents(kb, hits).await;
        let deduped = dedup_by_parent(expanded);
        let order = self.rerank_order(search_query, &deduped, rerank_top_n).await;

        let mut context_blocks = Vec::with_capacity(order.len());
        let mut sources = Vec::new();
        let mut seen: HashSet<(String, u32)> = HashSet::new();
        for idx in order {
            let hit = &deduped[idx];
            context_blocks.push(format!("[source: {}]\n{}", hit.source_file, hit.text));
            if seen.insert((hit.source_file.clone(), hit.page)) {
                sources.push(Citation {
                    name: hit.source_file.clone(),
                    page: hit.page,
                    file_type: hit.file_type.clone(),
                    image_ref: hit.image_ref.clone(),
                });
            }
        }
        Assembly {
            context_blocks,
            sources,
        }
    }

    /// Retrieval precision comes from the small child chunks; answer context
    /// comes from the parent block they were cut from. A missing or
    /// unfetchable parent keeps the child's own text.
    async fn expand_parents(&self, kb: &KbId, hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
        let mut expanded = Vec::with_capacity(hits.len());
        for mut hit in hits {
            if let Some(parent_id) = hit.parent_id {
                match self.store.fetch_by_id(kb, parent_id).await {
                    Ok(Some(parent)) => hit.text = parent.text,
                    Ok(None) => {
                        tracing::warn!(%parent_id, "parent chunk missing, keeping child text");
                    }
                    Err(e) => {
                        tracing::warn!(%parent_id, error = %e, "parent fetch failed, keeping child text");
                    }
                }
            }
            expanded.push(hit);
        }
        expanded
    }

    async fn rerank_order(
        &self,
        search_query: &str,
        hits: &[RetrievalHit],
        top_n: usize,
    ) -> Vec<usize> {
        if hits.is_empty() {
            return Vec::new();
        }
        let documents: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();
        match self.reranker.rerank(search_query, &documents, top_n).await {
            Ok(indices) => indices
                .into_iter()
                .filter(|&i| i < hits.len())
                .take(top_n)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "rerank failed, falling back to first-N order");
                (0..hits.len().min(top_n)).collect()
            }
        }
    }
}

/// Keep the first hit per parent id, preserving rank order; hits without a
/// parent pass through untouched.
fn dedup_by_parent(hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::with_capacity(hits.len());
    for hit in hits {
        match hit.parent_id {
            Some(parent_id) => {
                if seen.insert(parent_id) {
                    deduped.push(hit);
                }
            }
            None => deduped.push(hit),
        }
    }
    deduped
}
