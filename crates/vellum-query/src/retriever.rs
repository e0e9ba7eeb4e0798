//! Issues the adaptive hybrid query against the index store.

use std::sync::Arc;

use vellum_core::types::{KbId, RetrievalHit};
use vellum_index::{HybridQuery, IndexError, IndexStore, cjk_unigrams};
use vellum_llm::EmbeddingProvider;

pub struct HybridRetriever<E> {
    store: Arc<dyn IndexStore>,
    embedder: Arc<E>,
    default_alpha: f32,
}

impl<E: EmbeddingProvider> HybridRetriever<E> {
    pub fn new(store: Arc<dyn IndexStore>, embedder: Arc<E>, default_alpha: f32) -> Self {
        Self {
            store,
            embedder,
            default_alpha,
        }
    }

    /// Ranked hits from one knowledge base under blended scoring.
    ///
    /// `alpha` of `None` uses the configured default. At `alpha` 0 the query
    /// is never embedded. A failed query embedding degrades to keyword-only
    /// scoring rather than failing the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the index store itself is unreachable or the
    /// search fails.
    pub async fn retrieve(
        &self,
        kb: &KbId,
        search_query: &str,
        alpha: Option<f32>,
        limit: usize,
    ) -> Result<Vec<RetrievalHit>, IndexError> {
        let alpha = alpha.unwrap_or(self.default_alpha).clamp(0.0, 1.0);
        let vector = self.query_vector(search_query, alpha).await;
        self.store
            .hybrid_query(
                kb,
                HybridQuery {
                    keyword_text: cjk_unigrams(search_query),
                    vector,
                    alpha,
                    limit,
                },
            )
            .await
    }

    /// Global mode: fan the query out across every knowledge base and merge
    /// by score.
    ///
    /// # Errors
    ///
    /// Returns an error if the knowledge-base listing or any per-base search
    /// fails.
    pub async fn retrieve_global(
        &self,
        search_query: &str,
        alpha: Option<f32>,
        limit: usize,
    ) -> Result<Vec<RetrievalHit>, IndexError> {
        let alpha = alpha.unwrap_or(self.default_alpha).clamp(0.0, 1.0);
        let vector = self.query_vector(search_query, alpha).await;
        let keyword_text = cjk_unigrams(search_query);

        let mut merged = Vec::new();
        for kb in self.store.list_kbs().await? {
            let hits = self
                .store
                .hybrid_query(
                    &kb,
                    HybridQuery {
                        keyword_text: keyword_text.clone(),
                        vector: vector.clone(),
                        alpha,
                        limit,
                    },
                )
                .await?;
            merged.extend(hits);
        }
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(limit);
        Ok(merged)
    }

    /// Embed the query unless alpha says the dense leg is unused.
    async fn query_vector(&self, search_query: &str, alpha: f32) -> Option<Vec<f32>> {
        if alpha <= 0.0 {
            return None;
        }
        match self.embedder.embed_batch(&[search_query.to_owned()]).await {
            Ok(mut vectors) if vectors.len() == 1 => Some(vectors.remove(0)),
            Ok(vectors) => {
                tracing::warn!(
                    got = vectors.len(),
                    "query embedding returned wrong count, degrading to keyword-only"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, degrading to keyword-only");
                None
            }
        }
    }
}
