//! Orchestrates one inbound question end to end: plan, retrieve, assemble,
//! and stream. Every degraded path produces a curated answer through the
//! same event protocol; no internal error text ever reaches the user.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use vellum_core::config::RetrievalConfig;
use vellum_core::types::{Citation, ConversationTurn, KbId, Role};
use vellum_index::IndexStore;
use vellum_llm::{EmbeddingProvider, GenerationProvider, Message, RerankProvider};

use crate::assembler::ContextAssembler;
use crate::planner::{QueryPlanner, is_list_intent};
use crate::retriever::HybridRetriever;
use crate::streamer::{AnswerStreamer, StreamEvent, StreamStats, canned_stream};

const NOTHING_FOUND: &str = "Sorry, no relevant material was found in the knowledge base.";
const RETRIEVAL_UNAVAILABLE: &str =
    "Sorry, retrieval is temporarily unavailable. Please try again shortly.";

/// A complete non-streamed answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<Citation>,
    pub stats: StreamStats,
}

pub struct QueryEngine<P, E, R> {
    planner: QueryPlanner<P>,
    retriever: HybridRetriever<E>,
    assembler: ContextAssembler<R>,
    streamer: AnswerStreamer<P>,
    generator: Arc<P>,
    store: Arc<dyn IndexStore>,
    cfg: RetrievalConfig,
}

impl<P, E, R> QueryEngine<P, E, R>
where
    P: GenerationProvider + 'static,
    E: EmbeddingProvider,
    R: RerankProvider,
{
    pub fn new(
        generator: Arc<P>,
        embedder: Arc<E>,
        reranker: Arc<R>,
        store: Arc<dyn IndexStore>,
        cfg: RetrievalConfig,
    ) -> Self {
        Self {
            planner: QueryPlanner::new(Arc::clone(&generator), cfg.history_window),
            retriever: HybridRetriever::new(Arc::clone(&store), embedder, cfg.hybrid_alpha),
            assembler: ContextAssembler::new(Arc::clone(&store), reranker),
            streamer: AnswerStreamer::new(Arc::clone(&generator)),
            generator,
            store,
            cfg,
        }
    }

    /// Answer one question as an ordered event stream.
    pub async fn answer_stream(
        &self,
        kb: &KbId,
        query: &str,
        history: &[ConversationTurn],
    ) -> ReceiverStream<StreamEvent> {
        match self.prepare(kb, query, history).await {
            Prepared::Grounded { messages, sources } => self.streamer.stream(messages, sources),
            Prepared::Canned(answer) => canned_stream(answer, Vec::new()),
        }
    }

    /// Answer one question in a single blocking round trip.
    pub async fn answer_once(
        &self,
        kb: &KbId,
        query: &str,
        history: &[ConversationTurn],
    ) -> AnswerResponse {
        match self.prepare(kb, query, history).await {
            Prepared::Grounded { messages, sources } => {
                let start = std::time::Instant::now();
                match self.generator.generate(&messages).await {
                    Ok((answer, usage)) => AnswerResponse {
                        answer,
                        stats: StreamStats {
                            time: (start.elapsed().as_secs_f64() * 100.0).round() / 100.0,
                            tokens: usage.total_tokens,
                            doc_count: sources.len(),
                        },
                        sources,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "generation failed");
                        AnswerResponse {
                            answer: crate::streamer::GENERATION_APOLOGY.to_owned(),
                            stats: StreamStats {
                                time: 0.0,
                                tokens: 0,
                                doc_count: sources.len(),
                            },
                            sources,
                        }
                    }
                }
            }
            Prepared::Canned(answer) => AnswerResponse {
                answer,
                sources: Vec::new(),
                stats: StreamStats {
                    time: 0.0,
                    tokens: 0,
                    doc_count: 0,
                },
            },
        }
    }

    /// The shared front half of both answer paths.
    async fn prepare(&self, kb: &KbId, query: &str, history: &[ConversationTurn]) -> Prepared {
        let plan = self.planner.plan(query, history).await;
        tracing::debug!(
            intent = ?plan.intent,
            search_query = %plan.search_query,
            "planned retrieval"
        );

        let hits = match self
            .retriever
            .retrieve(kb, &plan.search_query, plan.alpha, plan.result_limit)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!(error = %e, %kb, "index store unavailable on query path");
                return Prepared::Canned(RETRIEVAL_UNAVAILABLE.to_owned());
            }
        };

        let mut context_blocks = Vec::new();
        if is_list_intent(query) {
            match self.store.aggregate_count_by_source(kb).await {
                Ok(counts) => context_blocks.push(file_enumeration_block(kb, &counts)),
                Err(e) => {
                    tracing::warn!(error = %e, "file enumeration failed, continuing without it");
                }
            }
        }

        let assembly = self
            .assembler
            .assemble(kb, &plan.search_query, hits, self.cfg.rerank_top_n)
            .await;
        let sources = assembly.sources;
        context_blocks.extend(assembly.context_blocks);

        if context_blocks.is_empty() {
            return Prepared::Canned(NOTHING_FOUND.to_owned());
        }

        Prepared::Grounded {
            messages: build_messages(query, history, &context_blocks),
            sources,
        }
    }
}

enum Prepared {
    Grounded {
        messages: Vec<Message>,
        sources: Vec<Citation>,
    },
    Canned(String),
}

/// System-authored context block enumerating every indexed file, prepended
/// ahead of retrieved passages when the query asks for the file inventory.
fn file_enumeration_block(kb: &KbId, counts: &BTreeMap<String, u64>) -> String {
    if counts.is_empty() {
        return format!(
            "[system] Knowledge base '{kb}' is currently empty; no files have been indexed."
        );
    }
    let mut block = format!(
        "[system] Complete list of indexed files in knowledge base '{kb}' ({} total):\n",
        counts.len()
    );
    for name in counts.keys() {
        block.push_str("- ");
        block.push_str(name);
        block.push('\n');
    }
    block.push_str("Answer questions about the library from this list.");
    block
}

fn build_messages(
    query: &str,
    history: &[ConversationTurn],
    context_blocks: &[String],
) -> Vec<Message> {
    let mut context = String::new();
    for (i, block) in context_blocks.iter().enumerate() {
        context.push_str(&format!("[{}] {}\n\n", i + 1, block));
    }

    let prompt = format!(
        "Answer the user's question based on the reference material below.\n\n\
         Requirements:\n\
         1. When recommending a document, name the file and explain why.\n\
         2. Cite the fragments you rely on inline with bracketed numbers, \
         like [1].\n\
         3. If the material contains nothing relevant, say so honestly \
         instead of inventing an answer.\n\n\
         Reference material:\n{context}\
         Question: {query}\n\nAnswer:"
    );

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(
        "You are a precise enterprise knowledge assistant that answers strictly \
         from the provided reference material.",
    ));
    for turn in history {
        messages.push(match turn.role {
            Role::User => Message::user(turn.content.clone()),
            Role::Assistant => Message::assistant(turn.content.clone()),
        });
    }
    messages.push(Message::user(prompt));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_block_lists_files_sorted() {
        let mut counts = BTreeMap::new();
        counts.insert("b.pdf".to_owned(), 4);
        counts.insert("a.txt".to_owned(), 2);
        let block = file_enumeration_block(&KbId::default_kb(), &counts);
        assert!(block.contains("(2 total)"));
        let a_pos = block.find("- a.txt").unwrap();
        let b_pos = block.find("- b.pdf").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn enumeration_block_for_empty_kb() {
        let block = file_enumeration_block(&KbId::new("empty"), &BTreeMap::new());
        assert!(block.contains("currently empty"));
    }

    #[test]
    fn messages_carry_history_and_numbered_context() {
        let history = [
            ConversationTurn::user("earlier question"),
            ConversationTurn::assistant("earlier answer"),
        ];
        let blocks = ["[source: a.txt]\nfirst".to_owned(), "[source: b.txt]\nsecond".to_owned()];
        let messages = build_messages("the question", &history, &blocks);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, vellum_llm::Role::System);
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[2].content, "earlier answer");
        let prompt = &messages[3].content;
        assert!(prompt.contains("[1] [source: a.txt]"));
        assert!(prompt.contains("[2] [source: b.txt]"));
        assert!(prompt.contains("Question: the question"));
    }
}
