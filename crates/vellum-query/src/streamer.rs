//! The ordered answer-stream protocol.
//!
//! Every stream is `Sources → Answer* → Stats → Done`: citations land first
//! so a client can render them before any text arrives, deltas pass through
//! in generation order, and the terminator is emitted exactly once on every
//! path, including mid-stream generation failure. When the consumer goes
//! away the producer task stops at its next send, which drops the
//! generation stream and cancels the underlying call.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use vellum_core::types::Citation;
use vellum_llm::{GenerationProvider, Message, StreamDelta};

/// User-facing text when generation dies after streaming began.
pub(crate) const GENERATION_APOLOGY: &str =
    "Sorry, something went wrong while generating this answer. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamStats {
    /// Seconds spent generating, rounded to centiseconds.
    pub time: f64,
    pub tokens: u64,
    pub doc_count: usize,
}

/// One server-pushed event of the answer protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Sources(Vec<Citation>),
    Answer(String),
    Stats(StreamStats),
    Done,
}

impl StreamEvent {
    /// The wire form: `{"sources": […]}`, `{"answer": "…"}`,
    /// `{"stats": {…}}`, or the literal `[DONE]` sentinel.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Sources(sources) => serde_json::json!({ "sources": sources }).to_string(),
            Self::Answer(delta) => serde_json::json!({ "answer": delta }).to_string(),
            Self::Stats(stats) => serde_json::json!({
                "stats": {
                    "time": stats.time,
                    "tokens": stats.tokens,
                    "doc_count": stats.doc_count,
                }
            })
            .to_string(),
            Self::Done => "[DONE]".to_owned(),
        }
    }

    /// The event as one SSE frame.
    #[must_use]
    pub fn sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_wire())
    }
}

pub struct AnswerStreamer<P> {
    provider: Arc<P>,
}

impl<P: GenerationProvider + 'static> AnswerStreamer<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Stream one answer. Citations are emitted before generation starts.
    pub fn stream(
        &self,
        messages: Vec<Message>,
        sources: Vec<Citation>,
    ) -> ReceiverStream<StreamEvent> {
        let provider = Arc::clone(&self.provider);
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let doc_count = sources.len();
            if tx.send(StreamEvent::Sources(sources)).await.is_err() {
                return;
            }

            let start = Instant::now();
            let mut tokens = 0;
            match provider.generate_stream(&messages).await {
                Ok(mut deltas) => {
                    while let Some(item) = deltas.next().await {
                        match item {
                            Ok(StreamDelta::Text(delta)) => {
                                if tx.send(StreamEvent::Answer(delta)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(StreamDelta::Usage(usage)) => tokens = usage.total_tokens,
                            Err(e) => {
                                tracing::warn!(error = %e, "generation failed mid-stream");
                                if tx
                                    .send(StreamEvent::Answer(GENERATION_APOLOGY.to_owned()))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "generation stream could not be established");
                    if tx
                        .send(StreamEvent::Answer(GENERATION_APOLOGY.to_owned()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }

            let stats = StreamStats {
                time: round_centis(start.elapsed().as_secs_f64()),
                tokens,
                doc_count,
            };
            if tx.send(StreamEvent::Stats(stats)).await.is_err() {
                return;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        ReceiverStream::new(rx)
    }
}

/// Stream a fixed, fully-formed answer through the same protocol, used for
/// curated degradations ("nothing found", "retrieval unavailable").
pub(crate) fn canned_stream(answer: String, sources: Vec<Citation>) -> ReceiverStream<StreamEvent> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        let doc_count = sources.len();
        if tx.send(StreamEvent::Sources(sources)).await.is_err() {
            return;
        }
        if tx.send(StreamEvent::Answer(answer)).await.is_err() {
            return;
        }
        let stats = StreamStats {
            time: 0.0,
            tokens: 0,
            doc_count,
        };
        if tx.send(StreamEvent::Stats(stats)).await.is_err() {
            return;
        }
        let _ = tx.send(StreamEvent::Done).await;
    });
    ReceiverStream::new(rx)
}

fn round_centis(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
