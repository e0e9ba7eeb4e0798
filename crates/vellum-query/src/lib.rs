//! Query path of the vellum pipeline: rewrite and classify the question,
//! retrieve hybrid candidates, assemble a citation-tagged context, and
//! stream the generated answer as an ordered event sequence.

pub mod assembler;
pub mod engine;
pub mod planner;
pub mod retriever;
pub mod streamer;

pub use assembler::{Assembly, ContextAssembler};
pub use engine::{AnswerResponse, QueryEngine};
pub use planner::{Intent, QueryPlan, QueryPlanner, is_list_intent};
pub use retriever::HybridRetriever;
pub use streamer::{AnswerStreamer, StreamEvent, StreamStats};
