use eventsource_stream::Eventsource;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::error::LlmError;
use crate::provider::{GenerationStream, StreamDelta, Usage};

/// Convert an OpenAI-compatible streaming response into a [`GenerationStream`].
///
/// Text deltas come through in generation order; when the backend reports
/// final usage (an extra chunk with empty `choices`), it is surfaced as a
/// trailing [`StreamDelta::Usage`] item.
pub(crate) fn openai_sse_to_stream(response: reqwest::Response) -> GenerationStream {
    let event_stream = response.bytes_stream().eventsource();
    let mapped = event_stream.filter_map(|event| match event {
        Ok(event) => parse_sse_event(&event.data),
        Err(e) => Some(Err(LlmError::SseParse(e.to_string()))),
    });
    Box::pin(mapped)
}

fn parse_sse_event(data: &str) -> Option<Result<StreamDelta, LlmError>> {
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(content) = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
                .filter(|c| !c.is_empty())
            {
                return Some(Ok(StreamDelta::Text(content.to_owned())));
            }
            chunk.usage.map(|u| {
                Ok(StreamDelta::Usage(Usage {
                    total_tokens: u.total_tokens,
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                }))
            })
        }
        Err(e) => Some(Err(LlmError::SseParse(format!(
            "failed to parse SSE data: {e}"
        )))),
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: WireDelta,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}
