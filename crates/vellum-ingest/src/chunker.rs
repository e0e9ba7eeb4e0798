//! Sentence-level chunking with semantic grouping.
//!
//! `Fixed` mode is a deterministic sliding window breaking preferentially at
//! paragraph, then sentence, then whitespace boundaries. `Semantic` mode
//! embeds sentences and starts a new fragment at similarity drops; any
//! problem with the embedding collaborator silently degrades to `Fixed` on
//! the same input, so ingestion never fails because of chunk quality.

use vellum_core::config::ChunkingConfig;
use vellum_llm::EmbeddingProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    Semantic,
    Fixed,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    cfg: ChunkingConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(cfg: ChunkingConfig) -> Self {
        Self { cfg }
    }

    /// Split `text` into an ordered sequence of fragments.
    pub async fn chunk<E: EmbeddingProvider>(
        &self,
        text: &str,
        mode: ChunkMode,
        embedder: &E,
    ) -> Vec<String> {
        match mode {
            ChunkMode::Fixed => self.split_fixed(text),
            ChunkMode::Semantic => self.split_semantic(text, embedder).await,
        }
    }

    /// Deterministic sliding-window split. Fragments are contiguous slices
    /// of the input; with zero overlap their concatenation reconstructs it
    /// exactly. Never breaks mid-character.
    #[must_use]
    pub fn split_fixed(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let target = self.cfg.target_size.max(1);
        let overlap = self.cfg.overlap.min(target.saturating_sub(1));

        let mut fragments = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let hard_end = (start + target).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                find_break(&chars, start, hard_end)
            };
            fragments.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start = (end.saturating_sub(overlap)).max(start + 1);
        }
        fragments
    }

    async fn split_semantic<E: EmbeddingProvider>(&self, text: &str, embedder: &E) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let sentences = split_sentences(text);
        if sentences.len() < 2 {
            return self.split_fixed(text);
        }

        let embeddings = match embed_batched(embedder, &sentences).await {
            Ok(vectors) if vectors.len() == sentences.len() => vectors,
            Ok(vectors) => {
                tracing::warn!(
                    expected = sentences.len(),
                    got = vectors.len(),
                    "sentence embedding count mismatch, falling back to fixed chunking"
                );
                return self.split_fixed(text);
            }
            Err(e) => {
                tracing::warn!(error = %e, "sentence embedding failed, falling back to fixed chunking");
                return self.split_fixed(text);
            }
        };

        let mut fragments = Vec::new();
        let mut current = sentences[0].clone();
        let mut current_len = current.chars().count();
        for i in 1..sentences.len() {
            let similarity = cosine_similarity(&embeddings[i - 1], &embeddings[i]);
            let sentence_len = sentences[i].chars().count();
            if similarity < self.cfg.similarity_threshold
                || current_len + sentence_len > self.cfg.target_size
            {
                fragments.push(std::mem::take(&mut current));
                current = sentences[i].clone();
                current_len = sentence_len;
            } else {
                current.push(' ');
                current.push_str(&sentences[i]);
                current_len += 1 + sentence_len;
            }
        }
        if !current.is_empty() {
            fragments.push(current);
        }
        fragments
    }
}

/// Preferred break inside `chars[start..hard_end]`: after the last paragraph
/// break, else after the last sentence terminator, else after the last
/// whitespace, else the hard cut. Only breaks past the window midpoint so
/// fragments never degenerate.
fn find_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    let floor = start + (hard_end - start) / 2;

    let mut paragraph = None;
    let mut sentence = None;
    let mut whitespace = None;
    for i in (floor..hard_end).rev() {
        if paragraph.is_none() && chars[i] == '\n' && i > start && chars[i - 1] == '\n' {
            paragraph = Some(i + 1);
        }
        if sentence.is_none() && is_sentence_terminator(chars[i]) {
            sentence = Some(i + 1);
        }
        if whitespace.is_none() && chars[i].is_whitespace() {
            whitespace = Some(i + 1);
        }
        if paragraph.is_some() {
            break;
        }
    }

    paragraph
        .or(sentence)
        .or(whitespace)
        .map_or(hard_end, |b| b.clamp(start + 1, hard_end))
}

fn is_sentence_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '.' | '!' | '?' | '\n')
}

/// Sentence split on CJK and Latin terminators plus newline. Terminators
/// stay attached to their sentence; blank pieces are dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == '\n' {
            flush(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '。' | '！' | '？' | '.' | '!' | '?') {
            flush(&mut sentences, &mut current);
        }
    }
    flush(&mut sentences, &mut current);
    sentences
}

fn flush(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_owned());
    }
    current.clear();
}

async fn embed_batched<E: EmbeddingProvider>(
    embedder: &E,
    sentences: &[String],
) -> Result<Vec<Vec<f32>>, vellum_llm::LlmError> {
    let mut vectors = Vec::with_capacity(sentences.len());
    for batch in sentences.chunks(embedder.batch_limit()) {
        vectors.extend(embedder.embed_batch(batch).await?);
    }
    Ok(vectors)
}

/// Cosine similarity; zero vectors compare as 0 so they never merge.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
