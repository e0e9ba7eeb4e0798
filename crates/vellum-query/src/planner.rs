//! Turns a conversational question into a standalone search query with
//! intent-matched retrieval parameters.
//!
//! Both collaborator calls degrade silently: a failed rewrite falls back to
//! the unmodified query, a failed classification falls back to factoid
//! defaults. A request never errors out here.

use std::sync::Arc;

use vellum_core::types::{ConversationTurn, Role};
use vellum_llm::{GenerationProvider, Message};

/// Coarse purpose of a query, used to pick retrieval parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Looking for a document rather than a fact; keyword-leaning.
    FileQuery,
    /// Wants an overview; vector-leaning with a wide candidate pool.
    Summary,
    /// Specific factual question; balanced defaults.
    Factoid,
}

impl Intent {
    #[must_use]
    pub fn parse_str(s: &str) -> Self {
        let label = s.trim().to_lowercase();
        if label.contains("file_query") || label.contains("file query") {
            Self::FileQuery
        } else if label.contains("summary") {
            Self::Summary
        } else {
            Self::Factoid
        }
    }

    /// Fixed policy table mapping intent to `(alpha, result_limit)`.
    /// `None` alpha means the configured default applies.
    #[must_use]
    pub fn retrieval_params(self) -> (Option<f32>, usize) {
        match self {
            Self::FileQuery => (Some(0.3), 30),
            Self::Summary => (Some(0.7), 40),
            Self::Factoid => (None, 20),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub search_query: String,
    /// `None` means use the configured default alpha.
    pub alpha: Option<f32>,
    pub result_limit: usize,
    pub intent: Intent,
}

/// Literal phrases meaning "what files / list files", matched against the
/// original query regardless of classification.
const LIST_PHRASES: &[&str] = &[
    "列出",
    "哪些文件",
    "什么文件",
    "所有文件",
    "文件库",
    "库里",
    "库中",
    "file list",
    "list files",
    "list all files",
    "show me files",
    "files you have",
    "what files",
];

/// Whether the query literally asks for the file inventory. Evaluated on the
/// original query, independent of intent classification.
#[must_use]
pub fn is_list_intent(query: &str) -> bool {
    let lowered = query.to_lowercase();
    LIST_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

pub struct QueryPlanner<P> {
    provider: Arc<P>,
    history_window: usize,
}

impl<P: GenerationProvider> QueryPlanner<P> {
    pub fn new(provider: Arc<P>, history_window: usize) -> Self {
        Self {
            provider,
            history_window,
        }
    }

    /// Rewrite the query against its history and classify its intent.
    /// Infallible by construction; every collaborator failure has a
    /// documented fallback.
    pub async fn plan(&self, query: &str, history: &[ConversationTurn]) -> QueryPlan {
        let search_query = self.rewrite(query, history).await;
        let intent = self.classify(query).await;
        let (alpha, result_limit) = intent.retrieval_params();
        QueryPlan {
            search_query,
            alpha,
            result_limit,
            intent,
        }
    }

    /// Compose a standalone search query from the trailing turns plus the
    /// new question. With no history the query passes through verbatim.
    async fn rewrite(&self, query: &str, history: &[ConversationTurn]) -> String {
        if history.is_empty() {
            return query.to_owned();
        }

        let tail = &history[history.len().saturating_sub(self.history_window)..];
        let mut prompt = String::from(
            "Rewrite the latest question as a single standalone search query, \
             resolving any pronouns or references from the conversation. \
             Reply with the query only.\n\nConversation:\n",
        );
        for turn in tail {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            prompt.push_str(role);
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push_str("\nLatest question: ");
        prompt.push_str(query);
        prompt.push_str("\nStandalone query:");

        match self.provider.generate(&[Message::user(prompt)]).await {
            Ok((rewritten, _)) => {
                let cleaned = strip_enclosing_quotes(rewritten.trim()).to_owned();
                if cleaned.is_empty() {
                    query.to_owned()
                } else {
                    cleaned
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "query rewrite failed, using original query");
                query.to_owned()
            }
        }
    }

    async fn classify(&self, query: &str) -> Intent {
        let prompt = format!(
            "Classify the query into exactly one of: file_query (the user \
             wants a document or file), summary (the user wants an overview \
             of material), factoid (a specific factual question). Reply with \
             the label only.\n\nQuery: {query}\nLabel:"
        );
        match self.provider.generate(&[Message::user(prompt)]).await {
            Ok((label, _)) => Intent::parse_str(&label),
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed, defaulting to factoid");
                Intent::Factoid
            }
        }
    }
}

/// Strip one pair of enclosing quotes, if present.
fn strip_enclosing_quotes(s: &str) -> &str {
    for (open, close) in [('"', '"'), ('\u{201C}', '\u{201D}'), ('\'', '\'')] {
        if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) {
            let inner = &s[open.len_utf8()..s.len() - close.len_utf8()];
            return inner.trim();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use vellum_llm::mock::MockProvider;

    use super::*;

    fn planner(mock: MockProvider) -> QueryPlanner<MockProvider> {
        QueryPlanner::new(Arc::new(mock), 5)
    }

    #[test]
    fn intent_parsing() {
        assert_eq!(Intent::parse_str("file_query"), Intent::FileQuery);
        assert_eq!(Intent::parse_str(" Summary\n"), Intent::Summary);
        assert_eq!(Intent::parse_str("factoid"), Intent::Factoid);
        assert_eq!(Intent::parse_str("gibberish"), Intent::Factoid);
    }

    #[test]
    fn policy_table_is_fixed() {
        assert_eq!(Intent::FileQuery.retrieval_params(), (Some(0.3), 30));
        assert_eq!(Intent::Summary.retrieval_params(), (Some(0.7), 40));
        assert_eq!(Intent::Factoid.retrieval_params(), (None, 20));
    }

    #[test]
    fn list_intent_phrases() {
        assert!(is_list_intent("列出所有文件"));
        assert!(is_list_intent("库里有哪些文件"));
        assert!(is_list_intent("please show me files"));
        assert!(is_list_intent("What Files do you have"));
        assert!(!is_list_intent("公司年度营收是多少"));
        assert!(!is_list_intent("how do refunds work"));
    }

    #[test]
    fn quote_stripping() {
        assert_eq!(strip_enclosing_quotes("\"hello\""), "hello");
        assert_eq!(strip_enclosing_quotes("“年度报告”"), "年度报告");
        assert_eq!(strip_enclosing_quotes("'q'"), "q");
        assert_eq!(strip_enclosing_quotes("no quotes"), "no quotes");
        assert_eq!(strip_enclosing_quotes("\"unbalanced"), "\"unbalanced");
    }

    #[tokio::test]
    async fn empty_history_passes_query_through() {
        // The single scripted response feeds classification, proving rewrite
        // made no generation call.
        let mock = MockProvider::with_responses(vec!["factoid".into()]);
        let plan = planner(mock).plan("original question", &[]).await;
        assert_eq!(plan.search_query, "original question");
        assert_eq!(plan.intent, Intent::Factoid);
    }

    #[tokio::test]
    async fn history_triggers_rewrite() {
        let mock = MockProvider::with_responses(vec![
            "\"standalone search query\"".into(),
            "factoid".into(),
        ]);
        let history = [
            ConversationTurn::user("tell me about the report"),
            ConversationTurn::assistant("it covers revenue"),
        ];
        let plan = planner(mock).plan("what about costs?", &history).await;
        assert_eq!(plan.search_query, "standalone search query");
    }

    #[tokio::test]
    async fn rewrite_failure_falls_back_to_original() {
        let mock = MockProvider::default().with_fail_generate();
        let history = [ConversationTurn::user("earlier turn")];
        let plan = planner(mock).plan("latest question", &history).await;
        assert_eq!(plan.search_query, "latest question");
        // Classification also failed, so factoid defaults apply.
        assert_eq!(plan.intent, Intent::Factoid);
        assert_eq!(plan.result_limit, 20);
        assert_eq!(plan.alpha, None);
    }

    #[tokio::test]
    async fn summary_scenario_maps_to_summary_parameters() {
        let mock = MockProvider::with_responses(vec!["summary".into()]);
        let plan = planner(mock).plan("总结一下这些报告", &[]).await;
        assert_eq!(plan.intent, Intent::Summary);
        assert_eq!(plan.alpha, Some(0.7));
        assert_eq!(plan.result_limit, 40);
    }

    #[tokio::test]
    async fn file_query_scenario_maps_to_keyword_leaning_parameters() {
        let mock = MockProvider::with_responses(vec!["file_query".into()]);
        let plan = planner(mock).plan("找一下去年的预算表格", &[]).await;
        assert_eq!(plan.intent, Intent::FileQuery);
        assert_eq!(plan.alpha, Some(0.3));
        assert_eq!(plan.result_limit, 30);
    }

    #[tokio::test]
    async fn alpha_and_limit_depend_only_on_intent() {
        for query in ["short", "很长的一个中文问题需要更多的字符", "mixed 内容 query"] {
            let mock = MockProvider::with_responses(vec!["summary".into()]);
            let plan = planner(mock).plan(query, &[]).await;
            assert_eq!(plan.alpha, Some(0.7));
            assert_eq!(plan.result_limit, 40);
        }
    }

    #[tokio::test]
    async fn rewrite_uses_only_trailing_window() {
        let mock = MockProvider::with_responses(vec!["rewritten".into(), "factoid".into()]);
        let history: Vec<ConversationTurn> = (0..12)
            .map(|i| ConversationTurn::user(format!("turn {i}")))
            .collect();
        // Ten oldest turns must not appear in the prompt; just verify the
        // call succeeds and produces the scripted rewrite.
        let plan = planner(mock).plan("final", &history).await;
        assert_eq!(plan.search_query, "rewritten");
    }
}
