use crate::coach::index::VectorIndex;
use crate::coach::prompt;
use crate::coach::provider::{
    ChatModel, EmbeddingProvider, OpenAiChat, OpenAiClient, OpenAiEmbeddings,
};
use crate::coach::splitter::TextSplitter;
use crate::coach::{ChatTurn, CoachError, CoachResult, DISCLAIMER, UNAVAILABLE_MESSAGE};
use crate::config::{CoachConfig, API_KEY_ENV};
use crate::predict::RiskScore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

struct RagChain {
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn ChatModel>,
}

enum CoachState {
    Ready(RagChain),
    Unavailable(String),
}

/// Retrieval-augmented coach over a fixed knowledge base
pub struct Coach {
    state: CoachState,
    top_k: usize,
}

impl Coach {
    /// Assemble a ready coach from its parts
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            state: CoachState::Ready(RagChain {
                index,
                embedder,
                llm,
            }),
            top_k: top_k.max(1),
        }
    }

    /// Coach that answers every request with the unavailable message
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self {
            state: CoachState::Unavailable(reason.into()),
            top_k: 1,
        }
    }

    /// Build the OpenAI-backed coach, or an unavailable one if any part fails
    pub async fn connect(config: &CoachConfig) -> Self {
        match Self::try_connect(config).await {
            Ok(coach) => {
                info!("Coach ready");
                coach
            }
            Err(e) => {
                error!("Coach is not available: {:#}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    async fn try_connect(config: &CoachConfig) -> anyhow::Result<Self> {
        let (embedder, llm) = openai_parts(config)?;
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let index =
            VectorIndex::load_or_build(&config.index_path, &config.kb_dir, &splitter, &embedder)
                .await?;
        info!("Knowledge index holds {} chunks", index.len());

        Ok(Self::new(
            index,
            Arc::new(embedder),
            Arc::new(llm),
            config.top_k,
        ))
    }

    /// Re-embed the knowledge base and overwrite the saved index
    pub async fn rebuild_index(config: &CoachConfig) -> anyhow::Result<VectorIndex> {
        let (embedder, _) = openai_parts(config)?;
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let index = VectorIndex::build_from_dir(&config.kb_dir, &splitter, &embedder).await?;
        index.save(&config.index_path)?;
        info!(
            "Saved {} chunks to {:?}",
            index.len(),
            config.index_path
        );
        Ok(index)
    }

    /// Check if the chain is usable
    pub fn is_ready(&self) -> bool {
        matches!(self.state, CoachState::Ready(_))
    }

    /// Why the coach is unavailable, if it is
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            CoachState::Ready(_) => None,
            CoachState::Unavailable(reason) => Some(reason),
        }
    }

    fn chain(&self) -> CoachResult<&RagChain> {
        match &self.state {
            CoachState::Ready(chain) => Ok(chain),
            CoachState::Unavailable(reason) => Err(CoachError::Unavailable(reason.clone())),
        }
    }

    /// Retrieve context and ask the model
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> CoachResult<String> {
        let chain = self.chain()?;
        let query = chain.embedder.embed(question).await?;
        let results = chain.index.search(&query, self.top_k);
        let context = prompt::format_context(&results);
        chain
            .llm
            .complete(&prompt::coach_prompt(history, &context, question))
            .await
    }

    /// Chat reply for the conversation surfaces
    ///
    /// Never fails: answers carry the disclaimer, an unavailable coach gives
    /// the fixed message and a provider failure is described in the reply.
    pub async fn chat(&self, question: &str, history: &[ChatTurn]) -> String {
        match self.answer(question, history).await {
            Ok(answer) => format!("{}\n\n{}", answer, DISCLAIMER),
            Err(CoachError::Unavailable(_)) => UNAVAILABLE_MESSAGE.to_string(),
            Err(e) => {
                warn!("Chat request failed: {}", e);
                format!("ERROR in the RAG chain for the chat: {}", e)
            }
        }
    }

    /// Advice for a freshly scored user, without prior conversation
    pub async fn coach_message(&self, score: &RiskScore) -> String {
        match self.answer(&prompt::risk_question(score), &[]).await {
            Ok(answer) => answer,
            Err(CoachError::Unavailable(_)) => UNAVAILABLE_MESSAGE.to_string(),
            Err(e) => {
                warn!("Coach request failed: {}", e);
                format!("ERROR in the RAG chain for the plan: {}", e)
            }
        }
    }

    /// Two-week action plan citing the retrieved sources
    pub async fn action_plan(&self, score: &RiskScore) -> CoachResult<String> {
        let chain = self.chain()?;
        let query = chain.embedder.embed(&prompt::risk_question(score)).await?;
        let results = chain.index.search(&query, self.top_k);
        let sources = prompt::format_sources(&results);
        chain
            .llm
            .complete(&prompt::plan_prompt(score, &sources))
            .await
    }
}

fn openai_parts(config: &CoachConfig) -> anyhow::Result<(OpenAiEmbeddings, OpenAiChat)> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("{} is not set", API_KEY_ENV))?;
    let client = OpenAiClient::new(
        api_key,
        config.base_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let embedder = OpenAiEmbeddings::new(client.clone(), config.embedding_model.clone());
    let llm = OpenAiChat::new(client, config.chat_model.clone(), config.temperature);
    Ok((embedder, llm))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::coach::provider::testing::{EchoChat, KeywordEmbeddings};
    use crate::coach::splitter::Chunk;

    /// Ready coach over three one-line documents
    pub(crate) async fn fake_coach(llm: Arc<EchoChat>) -> Coach {
        let embedder = KeywordEmbeddings::health();
        let chunks = vec![
            Chunk {
                source: "salt.txt".into(),
                text: "Keep sodium under 2300 mg; less salt lowers pressure.".into(),
            },
            Chunk {
                source: "walk.txt".into(),
                text: "A brisk walk of 30 minutes is good exercise.".into(),
            },
            Chunk {
                source: "sleep.txt".into(),
                text: "Adults need 7 to 9 hours of sleep.".into(),
            },
        ];
        let index = VectorIndex::build(chunks, &embedder).await.unwrap();
        Coach::new(index, Arc::new(embedder), llm, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::fake_coach;
    use super::*;
    use crate::coach::provider::testing::EchoChat;
    use crate::predict::Driver;

    #[tokio::test]
    async fn test_unavailable_coach_returns_fixed_message() {
        let coach = Coach::unavailable("OPENAI_API_KEY is not set");
        assert!(!coach.is_ready());
        assert_eq!(coach.chat("How much salt?", &[]).await, UNAVAILABLE_MESSAGE);
        assert_eq!(
            coach.coach_message(&RiskScore::new(0.9, vec![])).await,
            UNAVAILABLE_MESSAGE
        );
        assert!(matches!(
            coach.action_plan(&RiskScore::new(0.9, vec![])).await,
            Err(CoachError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_chat_retrieves_context_and_history() {
        let llm = Arc::new(EchoChat::replying("Eat less salt."));
        let coach = fake_coach(llm.clone()).await;
        let history = vec![
            ChatTurn::user("Hi"),
            ChatTurn::assistant("Hello! How can I help?"),
        ];

        let reply = coach.chat("How much salt can I eat?", &history).await;
        assert_eq!(reply, format!("Eat less salt.\n\n{}", DISCLAIMER));

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("Keep sodium under 2300 mg"));
        assert!(!prompt.contains("brisk walk"));
        assert!(prompt.contains("user: Hi\nassistant: Hello! How can I help?"));
        assert!(prompt.contains("How much salt can I eat?"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported_in_reply() {
        let llm = Arc::new(EchoChat::failing(CoachError::RequestFailed {
            provider: "openai".into(),
            status: 500,
            message: "upstream down".into(),
        }));
        let coach = fake_coach(llm).await;
        let reply = coach.chat("Any sleep tips?", &[]).await;
        assert!(reply.starts_with("ERROR in the RAG chain"));
        assert!(reply.contains("upstream down"));
        assert!(!reply.contains(DISCLAIMER));
    }

    #[tokio::test]
    async fn test_coach_message_asks_about_score() {
        let llm = Arc::new(EchoChat::replying("Walk daily."));
        let coach = fake_coach(llm.clone()).await;
        let score = RiskScore::new(
            0.72,
            vec![Driver {
                feature: "feat_activity_days".into(),
                description: "Physically active 1 days per week, fewer than 3".into(),
            }],
        );

        assert_eq!(coach.coach_message(&score).await, "Walk daily.");
        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("My hypertension risk is high (score: 0.72)"));
        assert!(prompt.contains("Chat history (for context):**\n\n---"));
    }

    #[tokio::test]
    async fn test_action_plan_cites_sources() {
        let llm = Arc::new(EchoChat::replying("Week 1: walk."));
        let coach = fake_coach(llm.clone()).await;
        let plan = coach.action_plan(&RiskScore::new(0.3, vec![])).await.unwrap();
        assert_eq!(plan, "Week 1: walk.");
        assert!(llm.last_prompt().unwrap().contains("[1] ("));
    }

    #[tokio::test]
    async fn test_connect_without_key_is_unavailable() {
        let config = CoachConfig::default();
        let coach = Coach::connect(&config).await;
        assert!(!coach.is_ready());
        assert!(coach.unavailable_reason().unwrap().contains("OPENAI_API_KEY"));
        assert!(Coach::rebuild_index(&config).await.is_err());
    }
}
