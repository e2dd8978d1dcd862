use super::*;
use crate::database::VectorStoreGateway;
use crate::ingest::Chunk;
use crate::provider::{Embedder, ToolDefinition};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

/// Replays a fixed sequence of turns and records every request it sees
#[derive(Default)]
struct ScriptedModel {
    turns: Mutex<VecDeque<Result<ModelTurn>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Result<ModelTurn>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("lock should not be poisoned").clone()
    }
}

impl ChatModel for ScriptedModel {
    fn generate(&self, request: &ChatRequest) -> Result<ModelTurn> {
        self.requests
            .lock()
            .expect("lock should not be poisoned")
            .push(request.clone());
        self.turns
            .lock()
            .expect("lock should not be poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(ModelTurn::Text("script exhausted".to_string())))
    }
}

/// Always asks for the same tool
struct LoopingModel;

impl ChatModel for LoopingModel {
    fn generate(&self, _request: &ChatRequest) -> Result<ModelTurn> {
        Ok(ModelTurn::ToolCall {
            name: "echo".to_string(),
            args: json!({ "query": "again" }),
        })
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echo the query".to_string(),
            parameters: prompt::query_parameters(),
        }
    }

    async fn call(&self, args: &Value) -> Result<String> {
        Ok(format!("echo: {}", tools::query_argument(args)?))
    }
}

struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "broken".to_string(),
            description: "Always fails".to_string(),
            parameters: prompt::query_parameters(),
        }
    }

    async fn call(&self, _args: &Value) -> Result<String> {
        Err(anyhow::anyhow!("index unavailable"))
    }
}

fn tool_call(name: &str, query: &str) -> Result<ModelTurn> {
    Ok(ModelTurn::ToolCall {
        name: name.to_string(),
        args: json!({ "query": query }),
    })
}

fn text(answer: &str) -> Result<ModelTurn> {
    Ok(ModelTurn::Text(answer.to_string()))
}

fn chatbot_with(model: Arc<ScriptedModel>, tools: Vec<Arc<dyn Tool>>) -> Chatbot {
    Chatbot::new(ConversationMemory::new(10)).with_agent_executor(AgentExecutor::new(model, tools))
}

fn last_observation(request: &ChatRequest) -> Option<&str> {
    request.messages.iter().rev().find_map(|message| match message {
        ChatMessage::ToolResult { content, .. } => Some(content.as_str()),
        _ => None,
    })
}

#[tokio::test]
async fn ask_without_executor_returns_sentinel() {
    let mut chatbot = Chatbot::new(ConversationMemory::new(10));

    let answer = chatbot.ask("Do you sell gift cards?").await;

    assert_eq!(answer, "Agent executor not initialized.");
    assert!(chatbot.memory().is_empty());
}

#[tokio::test]
async fn direct_answer_is_recorded_in_memory() {
    let model = Arc::new(ScriptedModel::new(vec![text("We do not offer gift cards.")]));
    let mut chatbot = chatbot_with(model.clone(), vec![Arc::new(EchoTool)]);

    let answer = chatbot.ask("Do you sell gift cards?").await;

    assert_eq!(answer, "We do not offer gift cards.");
    assert_eq!(
        chatbot.memory().history_text(),
        "Human: Do you sell gift cards?\nAI: We do not offer gift cards."
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, prompt::SYSTEM_PROMPT);
    assert!((requests[0].temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(requests[0].tools.len(), 1);
}

#[tokio::test]
async fn history_is_sent_before_the_new_question() {
    let model = Arc::new(ScriptedModel::new(vec![
        text("Cash on delivery is available."),
        text("Yes, cards are accepted too."),
    ]));
    let mut chatbot = chatbot_with(model.clone(), vec![]);

    chatbot.ask("Can I pay cash?").await;
    chatbot.ask("And cards?").await;

    let requests = model.requests();
    assert_eq!(
        requests[1].messages,
        vec![
            ChatMessage::User("Can I pay cash?".to_string()),
            ChatMessage::Assistant("Cash on delivery is available.".to_string()),
            ChatMessage::User("And cards?".to_string()),
        ]
    );
}

#[tokio::test]
async fn tool_result_is_fed_back_to_the_model() {
    let model = Arc::new(ScriptedModel::new(vec![
        tool_call("echo", "support hours"),
        text("Support is available 10am to 6pm."),
    ]));
    let mut chatbot = chatbot_with(model.clone(), vec![Arc::new(EchoTool)]);

    let answer = chatbot.ask("When is support open?").await;

    assert_eq!(answer, "Support is available 10am to 6pm.");
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].messages[1..],
        [
            ChatMessage::ToolCall {
                name: "echo".to_string(),
                args: json!({ "query": "support hours" }),
            },
            ChatMessage::ToolResult {
                name: "echo".to_string(),
                content: "echo: support hours".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn unknown_tool_becomes_an_observation() {
    let model = Arc::new(ScriptedModel::new(vec![
        tool_call("web_search", "returns"),
        text("Returns are accepted within 7 days."),
    ]));
    let mut chatbot = chatbot_with(model.clone(), vec![Arc::new(EchoTool)]);

    let answer = chatbot.ask("Return policy?").await;

    assert_eq!(answer, "Returns are accepted within 7 days.");
    let requests = model.requests();
    assert_eq!(
        last_observation(&requests[1]),
        Some("web_search is not a valid tool, try one of [echo].")
    );
}

#[tokio::test]
async fn tool_failure_becomes_an_observation() {
    let model = Arc::new(ScriptedModel::new(vec![
        tool_call("broken", "returns"),
        text("I could not reach the knowledge base."),
    ]));
    let mut chatbot = chatbot_with(model.clone(), vec![Arc::new(BrokenTool)]);

    let answer = chatbot.ask("Return policy?").await;

    assert_eq!(answer, "I could not reach the knowledge base.");
    let observation = last_observation(&model.requests()[1]).map(str::to_string);
    assert_eq!(
        observation.as_deref(),
        Some("Tool `broken` failed: index unavailable")
    );
}

#[tokio::test]
async fn model_error_becomes_an_apology() {
    let model = Arc::new(ScriptedModel::new(vec![Err(anyhow::anyhow!(
        "Client error: HTTP 403"
    ))]));
    let mut chatbot = chatbot_with(model, vec![]);

    let answer = chatbot.ask("Where is the head office?").await;

    assert!(answer.starts_with("I apologize, but I encountered an error: "));
    assert!(answer.contains("HTTP 403"));
    assert!(chatbot.memory().is_empty());
}

#[tokio::test]
async fn iteration_cap_stops_the_loop() {
    let executor = AgentExecutor::new(Arc::new(LoopingModel), vec![Arc::new(EchoTool)])
        .with_max_iterations(3);
    let mut chatbot = Chatbot::new(ConversationMemory::new(10)).with_agent_executor(executor);

    let answer = chatbot.ask("Loop forever").await;

    assert_eq!(answer, "Agent stopped due to iteration limit or time limit.");
    assert_eq!(chatbot.memory().window().len(), 2);
}

#[test]
fn executor_defaults() {
    let executor = AgentExecutor::new(Arc::new(LoopingModel), vec![Arc::new(EchoTool)]);

    assert_eq!(executor.max_iterations(), 15);
    assert_eq!(executor.tool_names(), vec!["echo".to_string()]);
    assert_eq!(executor.with_max_iterations(0).max_iterations(), 1);
}

#[tokio::test]
async fn unavailable_service_answers_with_reason() {
    let mut service = ChatService::Unavailable(UnavailableReason::MissingApiKey);

    assert_eq!(
        service.ask("Hello?").await,
        "AI service is currently unavailable. Please add GEMINI_API_KEY or GOOGLE_API_KEY to your .env file."
    );
    assert!(!service.is_ready());
    assert!(!service.agent_executor_ready());

    let mut failed = ChatService::Unavailable(UnavailableReason::InitializationFailed(
        "Knowledge base PDF not found at Lama.pdf".to_string(),
    ));
    assert_eq!(
        failed.ask("Hello?").await,
        "I'm sorry, but the chatbot initialization failed: Knowledge base PDF not found at Lama.pdf. Please check the backend logs."
    );
}

#[tokio::test]
async fn ready_service_delegates_to_chatbot() {
    let model = Arc::new(ScriptedModel::new(vec![text("Hello from LAMA.")]));
    let mut service = ChatService::Ready(chatbot_with(model, vec![]));

    assert!(service.is_ready());
    assert!(service.agent_executor_ready());
    assert_eq!(service.ask("Hi").await, "Hello from LAMA.");

    let bare = ChatService::Ready(Chatbot::new(ConversationMemory::new(10)));
    assert!(bare.is_ready());
    assert!(!bare.agent_executor_ready());
}

mod retrieval {
    use super::*;
    use crate::database::VectorIndex;

    /// Two-dimensional embedding: mentions of returns vs. everything else
    struct PolicyEmbedder;

    impl PolicyEmbedder {
        fn embed(text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            let policy = ["exchange", "return"]
                .iter()
                .filter(|word| lower.contains(*word))
                .count() as f32;
            vec![policy, 0.2]
        }
    }

    impl Embedder for PolicyEmbedder {
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| Self::embed(t)).collect())
        }

        fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(Self::embed(text))
        }
    }

    /// Searches first, then answers from whatever the search returned
    struct PolicyModel;

    impl ChatModel for PolicyModel {
        fn generate(&self, request: &ChatRequest) -> Result<ModelTurn> {
            let Some(observation) = last_observation(request) else {
                let tool = request
                    .tools
                    .first()
                    .ok_or_else(|| anyhow::anyhow!("no tools offered"))?;
                return Ok(ModelTurn::ToolCall {
                    name: tool.name.clone(),
                    args: json!({ "query": "exchange period" }),
                });
            };

            let policy = request
                .tools
                .first()
                .map(|tool| tool.description.as_str())
                .unwrap_or_default();
            if policy.contains("default to 7 days")
                && observation.contains("7 days")
                && observation.contains("15-day")
            {
                Ok(ModelTurn::Text(
                    "You have 7 days to exchange an item. Note that our policy page mentions a 15-day exchange period; the 7-day window applies.".to_string(),
                ))
            } else {
                Ok(ModelTurn::Text("I don't know.".to_string()))
            }
        }
    }

    fn chunk(text: &str, page: u32) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: PathBuf::from("Lama.pdf"),
            page,
            chunk_index: 0,
        }
    }

    async fn policy_index(temp_dir: &TempDir) -> Arc<VectorIndex> {
        let gateway =
            VectorStoreGateway::new(temp_dir.path().join("vector_store"), Arc::new(PolicyEmbedder));
        let index = gateway
            .build(&[
                chunk("FAQ: Returns accepted within 7 days of delivery.", 1),
                chunk("Policy: 15-day exchange policy for unworn items.", 5),
                chunk("Head office is located in Lahore.", 9),
            ])
            .await
            .expect("build should succeed");
        Arc::new(index)
    }

    #[tokio::test]
    async fn retrieval_tool_joins_chunks() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let tool = RetrievalTool::new(policy_index(&temp_dir).await, 2);

        let output = tool
            .call(&json!({ "query": "exchange an item" }))
            .await
            .expect("search should succeed");

        let parts: Vec<&str> = output.split("\n\n").collect();
        assert_eq!(parts.len(), 2);
        assert!(output.contains("7 days"));
        assert!(output.contains("15-day exchange"));
        assert!(!output.contains("Lahore"));
    }

    #[tokio::test]
    async fn retrieval_tool_definition() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let tool = RetrievalTool::new(policy_index(&temp_dir).await, 3);

        let definition = tool.definition();
        assert_eq!(definition.name, "lama_knowledge_search");
        assert!(definition.description.contains(
            "If you find conflicting exchange periods (7 days in FAQ vs. 15 days in Policy), default to 7 days and note the discrepancy."
        ));
        assert_eq!(definition.parameters["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn retrieval_tool_rejects_missing_query() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let tool = RetrievalTool::new(policy_index(&temp_dir).await, 3);

        let error = tool
            .call(&json!({ "q": "returns" }))
            .await
            .expect_err("missing query should fail");
        assert!(error.to_string().contains("query"));
    }

    #[tokio::test]
    async fn conflicting_exchange_periods_prefer_seven_days() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let tool: Arc<dyn Tool> = Arc::new(RetrievalTool::new(policy_index(&temp_dir).await, 3));
        let executor = AgentExecutor::new(Arc::new(PolicyModel), vec![tool]);
        let mut chatbot = Chatbot::new(ConversationMemory::new(10)).with_agent_executor(executor);

        let answer = chatbot.ask("How long do I have to exchange an item?").await;

        assert!(answer.contains("7 days"), "answer was: {}", answer);
        assert!(answer.contains("15-day"), "answer was: {}", answer);
        assert_eq!(chatbot.memory().window().len(), 2);
    }
}
