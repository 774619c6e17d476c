use async_trait::async_trait;
use serde_json::json;
use sizu_bot::chat::{ChatEngine, CompletionOutcome, EncodedImage, FailureReason, Prompt};
use sizu_bot::config::{BotProfile, ProfileMessages};
use sizu_bot::llm::{
    create_http_client, ChatCompletion, ChatCompletionRequest, ChatMessage, CompletionChoice,
    CompletionMessage, CompletionService, ContentPart, LlmError, ModerationService, ToolCall,
    ToolCallFunction, ToolChoice,
};
use sizu_bot::tools::{ThemeProvider, ToolRegistry};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays canned completions and keeps every request it saw
#[derive(Default)]
struct ScriptedCompletions {
    replies: Mutex<VecDeque<Result<ChatCompletion, LlmError>>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedCompletions {
    fn new(replies: Vec<Result<ChatCompletion, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletions {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err(LlmError::Unknown("script exhausted".to_string())))
    }
}

struct KeywordModeration(&'static str);

#[async_trait]
impl ModerationService for KeywordModeration {
    async fn is_flagged(&self, input: &str) -> Result<bool, LlmError> {
        Ok(input.contains(self.0))
    }
}

fn profile() -> Arc<BotProfile> {
    Arc::new(BotProfile {
        model: "test-model".to_string(),
        system_prompt: "あなたは静です。".to_string(),
        restricted_system_prompt: Some("そっけなく答えてください。".to_string()),
        temperature: Some(0.7),
        frequency_penalty: Some(0.0),
        presence_penalty: None,
        max_tokens: None,
        msg: ProfileMessages {
            no_prompt: "なにか話しかけてね".to_string(),
            timeout: "ちょっと調子が悪いみたい".to_string(),
        },
    })
}

fn prose(text: &str) -> ChatCompletion {
    ChatCompletion {
        choices: vec![CompletionChoice {
            message: CompletionMessage {
                content: Some(text.to_string()),
                tool_calls: None,
            },
            finish_reason: Some("stop".to_string()),
        }],
    }
}

fn theme_call() -> ChatCompletion {
    ChatCompletion {
        choices: vec![CompletionChoice {
            message: CompletionMessage {
                content: None,
                tool_calls: Some(vec![ToolCall {
                    id: "call_1".to_string(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: "get_today_theme".to_string(),
                        arguments: "{}".to_string(),
                    },
                }]),
            },
            finish_reason: Some("tool_calls".to_string()),
        }],
    }
}

/// Theme tool pointed at a port nothing listens on
fn offline_theme_tools() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ThemeProvider::new(
        create_http_client(5),
        "http://127.0.0.1:9/{date}.json",
        "/data/theme",
        chrono_tz::Asia::Tokyo,
    )));
    Arc::new(registry)
}

#[tokio::test]
async fn test_theme_round_trip_with_unreachable_feed() {
    let completions = ScriptedCompletions::new(vec![Ok(theme_call()), Ok(prose("今日のお題はわからないや"))]);
    let engine = ChatEngine::new(
        completions.clone(),
        Arc::new(KeywordModeration("NG")),
        offline_theme_tools(),
        profile(),
    );

    let prompt = Prompt::new("Alice", "今日のお題は？", Vec::new());
    assert_eq!(engine.chat(&prompt, false).await, "今日のお題はわからないや");

    let requests = completions.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
    assert_eq!(requests[1].tool_choice, Some(ToolChoice::Disabled));

    let second = &requests[1].messages;
    assert_eq!(second.len(), 4);
    assert_eq!(
        second[3],
        ChatMessage::tool("call_1", &json!({"theme": null}).to_string())
    );
}

#[tokio::test]
async fn test_flagged_prompt_is_censored_and_images_kept() {
    let completions = ScriptedCompletions::new(vec![Ok(prose("ふーん"))]);
    let engine = ChatEngine::new(
        completions.clone(),
        Arc::new(KeywordModeration("NG")),
        Arc::new(ToolRegistry::new()),
        profile(),
    );

    let image = EncodedImage::from_base64("AAAA".to_string());
    let prompt = Prompt::new("Bob", "NGワード", vec![image]);
    assert_eq!(engine.chat(&prompt, true).await, "ふーん");

    let requests = completions.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].tools.is_empty());
    assert_eq!(requests[0].tool_choice, None);
    assert_eq!(
        requests[0].messages,
        vec![
            ChatMessage::system("そっけなく答えてください。"),
            ChatMessage::User {
                content: vec![
                    ContentPart::text("ユーザー名:[Bob]\n<<検閲されたメッセージ>>"),
                    ContentPart::image("data:image/jpeg;base64,AAAA"),
                ],
            },
        ]
    );
}

#[tokio::test]
async fn test_transport_failure_becomes_fallback() {
    let completions = ScriptedCompletions::new(vec![Err(LlmError::Timeout(60))]);
    let engine = ChatEngine::new(
        completions,
        Arc::new(KeywordModeration("NG")),
        Arc::new(ToolRegistry::new()),
        profile(),
    );

    let prompt = Prompt::new("Alice", "hello", Vec::new());
    assert!(matches!(
        engine.complete(&prompt, false).await,
        CompletionOutcome::Failure {
            reason: FailureReason::Transport(LlmError::Timeout(_))
        }
    ));
    assert_eq!(engine.chat(&prompt, false).await, "ちょっと調子が悪いみたい");
}

#[tokio::test]
async fn test_empty_prompt_never_calls_services() {
    let completions = ScriptedCompletions::new(Vec::new());
    let engine = ChatEngine::new(
        completions.clone(),
        Arc::new(KeywordModeration("NG")),
        Arc::new(ToolRegistry::new()),
        profile(),
    );

    let prompt = Prompt::new("Alice", "", Vec::new());
    assert_eq!(engine.chat(&prompt, false).await, "なにか話しかけてね");
    assert!(completions.requests().is_empty());
}
