//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::db::{DbError, SessionInfo, DEFAULT_TITLE};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, ToolDefinition};
use crate::state_machine::SessionState;
use crate::tools::ToolOutput;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
#[allow(dead_code)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

#[allow(dead_code)]
impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a plain-text response
    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::from_text(text));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.next(request)
    }
}

// ============================================================================
// Delayed Mock LLM Client (for concurrency testing)
// ============================================================================

/// Mock LLM client that holds each request open for a while
pub struct DelayedMockLlmClient {
    inner: MockLlmClient,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockLlmClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockLlmClient::new(),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_text(&self, text: &str) {
        self.inner.queue_text(text);
    }
}

#[async_trait]
impl LlmService for DelayedMockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.next(request)
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

/// Mock tool executor with predefined outputs
#[allow(dead_code)]
pub struct MockToolExecutor {
    outputs: HashMap<String, ToolOutput>,
    definitions: Vec<ToolDefinition>,
    /// Record of tool executions
    pub executions: Mutex<Vec<(String, Value)>>,
}

#[allow(dead_code)]
impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            definitions: Vec::new(),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Add a tool with a predefined output
    pub fn with_tool(mut self, name: impl Into<String>, output: ToolOutput) -> Self {
        let name = name.into();
        self.definitions.push(ToolDefinition {
            name: name.clone(),
            description: format!("Mock {name}"),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        });
        self.outputs.insert(name, output);
        self
    }

    /// Get recorded executions
    pub fn recorded_executions(&self) -> Vec<(String, Value)> {
        self.executions.lock().unwrap().clone()
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput> {
        self.executions
            .lock()
            .unwrap()
            .push((name.to_string(), input));
        self.outputs.get(name).cloned()
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory session store; saves can be made to fail on demand
#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, (SessionInfo, SessionState)>>,
    fail_saves: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save_state` fail
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn stored_state(&self, session_id: &str) -> Option<SessionState> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|(_, state)| state.clone())
    }

    pub fn stored_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|(info, _)| info.clone())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn new_info(id: &str, title: &str) -> SessionInfo {
        let now = Self::now();
        SessionInfo {
            id: id.to_string(),
            title: title.to_string(),
            created_at: now,
            last_active: now,
        }
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load_or_init(&self, initial: &SessionState) -> Result<SessionState, DbError> {
        let mut sessions = self.sessions.lock().unwrap();
        let (_, state) = sessions
            .entry(initial.session_id.clone())
            .or_insert_with(|| (Self::new_info(&initial.session_id, DEFAULT_TITLE), initial.clone()));
        Ok(state.clone())
    }

    async fn save_state(&self, state: &SessionState) -> Result<(), DbError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DbError::Poisoned);
        }
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions
            .entry(state.session_id.clone())
            .or_insert_with(|| (Self::new_info(&state.session_id, DEFAULT_TITLE), state.clone()));
        entry.0.last_active = Self::now();
        entry.1 = state.clone();
        Ok(())
    }

    async fn create_session(&self, title: &str, initial: &SessionState) -> Result<SessionInfo, DbError> {
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions
            .entry(initial.session_id.clone())
            .or_insert_with(|| (Self::new_info(&initial.session_id, title), initial.clone()));
        entry.0.title = title.to_string();
        Ok(entry.0.clone())
    }

    async fn set_title_if_default(&self, session_id: &str, title: &str) -> Result<bool, DbError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some((info, _)) if info.title == DEFAULT_TITLE => {
                info.title = title.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, DbError> {
        let mut infos: Vec<_> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .map(|(info, _)| info.clone())
            .collect();
        infos.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(infos)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, DbError> {
        Ok(self.sessions.lock().unwrap().remove(session_id).is_some())
    }

    async fn delete_all_sessions(&self) -> Result<usize, DbError> {
        let mut sessions = self.sessions.lock().unwrap();
        let count = sessions.len();
        sessions.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlock, LlmErrorKind, MessageRole, ToolChoice};
    use crate::runtime::{NewSession, SessionError, SessionManager, TOOL_FALLBACK_REPLY};
    use crate::state_machine::{Role, REFLECTION_POINT};
    use serde_json::json;

    const MODEL: &str = "test-model";

    struct Harness {
        manager: Arc<SessionManager>,
        llm: Arc<MockLlmClient>,
        tools: Arc<MockToolExecutor>,
        store: Arc<InMemoryStore>,
    }

    fn harness_with_tools(tools: MockToolExecutor) -> Harness {
        let llm = Arc::new(MockLlmClient::new());
        let tools = Arc::new(tools);
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            llm.clone(),
            tools.clone(),
            MODEL,
        ));
        Harness {
            manager,
            llm,
            tools,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with_tools(MockToolExecutor::new())
    }

    fn tool_response(calls: &[(&str, &str, Value)]) -> LlmResponse {
        LlmResponse {
            content: calls
                .iter()
                .map(|(id, name, input)| ContentBlock::tool_use(*id, *name, input.clone()))
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mock_llm_client() {
        let client = MockLlmClient::new();
        client.queue_text("Hello!");

        let request = LlmRequest {
            model: MODEL.to_string(),
            system: vec![],
            messages: vec![],
            tools: vec![],
            tool_choice: None,
            max_tokens: None,
        };

        let response = client.complete(&request).await.unwrap();
        assert_eq!(response.text(), "Hello!");
        assert_eq!(client.recorded_requests().len(), 1);
        assert!(client.complete(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_simple_text_response() {
        let h = harness();
        h.llm.queue_text("That sounds like a lot to carry.");

        let state = h.manager.handle_message("s", "  I'm overwhelmed  ", None).await.unwrap();

        assert!(!state.is_processing);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[0].content, "I'm overwhelmed");
        assert_eq!(state.messages[1].content, "That sounds like a lot to carry.");
        assert!(state.messages[1].clarity_output.is_none());
        assert_eq!(h.store.stored_state("s").unwrap(), state);

        let request = &h.llm.recorded_requests()[0];
        assert_eq!(request.model, MODEL);
        assert_eq!(request.max_tokens, Some(2048));
        assert_eq!(request.tool_choice, Some(ToolChoice::Auto));
    }

    #[tokio::test]
    async fn test_structured_reply_round_trip() {
        let h = harness();
        h.llm.queue_text(
            r#"{"response":"A","summary":"B","insight":"C","suggestion":"D"}"#,
        );

        let state = h.manager.handle_message("s", "hi", None).await.unwrap();
        let reply = &state.messages[1];
        assert_eq!(reply.content, "A");
        let clarity = reply.clarity_output.as_ref().unwrap();
        assert_eq!((clarity.summary.as_str(), clarity.insight.as_str(), clarity.suggestion.as_str()), ("B", "C", "D"));
    }

    #[tokio::test]
    async fn test_malformed_json_falls_back_to_text() {
        let h = harness();
        h.llm.queue_text("Hello {not valid json");

        let state = h.manager.handle_message("s", "hi", None).await.unwrap();
        assert_eq!(state.messages[1].content, "Hello {not valid json");
        assert!(state.messages[1].clarity_output.is_none());
    }

    #[tokio::test]
    async fn test_tool_execution_cycle() {
        let tools = MockToolExecutor::new().with_tool(
            "get_weather",
            ToolOutput::success(json!({"location": "Lisbon", "temperature": 21})),
        );
        let h = harness_with_tools(tools);
        h.llm
            .queue_response(tool_response(&[("call-1", "get_weather", json!({"location": "Lisbon"}))]));
        h.llm.queue_text("It's a mild 21 degrees in Lisbon.");

        let state = h.manager.handle_message("s", "Weather in Lisbon?", None).await.unwrap();

        let reply = &state.messages[1];
        assert_eq!(reply.content, "It's a mild 21 degrees in Lisbon.");
        assert!(reply.clarity_output.is_none());
        let calls = reply.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call-1");
        assert_eq!(calls[0].result["temperature"], 21);

        assert_eq!(h.tools.recorded_executions().len(), 1);

        let requests = h.llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        let follow_up = &requests[1];
        assert_eq!(follow_up.max_tokens, Some(16000));
        assert!(follow_up.tools.is_empty());
        assert!(matches!(
            follow_up.messages.last().unwrap().content[0],
            ContentBlock::ToolResult { ref tool_use_id, is_error: false, .. } if tool_use_id == "call-1"
        ));
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_error_marker() {
        let tools = MockToolExecutor::new()
            .with_tool("get_weather", ToolOutput::error("Location must not be empty"));
        let h = harness_with_tools(tools);
        h.llm.queue_response(tool_response(&[
            ("call-1", "get_weather", json!({"location": ""})),
            ("call-2", "launch_rockets", json!({})),
        ]));
        h.llm.queue_text("");

        let state = h.manager.handle_message("s", "hmm", None).await.unwrap();

        let reply = &state.messages[1];
        assert_eq!(reply.content, TOOL_FALLBACK_REPLY);
        let calls = reply.tool_calls.as_ref().unwrap();
        assert_eq!(
            calls[0].result["error"],
            "Failed to execute get_weather: Location must not be empty"
        );
        assert_eq!(calls[1].result["error"], "Failed to execute launch_rockets: unknown tool");
        assert!(calls.iter().all(|c| c.is_error()));
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_siblings() {
        let tools = MockToolExecutor::new().with_tool(
            "get_weather",
            ToolOutput::success(json!({"location": "Rome", "temperature": 24})),
        );
        let h = harness_with_tools(tools);
        h.llm.queue_text("first reply");
        h.llm.queue_text("second reply");
        h.manager.handle_message("s", "first", None).await.unwrap();
        h.manager.handle_message("s", "second", None).await.unwrap();

        h.llm.queue_response(tool_response(&[
            ("call-1", "get_weather", json!({"location": "Rome"})),
            ("call-2", "launch_rockets", json!({})),
        ]));
        h.llm.queue_text("Rome is warm today.");
        let state = h.manager.handle_message("s", "Weather in Rome?", None).await.unwrap();

        let reply = &state.messages[5];
        assert_eq!(reply.content, "Rome is warm today.");
        let calls = reply.tool_calls.as_ref().unwrap();
        assert!(!calls[0].is_error());
        assert_eq!(calls[0].result["temperature"], 24);
        assert!(calls[1].is_error());

        let follow_up = h.llm.recorded_requests().pop().unwrap();
        let texts: Vec<_> = follow_up.messages[..4]
            .iter()
            .map(|m| match &m.content[0] {
                ContentBlock::Text { text } => text.as_str(),
                other => panic!("unexpected block {other:?}"),
            })
            .collect();
        // Last three history messages, then the user's own words
        assert_eq!(texts, vec!["first reply", "second", "second reply", "Weather in Rome?"]);
        assert_eq!(follow_up.messages.len(), 7);
        assert_eq!(follow_up.messages[4].role, MessageRole::Assistant);
        assert_eq!(follow_up.messages[4].content.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_tool_arguments_recorded() {
        let tools = MockToolExecutor::new().with_tool("get_weather", ToolOutput::success(json!({})));
        let h = harness_with_tools(tools);
        h.llm
            .queue_response(tool_response(&[("call-1", "get_weather", Value::Null)]));
        h.llm.queue_text("ok");

        let state = h.manager.handle_message("s", "hmm", None).await.unwrap();
        let calls = state.messages[1].tool_calls.as_ref().unwrap();
        assert!(calls[0].is_error());
        assert!(h.tools.recorded_executions().is_empty());
    }

    #[tokio::test]
    async fn test_reflection_fires_exactly_on_tenth_message() {
        let h = harness();
        let mut armed_turns = Vec::new();

        for turn in 1..=7 {
            h.llm.queue_text("reply");
            let state = h
                .manager
                .handle_message("s", &format!("message {turn}"), None)
                .await
                .unwrap();

            let request = h.llm.recorded_requests().pop().unwrap();
            if request.system[0].text.contains("Reflection Mode") {
                armed_turns.push(state.messages.len());
                let user_block = &request.messages.last().unwrap().content[0];
                assert!(matches!(user_block, ContentBlock::Text { text } if text.starts_with("[SYSTEM NOTE:")));
                // History keeps the original text
                assert_eq!(state.messages[state.messages.len() - 2].content, format!("message {turn}"));
                assert!(state.summary_offered);
            }
        }

        assert_eq!(armed_turns, vec![REFLECTION_POINT]);
    }

    #[tokio::test]
    async fn test_summary_offered_set_on_tool_branch() {
        let tools = MockToolExecutor::new().with_tool("get_weather", ToolOutput::success(json!({})));
        let h = harness_with_tools(tools);
        for _ in 0..4 {
            h.llm.queue_text("reply");
        }
        for i in 0..4 {
            h.manager.handle_message("s", &format!("m{i}"), None).await.unwrap();
        }

        h.llm
            .queue_response(tool_response(&[("call-1", "get_weather", json!({"location": "Oslo"}))]));
        h.llm.queue_text("Cold in Oslo.");
        let state = h.manager.handle_message("s", "Oslo weather?", None).await.unwrap();

        assert_eq!(state.messages.len(), REFLECTION_POINT);
        assert!(state.summary_offered);
        assert!(state.messages[9].clarity_output.is_none());
    }

    #[tokio::test]
    async fn test_llm_error_handling() {
        let h = harness();
        h.llm.queue_error(LlmError::from_status(401, "invalid key"));

        let err = h.manager.handle_message("s", "hello", None).await.unwrap_err();
        assert!(matches!(
            &err,
            SessionError::Turn(crate::runtime::TurnError::Upstream(e)) if e.kind == LlmErrorKind::Auth
        ));
        assert_eq!(
            err.user_message(),
            "AI authentication failed. Please check your API key and configuration."
        );

        let state = h.store.stored_state("s").unwrap();
        assert!(!state.is_processing);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_empty_response_is_error() {
        let h = harness();
        h.llm.queue_text("   ");

        let err = h.manager.handle_message("s", "hello", None).await.unwrap_err();
        assert_eq!(err.user_message(), "Failed to process message");
        assert!(!h.store.stored_state("s").unwrap().is_processing);
    }

    #[tokio::test]
    async fn test_empty_message_leaves_state_unchanged() {
        let h = harness();
        h.llm.queue_text("reply");
        let before = h.manager.handle_message("s", "hello", None).await.unwrap();

        let err = h.manager.handle_message("s", "   ", None).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyMessage));
        assert_eq!(h.manager.get_state("s").await.unwrap(), before);
        assert_eq!(h.llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_get_state_is_idempotent() {
        let h = harness();
        let first = h.manager.get_state("new").await.unwrap();
        let second = h.manager.get_state("new").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.session_id, "new");
        assert_eq!(first.model, MODEL);
        assert!(first.messages.is_empty());
        assert!(!first.is_processing);
    }

    #[tokio::test]
    async fn test_clear_preserves_id_and_model() {
        let h = harness();
        h.manager.update_model("s", "other-model").await.unwrap();
        h.llm.queue_text("reply");
        h.manager.handle_message("s", "hello", None).await.unwrap();

        let cleared = h.manager.clear_messages("s").await.unwrap();
        assert!(cleared.messages.is_empty());
        assert!(!cleared.summary_offered);
        assert_eq!(cleared.session_id, "s");
        assert_eq!(cleared.model, "other-model");
    }

    #[tokio::test]
    async fn test_update_model_rejects_blank() {
        let h = harness();
        assert!(matches!(
            h.manager.update_model("s", "  ").await,
            Err(SessionError::InvalidModel)
        ));
    }

    #[tokio::test]
    async fn test_model_override_used_for_turn() {
        let h = harness();
        h.llm.queue_text("reply");
        let state = h
            .manager
            .handle_message("s", "hello", Some("override-model".to_string()))
            .await
            .unwrap();

        assert_eq!(state.model, "override-model");
        assert_eq!(h.llm.recorded_requests()[0].model, "override-model");
    }

    #[tokio::test]
    async fn test_concurrent_message_rejected_as_busy() {
        let llm = Arc::new(DelayedMockLlmClient::new(Duration::from_millis(200)));
        llm.queue_text("slow reply");
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            llm.clone(),
            Arc::new(MockToolExecutor::new()),
            MODEL,
        ));

        let started = llm.request_started.clone();
        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.handle_message("s", "first", None).await })
        };
        started.notified().await;

        // Mid-turn reads see the committed user message
        let mid = manager.get_state("s").await.unwrap();
        assert!(mid.is_processing);
        assert_eq!(mid.messages.len(), 1);

        let second = manager.handle_message("s", "second", None).await;
        assert!(matches!(second, Err(SessionError::Busy)));

        // Clear waits for the turn instead of racing it
        let cleared = manager.clear_messages("s").await.unwrap();
        assert!(cleared.messages.is_empty());

        let finished = first.await.unwrap().unwrap();
        assert_eq!(finished.messages.len(), 2);
        assert!(store.stored_state("s").unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_does_not_wedge_session() {
        let llm = Arc::new(DelayedMockLlmClient::new(Duration::from_millis(100)));
        llm.queue_text("lost reply");
        llm.queue_text("second reply");
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            llm.clone(),
            Arc::new(MockToolExecutor::new()),
            MODEL,
        ));

        let started = llm.request_started.clone();
        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.handle_message("s", "first", None).await })
        };
        started.notified().await;
        store.fail_saves(true);

        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        // Both commit attempts failed, so the row still says processing
        assert!(store.stored_state("s").unwrap().is_processing);

        store.fail_saves(false);
        let state = manager.handle_message("s", "second", None).await.unwrap();
        assert!(!state.is_processing);
        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "second reply"]);
        assert_eq!(store.stored_state("s").unwrap(), state);
    }

    #[tokio::test]
    async fn test_delete_all_waits_for_inflight_turn() {
        let llm = Arc::new(DelayedMockLlmClient::new(Duration::from_millis(200)));
        llm.queue_text("reply");
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            llm.clone(),
            Arc::new(MockToolExecutor::new()),
            MODEL,
        ));

        let started = llm.request_started.clone();
        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.handle_message("s", "hello", None).await })
        };
        started.notified().await;

        assert_eq!(manager.delete_all_sessions().await.unwrap(), 1);

        let finished = first.await.unwrap().unwrap();
        assert_eq!(finished.messages.len(), 2);
        // The turn's final save landed before the delete, not after it
        assert!(store.stored_state("s").is_none());
        assert!(manager.locks.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_after_user_message() {
        let h = harness();
        h.store.fail_saves(true);

        h.manager.get_state("s").await.unwrap();

        let err = h.manager.handle_message("s", "hello", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(err.user_message(), "Internal Server Error");
        assert!(h.llm.recorded_requests().is_empty());

        let state = h.store.stored_state("s").unwrap();
        assert!(!state.is_processing);
        assert!(state.messages.is_empty());
    }

    #[tokio::test]
    async fn test_title_derived_from_first_message() {
        let h = harness();
        h.llm.queue_text("reply");
        h.llm.queue_text("reply");
        h.manager
            .handle_message("s", "I keep starting things and never finishing any of them", None)
            .await
            .unwrap();
        h.manager.handle_message("s", "second message", None).await.unwrap();

        let info = h.store.stored_info("s").unwrap();
        assert!(info.title.starts_with("I keep starting things"));
        assert!(info.title.ends_with("..."));
    }

    #[tokio::test]
    async fn test_session_index_operations() {
        let h = harness();

        let explicit = h
            .manager
            .create_session(NewSession {
                session_id: Some("named".to_string()),
                title: Some("Work worries".to_string()),
                first_message: None,
            })
            .await
            .unwrap();
        assert_eq!(explicit.id, "named");
        assert_eq!(explicit.title, "Work worries");

        let derived = h
            .manager
            .create_session(NewSession {
                first_message: Some("Can't sleep again".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(derived.title, "Can't sleep again");
        assert!(uuid::Uuid::parse_str(&derived.id).is_ok());

        let default = h.manager.create_session(NewSession::default()).await.unwrap();
        assert_eq!(default.title, DEFAULT_TITLE);

        assert_eq!(h.manager.list_sessions().await.unwrap().len(), 3);
        assert!(h.manager.delete_session("named").await.unwrap());
        assert!(!h.manager.delete_session("named").await.unwrap());
        assert_eq!(h.manager.delete_all_sessions().await.unwrap(), 2);
        assert!(h.manager.list_sessions().await.unwrap().is_empty());
    }
}
