//! The turn dispatcher: the planner's per-turn reasoning loop.
//!
//! One turn runs these steps in order, emitting events as it goes:
//!
//! 1. **Stage** the incoming messages
//! 2. **Fold memory** into the turn (`MemoryQuery` events)
//! 3. **Notify the flow** listener of the incoming messages
//! 4. **Dispatch** the reasoning mode and get exactly one result
//! 5. **Surface the thought**, if the result carries one
//! 6. **Stage** the assistant message
//! 7. **Run tools** the result asks for, then reflect or summarise
//!
//! Everything staged lands in the shared context only when the turn
//! finishes. A failed or cancelled turn leaves the context untouched.

use std::sync::Arc;

use agenx_core::context::{ConversationContext, TurnBuffer};
use agenx_core::error::{Error, ProviderError};
use agenx_core::event::{EventSender, EventStream, Response, StreamEvent};
use agenx_core::memory::{memory_context_text, Memory};
use agenx_core::message::{FunctionCall, FunctionExecutionResult, Message, MessageContent};
use agenx_core::provider::{CreateResult, ModelBackend, ModelRequest};
use agenx_core::tool::{ToolExecutor, ToolRegistry};
use agenx_core::CancellationToken;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::ChatAgent;
use crate::flow::FlowListener;
use crate::reasoning::{call_model, ModeInput, ReasoningMode};

/// Default planner instructions.
pub const DEFAULT_PLANNER_PROMPT: &str = "You plan the task by decoupling and assignment. ";

/// Events buffered between a running turn and its consumer.
const EVENT_BUFFER: usize = 64;

/// Runs one agent's turns against its own conversation context.
#[derive(Clone)]
pub struct TurnDispatcher {
    name: String,
    description: String,
    backend: Arc<dyn ModelBackend>,
    mode: ReasoningMode,
    flow: Option<Arc<dyn FlowListener>>,
    tools: ToolRegistry,
    memories: Vec<Arc<dyn Memory>>,
    context: Arc<Mutex<ConversationContext>>,
    stream: bool,
    reflect_on_tool_use: bool,
    tool_call_summary_format: String,
    json_schema: Option<serde_json::Value>,
}

impl TurnDispatcher {
    /// Create a model-based dispatcher with one system message.
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn ModelBackend>,
        system_message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: "An agent that provides assistance with ability to use tools.".into(),
            backend,
            mode: ReasoningMode::ModelBased,
            flow: None,
            tools: ToolRegistry::new(),
            memories: Vec::new(),
            context: Arc::new(Mutex::new(ConversationContext::new(vec![Message::system(
                system_message,
            )]))),
            stream: false,
            reflect_on_tool_use: false,
            tool_call_summary_format: "{result}".into(),
            json_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_mode(mut self, mode: ReasoningMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attach a flow listener; it is notified every turn.
    pub fn with_flow(mut self, flow: Arc<dyn FlowListener>) -> Self {
        self.flow = Some(flow);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memories.push(memory);
        self
    }

    /// Replace the conversation context (system messages included).
    pub fn with_context(mut self, context: ConversationContext) -> Self {
        self.context = Arc::new(Mutex::new(context));
        self
    }

    /// Keep only the last `size` messages in the model view.
    ///
    /// Applies to a context that has not been handed out yet.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        if let Some(context) = Arc::get_mut(&mut self.context) {
            let current = std::mem::take(context.get_mut());
            *context.get_mut() = current.with_buffer_size(size);
        }
        self
    }

    /// Ask the backend for streamed output.
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.reflect_on_tool_use = enabled;
        self
    }

    /// Format for tool results when there is no reflection.
    ///
    /// Placeholders: `{tool_name}`, `{arguments}`, `{result}`, `{is_error}`.
    pub fn with_summary_format(mut self, format: impl Into<String>) -> Self {
        self.tool_call_summary_format = format.into();
        self
    }

    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    pub fn mode(&self) -> ReasoningMode {
        self.mode
    }

    /// The shared conversation context.
    pub fn context(&self) -> Arc<Mutex<ConversationContext>> {
        self.context.clone()
    }

    /// Start one turn in the background and return its event stream.
    pub fn run_turn(&self, incoming: Vec<Message>, cancel: CancellationToken) -> EventStream {
        let (events, stream) = EventStream::channel(EVENT_BUFFER);
        let this = self.clone();

        tokio::spawn(async move {
            match this.turn(incoming, &cancel, &events).await {
                Ok(response) => events.emit(StreamEvent::response(response)).await,
                Err(e) => {
                    warn!(agent = %this.name, mode = this.mode.name(), error = %e, "Turn failed");
                    events.fail(e).await;
                }
            }
        });

        stream
    }

    async fn turn(
        &self,
        incoming: Vec<Message>,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> Result<Response, Error> {
        if self.mode.needs_flow() && self.flow.is_none() {
            return Err(Error::DispatchInvariant(format!(
                "{} reasoning requires a flow listener",
                self.mode.name()
            )));
        }

        // One turn at a time per context
        let mut context = self.context.lock().await;
        let mut turn = TurnBuffer::new();
        let mut inner_messages = Vec::new();

        info!(
            agent = %self.name,
            mode = self.mode.name(),
            incoming = incoming.len(),
            "Starting turn"
        );

        // Step 1: stage the incoming messages
        for message in &incoming {
            turn.stage(message.clone());
        }

        // Step 2: fold memory
        for memory in &self.memories {
            let contents = memory.update_context(&context.model_view(&turn)).await?;
            if contents.is_empty() {
                continue;
            }
            debug!(agent = %self.name, memory = memory.name(), count = contents.len(), "Memory folded");
            turn.stage(Message::system(memory_context_text(&contents)));
            let event = StreamEvent::MemoryQuery {
                source: self.name.clone(),
                contents,
            };
            events.emit(event.clone()).await;
            inner_messages.push(event);
        }

        // Step 3: the flow listens before any reasoning
        if let Some(flow) = &self.flow {
            flow.on_messages(&incoming).await;
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Step 4: mode dispatch
        let result = self
            .mode
            .execute(self.mode_input(&incoming, context.model_view(&turn), events, cancel))
            .await?;
        let mut usage = result.usage;

        // Step 5: thought
        self.surface_thought(&result, events, &mut inner_messages).await;

        // Step 6: assistant message
        let assistant = Message::assistant(&self.name, result.content.clone())
            .with_usage(result.usage)
            .with_thought(result.thought.clone());
        turn.stage(assistant.clone());

        // Step 7: tools
        let chat_message = if result.wants_tools() {
            let calls = match &result.content {
                MessageContent::ToolCalls(calls) if !calls.is_empty() => calls.clone(),
                _ => {
                    return Err(Error::in_mode(
                        self.mode.name(),
                        ProviderError::InvalidResponse(
                            "finish reason is tool_calls but no calls were returned".into(),
                        ),
                    ));
                }
            };

            let request = StreamEvent::ToolCallRequest {
                source: self.name.clone(),
                calls: calls.clone(),
                usage: Some(result.usage),
            };
            events.emit(request.clone()).await;
            inner_messages.push(request);

            let results = self.execute_tools(&calls, cancel).await?;

            let execution = StreamEvent::ToolCallExecution {
                source: self.name.clone(),
                results: results.clone(),
            };
            events.emit(execution.clone()).await;
            inner_messages.push(execution);
            turn.stage(Message::tool_results(&self.name, results.clone()));

            if self.reflect_on_tool_use {
                let view = context.model_view(&turn);
                let input = self.mode_input(&incoming, view.clone(), events, cancel);
                let reflection = call_model(self.mode.name(), &input, ModelRequest::new(view)).await?;
                usage.accumulate(&reflection.usage);
                self.surface_thought(&reflection, events, &mut inner_messages).await;

                let message = Message::assistant(&self.name, reflection.content)
                    .with_usage(reflection.usage)
                    .with_thought(reflection.thought);
                turn.stage(message.clone());
                message
            } else {
                let summary = format_tool_summary(&self.tool_call_summary_format, &calls, &results);
                events
                    .emit(StreamEvent::ToolCallSummary {
                        source: self.name.clone(),
                        content: summary.clone(),
                    })
                    .await;
                Message::assistant(&self.name, summary)
            }
        } else {
            assistant
        };

        // All or nothing: a cancellation that raced the last step still wins
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        context.commit(turn);

        info!(
            agent = %self.name,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            context_len = context.len(),
            "Turn complete"
        );

        Ok(Response {
            chat_message,
            inner_messages,
            usage,
        })
    }

    fn mode_input<'a>(
        &'a self,
        incoming: &'a [Message],
        view: Vec<Message>,
        events: &'a EventSender,
        cancel: &'a CancellationToken,
    ) -> ModeInput<'a> {
        ModeInput {
            source: &self.name,
            incoming,
            view,
            backend: self.backend.as_ref(),
            flow: self.flow.as_ref(),
            tools: self.tools.definitions(),
            json_schema: self.json_schema.clone(),
            stream: self.stream,
            events,
            cancel,
        }
    }

    async fn surface_thought(
        &self,
        result: &CreateResult,
        events: &EventSender,
        inner_messages: &mut Vec<StreamEvent>,
    ) {
        if let Some(thought) = result.thought.as_ref().filter(|t| !t.is_empty()) {
            let event = StreamEvent::Thought {
                source: self.name.clone(),
                content: thought.clone(),
            };
            events.emit(event.clone()).await;
            inner_messages.push(event);
        }
    }

    /// Run every call concurrently; results keep the call order.
    async fn execute_tools(
        &self,
        calls: &[FunctionCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<FunctionExecutionResult>, Error> {
        debug!(agent = %self.name, count = calls.len(), "Executing tool calls");
        let results = join_all(calls.iter().map(|call| self.tools.execute(call, cancel))).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(results)
    }
}

/// Build the summary of tool results, one line per result.
pub fn format_tool_summary(
    format: &str,
    calls: &[FunctionCall],
    results: &[FunctionExecutionResult],
) -> String {
    results
        .iter()
        .map(|r| {
            let arguments = calls
                .iter()
                .find(|c| c.id == r.call_id)
                .map(|c| c.arguments.as_str())
                .unwrap_or_default();
            format
                .replace("{tool_name}", &r.name)
                .replace("{arguments}", arguments)
                .replace("{is_error}", if r.is_error { "true" } else { "false" })
                .replace("{result}", &r.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ChatAgent for TurnDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn on_messages_stream(&self, messages: Vec<Message>, cancel: CancellationToken) -> EventStream {
        self.run_turn(messages, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::{principle_guidance, FALLBACK_TEXT};
    use crate::test_helpers::*;
    use agenx_core::event::TerminalResult;
    use agenx_core::memory::{ListMemory, MemoryContent};
    use agenx_core::message::Role;
    use agenx_core::provider::RequestUsage;

    struct StaticFlow {
        suggestion: String,
        seen: Mutex<usize>,
    }

    impl StaticFlow {
        fn new(suggestion: &str) -> Arc<Self> {
            Arc::new(Self {
                suggestion: suggestion.into(),
                seen: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl FlowListener for StaticFlow {
        async fn on_messages(&self, messages: &[Message]) {
            *self.seen.lock().await += messages.len();
        }

        async fn run_principled_reasoning(&self, _messages: &[Message]) -> String {
            self.suggestion.clone()
        }
    }

    fn task() -> Vec<Message> {
        vec![Message::user("user", "Design a potent EGFR inhibitor")]
    }

    fn planner(backend: Arc<ScriptedBackend>, mode: ReasoningMode) -> TurnDispatcher {
        TurnDispatcher::new("Planner_Agent", backend, DEFAULT_PLANNER_PROMPT)
            .with_mode(mode)
            .with_flow(StaticFlow::new("Increase polarity"))
    }

    fn terminal_response(events: &[StreamEvent]) -> &Response {
        match events.last() {
            Some(StreamEvent::Terminal {
                result: TerminalResult::Response(r),
            }) => r,
            other => panic!("expected a terminal response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_mode_ends_with_exactly_one_terminal_event() {
        for (principled, prompted) in [(true, true), (true, false), (false, true), (false, false)] {
            let backend = Arc::new(ScriptedBackend::single_text("Ask the hypothesis agent"));
            let planner = planner(backend, ReasoningMode::from_flags(principled, prompted));

            let events = planner
                .run_turn(task(), CancellationToken::new())
                .collect_events()
                .await
                .unwrap();

            let terminals = events.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminals, 1, "principled={principled} prompted={prompted}");
            assert!(events.last().unwrap().is_terminal());
        }
    }

    #[tokio::test]
    async fn rule_based_uses_the_suggestion_without_a_model_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let planner = planner(backend.clone(), ReasoningMode::RuleBased);

        let events = planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        let response = terminal_response(&events);
        assert_eq!(response.chat_message.text(), "Increase polarity");
        assert_eq!(response.usage.total(), 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn fallback_is_fixed_and_repeatable() {
        let mut shared = ConversationContext::new(vec![Message::system(DEFAULT_PLANNER_PROMPT)]);
        shared.append(Message::user("user", "Earlier task"));

        let mut contents = Vec::new();
        for _ in 0..2 {
            let backend = Arc::new(ScriptedBackend::new(vec![]));
            let planner = TurnDispatcher::new("Planner_Agent", backend.clone(), "")
                .with_context(shared.clone())
                .with_mode(ReasoningMode::Fallback);
            let events = planner
                .run_turn(task(), CancellationToken::new())
                .collect_events()
                .await
                .unwrap();
            contents.push(terminal_response(&events).chat_message.content.clone());
            assert_eq!(backend.call_count(), 0);
        }

        assert_eq!(contents[0], contents[1]);
        assert_eq!(contents[0].to_text(), FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn hybrid_shows_the_suggestion_to_the_model_for_this_turn_only() {
        let backend = Arc::new(ScriptedBackend::single_text("Focus on the hinge binder"));
        let planner = planner(backend.clone(), ReasoningMode::Hybrid);

        let events = planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();
        assert_eq!(
            terminal_response(&events).chat_message.text(),
            "Focus on the hinge binder"
        );

        let requests = backend.requests();
        let last = requests[0].messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.text().contains("Increase polarity"));
        assert_eq!(last.text(), principle_guidance("Increase polarity").text());

        // Committed history: task + assistant, no guidance
        let context = planner.context();
        let context = context.lock().await;
        assert_eq!(context.len(), 2);
        assert!(context
            .messages()
            .iter()
            .all(|m| !m.text().contains("PRINCIPLE GUIDANCE")));
    }

    #[tokio::test]
    async fn streamed_chunks_concatenate_to_the_final_content() {
        let text = "Ask the Hypothesis Agent for a scaffold hop.";
        let backend = Arc::new(ScriptedBackend::single_text(text).chunked(7));
        let planner = planner(backend, ReasoningMode::ModelBased).with_streaming(true);

        let events = planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert!(events.iter().filter(|e| matches!(e, StreamEvent::Chunk { .. })).count() > 1);
        assert_eq!(streamed, text);
        assert_eq!(terminal_response(&events).chat_message.text(), text);
    }

    #[tokio::test]
    async fn stream_without_final_result_is_a_dispatch_failure() {
        let backend = Arc::new(ScriptedBackend::single_text("half").chunked(2).without_final());
        let planner = planner(backend, ReasoningMode::ModelBased).with_streaming(true);

        let err = planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap_err();

        match err {
            Error::Dispatch { mode, source } => {
                assert_eq!(mode, "model_based");
                assert!(matches!(source, ProviderError::MissingFinalResult));
            }
            other => panic!("expected a dispatch error, got {other:?}"),
        }
        assert_eq!(planner.context().lock().await.len(), 0);
    }

    #[tokio::test]
    async fn cancellation_mid_call_leaves_the_context_unchanged() {
        for streaming in [false, true] {
            let backend = Arc::new(ScriptedBackend::hanging());
            let planner = planner(backend.clone(), ReasoningMode::ModelBased).with_streaming(streaming);
            let before = planner.context().lock().await.len();

            let cancel = CancellationToken::new();
            let stream = planner.run_turn(task(), cancel.clone());
            let canceller = tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                cancel.cancel();
            });

            let err = stream.collect_events().await.unwrap_err();
            canceller.await.unwrap();

            assert!(matches!(err, Error::Cancelled), "streaming={streaming}: {err:?}");
            assert_eq!(backend.call_count(), 1);
            assert_eq!(planner.context().lock().await.len(), before);
        }
    }

    #[tokio::test]
    async fn thought_is_emitted_before_the_response() {
        let mut result = make_text_result("Proceed");
        result.thought = Some("The last result was weak".into());
        let backend = Arc::new(ScriptedBackend::new(vec![result]));
        let planner = planner(backend, ReasoningMode::ModelBased);

        let events = planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        assert!(matches!(&events[0], StreamEvent::Thought { content, .. } if content == "The last result was weak"));
        let response = terminal_response(&events);
        assert_eq!(response.inner_messages.len(), 1);
        assert_eq!(
            response.chat_message.thought.as_deref(),
            Some("The last result was weak")
        );
    }

    #[tokio::test]
    async fn tool_calls_without_reflection_are_summarised() {
        let backend = Arc::new(ScriptedBackend::new(vec![make_tool_call_result(vec![
            make_tool_call("call_1", "characterize_pchembl_value", serde_json::json!({"smiles": "CCO"})),
            make_tool_call("call_2", "missing_tool", serde_json::json!({})),
        ])]));
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FixedPredictor));
        let agent = TurnDispatcher::new("Experiment_Agent", backend.clone(), "You run experiments.")
            .with_tools(tools)
            .with_summary_format("{tool_name}: {result}");

        let events = agent
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "ToolCallRequestEvent",
                "ToolCallExecutionEvent",
                "ToolCallSummaryMessage",
                "Response"
            ]
        );

        let StreamEvent::ToolCallExecution { results, .. } = &events[1] else {
            panic!("expected tool execution");
        };
        assert_eq!(results[0].call_id, "call_1");
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert!(results[1].content.contains("missing_tool"));

        let response = terminal_response(&events);
        let summary = response.chat_message.text();
        assert!(summary.starts_with("characterize_pchembl_value: {\"input\":\"CCO\",\"output\":6.5}"));
        assert_eq!(summary.lines().count(), 2);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.requests()[0].tools.len(), 1);

        // task, tool calls, tool results
        assert_eq!(agent.context().lock().await.len(), 3);
    }

    #[tokio::test]
    async fn reflection_makes_one_more_model_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            make_tool_call_result(vec![make_tool_call(
                "call_1",
                "characterize_pchembl_value",
                serde_json::json!({"smiles": "c1ccccc1"}),
            )]),
            make_text_result("Benzene scores 6.5"),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FixedPredictor));
        let agent = TurnDispatcher::new("Experiment_Agent", backend.clone(), "You run experiments.")
            .with_tools(tools)
            .with_reflection(true);

        let events = agent
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        let response = terminal_response(&events);
        assert_eq!(response.chat_message.text(), "Benzene scores 6.5");
        assert_eq!(response.usage, RequestUsage::new(20, 10));
        assert_eq!(response.inner_messages.len(), 2);
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::ToolCallSummary { .. })));

        // The reflection sees the tool results and gets no tools
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.is_empty());
        assert_eq!(requests[1].messages.last().unwrap().role, Role::Tool);

        assert_eq!(agent.context().lock().await.len(), 4);
    }

    #[tokio::test]
    async fn memory_is_folded_before_reasoning() {
        let memory = Arc::new(ListMemory::new("notes"));
        memory
            .add(MemoryContent::text("Nitro groups were toxic last round"))
            .await
            .unwrap();
        let backend = Arc::new(ScriptedBackend::single_text("Avoid nitro groups"));
        let planner = planner(backend.clone(), ReasoningMode::ModelBased).with_memory(memory);

        let events = planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        assert!(matches!(&events[0], StreamEvent::MemoryQuery { contents, .. } if contents.len() == 1));
        assert_eq!(terminal_response(&events).inner_messages.len(), 1);
        let request = &backend.requests()[0];
        assert!(request
            .messages
            .iter()
            .any(|m| m.role == Role::System && m.text().contains("Nitro groups were toxic")));
    }

    #[tokio::test]
    async fn flow_hears_incoming_messages_every_mode() {
        let flow = StaticFlow::new("x");
        let planner = TurnDispatcher::new("Planner_Agent", Arc::new(ScriptedBackend::new(vec![])), "")
            .with_mode(ReasoningMode::Fallback)
            .with_flow(flow.clone());

        planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap();
        assert_eq!(*flow.seen.lock().await, 1);
    }

    #[tokio::test]
    async fn principled_mode_without_flow_is_an_invariant_error() {
        let planner = TurnDispatcher::new("Planner_Agent", Arc::new(ScriptedBackend::new(vec![])), "")
            .with_mode(ReasoningMode::RuleBased);

        let err = planner
            .run_turn(task(), CancellationToken::new())
            .collect_events()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DispatchInvariant(_)));
    }

    #[tokio::test]
    async fn missing_flow_fails_before_any_event_or_backend_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let memory = Arc::new(ListMemory::new("notes"));
        memory.add(MemoryContent::text("Nitro groups were toxic last round")).await.unwrap();
        let planner = TurnDispatcher::new("Planner_Agent", backend.clone(), "")
            .with_mode(ReasoningMode::Hybrid)
            .with_memory(memory);

        let mut stream = planner.run_turn(task(), CancellationToken::new());
        let first = stream.recv().await;
        assert!(matches!(first, Some(Err(Error::DispatchInvariant(_)))));
        assert!(stream.recv().await.is_none());
        assert_eq!(backend.call_count(), 0);
        assert!(planner.context().lock().await.is_empty());
    }

    #[tokio::test]
    async fn buffer_size_limits_the_model_view() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            make_text_result("one"),
            make_text_result("two"),
        ]));
        let planner = planner(backend.clone(), ReasoningMode::ModelBased).with_buffer_size(2);

        for _ in 0..2 {
            planner
                .run_turn(task(), CancellationToken::new())
                .collect_events()
                .await
                .unwrap();
        }

        // system + the last two history messages
        let second = &backend.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[0].role, Role::System);
    }

    #[test]
    fn summary_format_fills_every_placeholder() {
        let calls = vec![make_tool_call("a", "t", serde_json::json!({"x": 1}))];
        let results = vec![FunctionExecutionResult {
            call_id: "a".into(),
            name: "t".into(),
            content: "42".into(),
            is_error: false,
        }];
        let text = format_tool_summary("{tool_name}({arguments}) = {result} [{is_error}]", &calls, &results);
        assert_eq!(text, r#"t({"x":1}) = 42 [false]"#);
    }
}
