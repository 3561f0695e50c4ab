//! Group chat: the orchestration loop that takes turns between agents.
//!
//! The chat starts from the task message, then repeatedly:
//!
//! 1. asks the [`Selector`] for the next speaker (round-robin when it has
//!    no answer),
//! 2. hands that speaker every message it has not seen yet,
//! 3. forwards the speaker's events and records its response,
//!
//! until the turn limit, the termination text, or cancellation. The
//! stream always ends with a `Termination` event and a `TaskResult`.

use std::sync::Arc;

use agenx_core::error::Error;
use agenx_core::event::{EventSender, EventStream, StreamEvent, TaskResult, TerminalResult};
use agenx_core::message::Message;
use agenx_core::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::ChatAgent;
use crate::selector::Selector;

/// Source name used for team-level events.
pub const MANAGER_NAME: &str = "GroupChatManager";

const EVENT_BUFFER: usize = 128;

/// A team of agents sharing one conversation.
#[derive(Clone)]
pub struct GroupChat {
    participants: Vec<Arc<dyn ChatAgent>>,
    selector: Option<Selector>,
    max_turns: usize,
    termination_text: Option<String>,
}

impl GroupChat {
    pub fn new(participants: Vec<Arc<dyn ChatAgent>>) -> Self {
        Self {
            participants,
            selector: None,
            max_turns: 20,
            termination_text: None,
        }
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Stop once a message contains this text.
    pub fn with_termination_text(mut self, text: impl Into<String>) -> Self {
        self.termination_text = Some(text.into());
        self
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name()).collect()
    }

    /// Run the team on a task in the background.
    pub fn run_stream(&self, task: impl Into<String>, cancel: CancellationToken) -> EventStream {
        let (events, stream) = EventStream::channel(EVENT_BUFFER);
        let this = self.clone();
        let task = Message::user("user", task.into());

        tokio::spawn(async move {
            match this.run(task, &cancel, &events).await {
                Ok(result) => events.emit(StreamEvent::task_result(result)).await,
                Err(e) => {
                    warn!(error = %e, "Group chat failed");
                    events.fail(e).await;
                }
            }
        });

        stream
    }

    async fn run(
        &self,
        task: Message,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> Result<TaskResult, Error> {
        if self.participants.is_empty() {
            return Err(Error::Config {
                message: "a group chat needs at least one participant".into(),
            });
        }

        info!(participants = ?self.participant_names(), max_turns = self.max_turns, "Starting group chat");

        events.emit(StreamEvent::Chat { message: task.clone() }).await;
        let mut history = vec![task];
        // How much of the history each participant has been given
        let mut seen = vec![0usize; self.participants.len()];
        let mut last_speaker: Option<usize> = None;
        let mut turns = 0;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break "Cancelled".to_string();
            }
            if turns >= self.max_turns {
                break format!("Maximum number of turns {} reached.", self.max_turns);
            }

            let speaker = self.next_speaker(&history, last_speaker, cancel).await;
            let agent = &self.participants[speaker];
            debug!(speaker = agent.name(), turn = turns + 1, "Speaker takes the turn");

            let unseen = history[seen[speaker]..].to_vec();
            let message = match self.take_turn(agent.as_ref(), unseen, cancel, events).await {
                Ok(message) => message,
                Err(Error::Cancelled) => break "Cancelled".to_string(),
                Err(e) => return Err(e),
            };

            events.emit(StreamEvent::Chat { message: message.clone() }).await;
            let terminated = self
                .termination_text
                .as_deref()
                .filter(|text| message.text().contains(text))
                .map(|text| format!("Text '{text}' mentioned"));

            history.push(message);
            seen[speaker] = history.len();
            last_speaker = Some(speaker);
            turns += 1;

            if let Some(reason) = terminated {
                break reason;
            }
        };

        info!(turns, reason = %stop_reason, "Group chat stopped");
        events
            .emit(StreamEvent::Termination {
                source: MANAGER_NAME.into(),
                reason: stop_reason.clone(),
            })
            .await;

        Ok(TaskResult {
            messages: history,
            stop_reason: Some(stop_reason),
        })
    }

    /// The selector's choice if it names a participant, else round-robin.
    async fn next_speaker(
        &self,
        history: &[Message],
        last_speaker: Option<usize>,
        cancel: &CancellationToken,
    ) -> usize {
        if let Some(selector) = &self.selector {
            match selector.select_next(history, cancel).await {
                Ok(Some(name)) => {
                    if let Some(index) = self.participants.iter().position(|p| p.name() == name) {
                        return index;
                    }
                    debug!(selection = %name, "Selection is not a participant");
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Speaker selection failed, using round-robin"),
            }
        }
        last_speaker.map_or(0, |i| (i + 1) % self.participants.len())
    }

    /// Run one speaker, forwarding its events; returns its chat message.
    async fn take_turn(
        &self,
        agent: &dyn ChatAgent,
        messages: Vec<Message>,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> Result<Message, Error> {
        let mut stream = agent.on_messages_stream(messages, cancel.clone());
        let mut response = None;

        while let Some(event) = stream.recv().await {
            match event? {
                StreamEvent::Terminal {
                    result: TerminalResult::Response(r),
                } => response = Some(r.chat_message),
                other => events.emit(other).await,
            }
        }

        response.ok_or_else(|| Error::Internal(format!("{} finished without a response", agent.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TurnDispatcher;
    use crate::test_helpers::*;
    use agenx_core::provider::ModelBackend;

    fn agent(name: &str, backend: Arc<ScriptedBackend>) -> Arc<dyn ChatAgent> {
        Arc::new(TurnDispatcher::new(name, backend, format!("You are {name}.")))
    }

    fn task_result(events: &[StreamEvent]) -> &TaskResult {
        match events.last() {
            Some(StreamEvent::Terminal {
                result: TerminalResult::TaskResult(r),
            }) => r,
            other => panic!("expected a task result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn round_robin_until_max_turns() {
        let a = Arc::new(ScriptedBackend::new(vec![make_text_result("a1"), make_text_result("a2")]));
        let b = Arc::new(ScriptedBackend::new(vec![make_text_result("b1")]));
        let team = GroupChat::new(vec![agent("A", a.clone()), agent("B", b.clone())]).with_max_turns(3);

        let events = team
            .run_stream("Find a superconductor", CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        let result = task_result(&events);
        let sources: Vec<&str> = result.messages.iter().map(|m| m.source.as_str()).collect();
        assert_eq!(sources, vec!["user", "A", "B", "A"]);
        assert_eq!(result.stop_reason.as_deref(), Some("Maximum number of turns 3 reached."));
        assert!(matches!(&events[events.len() - 2], StreamEvent::Termination { .. }));

        // A's second turn only receives what it has not seen: B's message
        let second = &a.requests()[1];
        let texts: Vec<String> = second.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts.iter().filter(|t| t.as_str() == "b1").count(), 1);
        assert_eq!(texts.iter().filter(|t| t.as_str() == "Find a superconductor").count(), 1);
    }

    #[tokio::test]
    async fn selector_choice_is_followed() {
        let a = Arc::new(ScriptedBackend::new(vec![make_text_result("a1"), make_text_result("a2")]));
        let b = Arc::new(ScriptedBackend::new(vec![]));
        // First answer names nobody known, second picks A again
        let selector_backend = Arc::new(ScriptedBackend::new(vec![
            make_text_result("nobody"),
            make_text_result("A"),
        ]));
        let selector = Selector::new(selector_backend.clone() as Arc<dyn ModelBackend>);
        let team = GroupChat::new(vec![agent("A", a.clone()), agent("B", b.clone())])
            .with_selector(selector)
            .with_max_turns(2);

        let events = team
            .run_stream("task", CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        let sources: Vec<&str> = task_result(&events)
            .messages
            .iter()
            .map(|m| m.source.as_str())
            .collect();
        assert_eq!(sources, vec!["user", "A", "A"]);
        assert_eq!(b.call_count(), 0);
        assert_eq!(selector_backend.call_count(), 2);
    }

    #[tokio::test]
    async fn termination_text_stops_the_chat() {
        let a = Arc::new(ScriptedBackend::new(vec![make_text_result("All done. TERMINATE")]));
        let team = GroupChat::new(vec![agent("A", a)])
            .with_max_turns(10)
            .with_termination_text("TERMINATE");

        let events = team
            .run_stream("task", CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        assert_eq!(
            task_result(&events).stop_reason.as_deref(),
            Some("Text 'TERMINATE' mentioned")
        );
    }

    #[tokio::test]
    async fn cancellation_ends_with_a_task_result() {
        let team = GroupChat::new(vec![agent("A", Arc::new(ScriptedBackend::hanging()))]);
        let cancel = CancellationToken::new();
        let stream = team.run_stream("task", cancel.clone());
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let events = stream.collect_events().await.unwrap();
        let result = task_result(&events);
        assert_eq!(result.stop_reason.as_deref(), Some("Cancelled"));
        assert_eq!(result.messages.len(), 1);
    }

    #[tokio::test]
    async fn participant_events_are_forwarded_with_usage() {
        let a = Arc::new(ScriptedBackend::single_text("streamed answer").chunked(4));
        let streaming: Arc<dyn ChatAgent> = Arc::new(
            TurnDispatcher::new("A", a, "You are A.").with_streaming(true),
        );
        let team = GroupChat::new(vec![streaming]).with_max_turns(1);

        let events = team
            .run_stream("task", CancellationToken::new())
            .collect_events()
            .await
            .unwrap();

        assert!(events.iter().any(|e| matches!(e, StreamEvent::Chunk { .. })));
        let chat = events
            .iter()
            .rev()
            .find_map(|e| match e {
                StreamEvent::Chat { message } if message.source == "A" => Some(message),
                _ => None,
            })
            .unwrap();
        assert_eq!(chat.usage.map(|u| u.total()), Some(15));
    }

    #[tokio::test]
    async fn empty_team_is_a_config_error() {
        let err = GroupChat::new(vec![])
            .run_stream("task", CancellationToken::new())
            .collect_events()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
