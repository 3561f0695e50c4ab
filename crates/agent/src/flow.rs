//! Flow listeners: collaborators that watch a conversation and steer it.
//!
//! A [`FlowListener`] is told about every batch of incoming messages before
//! the planner reasons, and can be asked for a rule-based suggestion. The
//! built-in [`PrincipleFlow`] walks a hypothesis/validation cycle and
//! phrases its suggestion around a rotating list of principles.

use std::collections::HashSet;

use agenx_core::message::Message;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Something that listens to the conversation and can suggest the next step.
#[async_trait]
pub trait FlowListener: Send + Sync {
    /// Observe incoming messages. Awaited before the planner reasons.
    async fn on_messages(&self, messages: &[Message]);

    /// Produce a rule-based suggestion for the current state.
    async fn run_principled_reasoning(&self, messages: &[Message]) -> String;
}

/// Where the hypothesis/validation cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Nothing proposed yet
    Start,
    /// A hypothesis is waiting for validation
    Proposed,
    /// An experiment reported back
    Validated,
}

#[derive(Debug)]
struct FlowState {
    stage: Stage,
    rounds: usize,
    last_hypothesis: Option<String>,
    last_result: Option<String>,
}

/// A deterministic hypothesis/validation flow guided by principles.
pub struct PrincipleFlow {
    principles: Vec<String>,
    hypothesis_agents: HashSet<String>,
    experiment_agents: HashSet<String>,
    state: Mutex<FlowState>,
}

impl PrincipleFlow {
    pub fn new(principles: Vec<String>) -> Self {
        Self {
            principles,
            hypothesis_agents: HashSet::new(),
            experiment_agents: HashSet::new(),
            state: Mutex::new(FlowState {
                stage: Stage::Start,
                rounds: 0,
                last_hypothesis: None,
                last_result: None,
            }),
        }
    }

    pub fn with_hypothesis_agent(mut self, name: impl Into<String>) -> Self {
        self.hypothesis_agents.insert(name.into());
        self
    }

    pub fn with_experiment_agent(mut self, name: impl Into<String>) -> Self {
        self.experiment_agents.insert(name.into());
        self
    }

    /// Number of completed hypothesis/validation rounds.
    pub async fn rounds(&self) -> usize {
        self.state.lock().await.rounds
    }

    fn principle(&self, round: usize) -> Option<&str> {
        if self.principles.is_empty() {
            None
        } else {
            Some(&self.principles[round % self.principles.len()])
        }
    }
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 240;
    let text = text.trim();
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl FlowListener for PrincipleFlow {
    async fn on_messages(&self, messages: &[Message]) {
        let mut state = self.state.lock().await;
        for message in messages {
            if self.hypothesis_agents.contains(&message.source) {
                state.stage = Stage::Proposed;
                state.last_hypothesis = Some(message.text());
            } else if self.experiment_agents.contains(&message.source) {
                if state.stage == Stage::Proposed {
                    state.rounds += 1;
                }
                state.stage = Stage::Validated;
                state.last_result = Some(message.text());
            }
        }
        debug!(stage = ?state.stage, rounds = state.rounds, "Flow state updated");
    }

    async fn run_principled_reasoning(&self, _messages: &[Message]) -> String {
        let state = self.state.lock().await;
        let mut suggestion = String::new();

        if let Some(principle) = self.principle(state.rounds) {
            suggestion.push_str(&format!("Principle: {principle}\n"));
        }

        match state.stage {
            Stage::Start => suggestion.push_str(
                "Next step: ask the Hypothesis Agent to propose a first, testable hypothesis \
                 grounded in the principle above.",
            ),
            Stage::Proposed => {
                let hypothesis = state.last_hypothesis.as_deref().unwrap_or_default();
                suggestion.push_str(&format!(
                    "Next step: ask the Experiment Agent to validate the latest hypothesis: \"{}\"",
                    excerpt(hypothesis)
                ));
            }
            Stage::Validated => {
                let result = state.last_result.as_deref().unwrap_or_default();
                suggestion.push_str(&format!(
                    "Next step: the experiment reported \"{}\". Ask the Hypothesis Agent to refine \
                     or replace the hypothesis in light of this result (round {}).",
                    excerpt(result),
                    state.rounds + 1
                ));
            }
        }

        suggestion
    }
}
