//! Reasoning modes: how the planner produces its result for a turn.
//!
//! The mode is chosen once, when the planner is built, from the
//! `principled` and `prompted` flags:
//!
//! | principled | prompted | mode |
//! |---|---|---|
//! | yes | yes | [`ReasoningMode::Hybrid`] |
//! | yes | no | [`ReasoningMode::RuleBased`] |
//! | no | yes | [`ReasoningMode::ModelBased`] |
//! | no | no | [`ReasoningMode::Fallback`] |
//!
//! Every mode yields exactly one [`CreateResult`]. Streamed chunks are
//! emitted before it.

use std::sync::Arc;

use agenx_core::error::{Error, ProviderError};
use agenx_core::event::{EventSender, StreamEvent};
use agenx_core::message::Message;
use agenx_core::provider::{CreateResult, ModelBackend, ModelRequest, StreamItem};
use agenx_core::CancellationToken;
use tracing::{debug, info};

use crate::flow::FlowListener;

/// Fixed instruction produced when neither flag is set.
pub const FALLBACK_TEXT: &str = "Follow the Hypothesis-Validation workflow, go on.";

/// Which reasoning runs on each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningMode {
    /// The flow's suggestion is the result; no model call.
    RuleBased,
    /// The model answers from the plain context.
    ModelBased,
    /// The flow's suggestion is shown to the model as guidance.
    Hybrid,
    /// A fixed instruction; no model call.
    Fallback,
}

impl ReasoningMode {
    pub fn from_flags(principled: bool, prompted: bool) -> Self {
        match (principled, prompted) {
            (true, true) => Self::Hybrid,
            (true, false) => Self::RuleBased,
            (false, true) => Self::ModelBased,
            (false, false) => Self::Fallback,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::ModelBased => "model_based",
            Self::Hybrid => "hybrid",
            Self::Fallback => "fallback",
        }
    }

    /// Whether this mode needs a flow listener.
    pub fn needs_flow(&self) -> bool {
        matches!(self, Self::RuleBased | Self::Hybrid)
    }

    /// Run the mode once and return its single result.
    pub async fn execute(&self, input: ModeInput<'_>) -> Result<CreateResult, Error> {
        debug!(agent = input.source, mode = self.name(), "Dispatching reasoning mode");
        match self {
            Self::Fallback => Ok(CreateResult::text(FALLBACK_TEXT)),
            Self::RuleBased => {
                let suggestion = principled_suggestion(self, &input).await?;
                Ok(CreateResult::text(suggestion))
            }
            Self::ModelBased => {
                let request = input.request(input.view.clone());
                call_model(self.name(), &input, request).await
            }
            Self::Hybrid => {
                // The suggestion is complete before the model is asked anything
                let suggestion = principled_suggestion(self, &input).await?;
                info!(agent = input.source, suggestion = %suggestion, "Suggestion detected");

                let mut view = input.view.clone();
                view.push(principle_guidance(&suggestion));
                let request = input.request(view);
                call_model(self.name(), &input, request).await
            }
        }
    }
}

/// Everything a mode may use while it runs.
pub struct ModeInput<'a> {
    /// Name of the agent running the turn
    pub source: &'a str,
    /// Messages that started the turn
    pub incoming: &'a [Message],
    /// System messages plus the windowed history
    pub view: Vec<Message>,
    pub backend: &'a dyn ModelBackend,
    pub flow: Option<&'a Arc<dyn FlowListener>>,
    pub tools: Vec<agenx_core::provider::ToolDefinition>,
    pub json_schema: Option<serde_json::Value>,
    pub stream: bool,
    pub events: &'a EventSender,
    pub cancel: &'a CancellationToken,
}

impl ModeInput<'_> {
    fn request(&self, messages: Vec<Message>) -> ModelRequest {
        ModelRequest {
            messages,
            tools: self.tools.clone(),
            json_schema: self.json_schema.clone(),
        }
    }
}

/// The ephemeral user message carrying a rule-based suggestion.
pub fn principle_guidance(suggestion: &str) -> Message {
    Message::user(
        "user",
        format!(
            "PRINCIPLE GUIDANCE:\n\n{suggestion}\n\nBased on the above guidance, provide a \
             synthesized response that incorporates this principle-based suggestion with your \
             own reasoning. Focus on guiding the Hypothesis Agent with clear, specific direction. \
             You do not propose any hypothesis."
        ),
    )
}

async fn principled_suggestion(mode: &ReasoningMode, input: &ModeInput<'_>) -> Result<String, Error> {
    let flow = input.flow.ok_or_else(|| {
        Error::DispatchInvariant(format!("{} reasoning requires a flow listener", mode.name()))
    })?;
    Ok(flow.run_principled_reasoning(input.incoming).await)
}

/// Call the backend once, forwarding streamed chunks as events.
///
/// A stream that closes without its final result is a protocol error.
pub(crate) async fn call_model(
    mode: &'static str,
    input: &ModeInput<'_>,
    request: ModelRequest,
) -> Result<CreateResult, Error> {
    let cancel = input.cancel;
    debug!(
        agent = input.source,
        backend = input.backend.name(),
        messages = request.messages.len(),
        stream = input.stream,
        "Calling model backend"
    );

    if !input.stream {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = input.backend.create(request, cancel) => result,
        };
        return result.map_err(|e| Error::in_mode(mode, e));
    }

    let mut rx = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        rx = input.backend.create_stream(request, cancel) => rx.map_err(|e| Error::in_mode(mode, e))?,
    };

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            item = rx.recv() => item,
        };

        match item {
            Some(Ok(StreamItem::Chunk(content))) => {
                input
                    .events
                    .emit(StreamEvent::Chunk {
                        source: input.source.to_string(),
                        content,
                    })
                    .await;
            }
            Some(Ok(StreamItem::Final(result))) => {
                debug!(agent = input.source, usage = result.usage.total(), "Model stream finished");
                return Ok(result);
            }
            Some(Err(e)) => return Err(Error::in_mode(mode, e)),
            None => return Err(Error::in_mode(mode, ProviderError::MissingFinalResult)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_modes() {
        assert_eq!(ReasoningMode::from_flags(true, true), ReasoningMode::Hybrid);
        assert_eq!(ReasoningMode::from_flags(true, false), ReasoningMode::RuleBased);
        assert_eq!(ReasoningMode::from_flags(false, true), ReasoningMode::ModelBased);
        assert_eq!(ReasoningMode::from_flags(false, false), ReasoningMode::Fallback);
    }

    #[test]
    fn only_principled_modes_need_a_flow() {
        assert!(ReasoningMode::Hybrid.needs_flow());
        assert!(ReasoningMode::RuleBased.needs_flow());
        assert!(!ReasoningMode::ModelBased.needs_flow());
        assert!(!ReasoningMode::Fallback.needs_flow());
    }

    #[test]
    fn guidance_embeds_the_suggestion_verbatim() {
        let message = principle_guidance("Try smaller rings");
        assert_eq!(message.source, "user");
        assert!(message.text().contains("PRINCIPLE GUIDANCE:\n\nTry smaller rings\n\n"));
    }
}
